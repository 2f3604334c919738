//! Expanding polytope algorithm: penetration depth once GJK reports an overlap.
//!
//! Both variants return the outward normal of the Minkowski difference face
//! closest to the origin, which is the direction from A toward B, and the depth.

use glam::{Vec2, Vec3};

use crate::math::{Dim2, Dim3, Real};

use super::gjk::SupportPoint;

const MAX_ITERATIONS: usize = 64;
const EPSILON: Real = 1e-5;

pub fn epa_2d<F>(simplex: &[SupportPoint<Dim2>], support: F) -> Option<(Vec2, Real)>
where
    F: Fn(Vec2) -> SupportPoint<Dim2>,
{
    if simplex.len() < 3 {
        return None;
    }
    let mut polygon: Vec<Vec2> = simplex.iter().take(3).map(|s| s.point).collect();
    let area = (polygon[1] - polygon[0]).perp_dot(polygon[2] - polygon[0]);
    if area.abs() <= Real::EPSILON {
        return None;
    }
    if area < 0.0 {
        polygon.swap(1, 2);
    }

    let mut best = None;
    for _ in 0..MAX_ITERATIONS {
        let (edge, normal, distance) = closest_edge(&polygon)?;
        best = Some((normal, distance));
        let candidate = support(normal).point;
        if candidate.dot(normal) - distance < EPSILON {
            return best;
        }
        polygon.insert(edge + 1, candidate);
    }
    best
}

fn closest_edge(polygon: &[Vec2]) -> Option<(usize, Vec2, Real)> {
    let mut best: Option<(usize, Vec2, Real)> = None;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        let edge = b - a;
        // Outward normal of a counter-clockwise edge.
        let normal = Vec2::new(edge.y, -edge.x).normalize_or_zero();
        if normal == Vec2::ZERO {
            continue;
        }
        let distance = normal.dot(a);
        if best.map(|(_, _, d)| distance < d).unwrap_or(true) {
            best = Some((i, normal, distance));
        }
    }
    best
}

type Face = (usize, usize, usize);

pub fn epa_3d<F>(simplex: &[SupportPoint<Dim3>], support: F) -> Option<(Vec3, Real)>
where
    F: Fn(Vec3) -> SupportPoint<Dim3>,
{
    if simplex.len() < 4 {
        return None;
    }
    let mut polytope: Vec<Vec3> = simplex.iter().take(4).map(|s| s.point).collect();
    let mut faces = build_initial_faces(&polytope);

    let mut best = None;
    for _ in 0..MAX_ITERATIONS {
        let (normal, distance) = find_closest_face(&polytope, &faces)?;
        best = Some((normal, distance));

        let candidate = support(normal).point;
        if candidate.dot(normal) - distance < EPSILON {
            return best;
        }
        if !expand_polytope(&mut polytope, &mut faces, candidate) {
            return best;
        }
    }
    best
}

fn build_initial_faces(polytope: &[Vec3]) -> Vec<Face> {
    let mut faces = vec![(0, 1, 2), (0, 2, 3), (0, 3, 1), (1, 3, 2)];
    let centroid = polytope.iter().copied().sum::<Vec3>() * 0.25;

    // Orient every face away from the tetrahedron's interior.
    for face in &mut faces {
        let ab = polytope[face.1] - polytope[face.0];
        let ac = polytope[face.2] - polytope[face.0];
        let normal = ab.cross(ac);
        if (polytope[face.0] - centroid).dot(normal) < 0.0 {
            std::mem::swap(&mut face.1, &mut face.2);
        }
    }
    faces
}

fn face_normal(polytope: &[Vec3], face: Face) -> Vec3 {
    let ab = polytope[face.1] - polytope[face.0];
    let ac = polytope[face.2] - polytope[face.0];
    ab.cross(ac).normalize_or_zero()
}

fn find_closest_face(polytope: &[Vec3], faces: &[Face]) -> Option<(Vec3, Real)> {
    let mut best: Option<(Vec3, Real)> = None;
    for &face in faces {
        let normal = face_normal(polytope, face);
        if normal == Vec3::ZERO {
            continue;
        }
        let distance = polytope[face.0].dot(normal);
        if best.map(|(_, d)| distance < d).unwrap_or(true) {
            best = Some((normal, distance));
        }
    }
    best
}

/// Adds `support` to the polytope, replacing every face it can see. Returns false when
/// no face was visible, which means the polytope cannot grow any further.
fn expand_polytope(polytope: &mut Vec<Vec3>, faces: &mut Vec<Face>, support: Vec3) -> bool {
    let new_idx = polytope.len();
    polytope.push(support);

    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < faces.len() {
        let (a, b, c) = faces[i];
        let normal = face_normal(polytope, faces[i]);
        if normal.dot(support - polytope[a]) > EPSILON {
            for edge in [(a, b), (b, c), (c, a)] {
                // Edges shared by two visible faces are interior to the hole.
                if let Some(pos) = edges.iter().position(|&e| e == (edge.1, edge.0)) {
                    edges.swap_remove(pos);
                } else {
                    edges.push(edge);
                }
            }
            faces.swap_remove(i);
        } else {
            i += 1;
        }
    }

    if edges.is_empty() {
        polytope.pop();
        return false;
    }
    for (u, v) in edges {
        faces.push((u, v, new_idx));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::gjk::{gjk, minkowski_support, GjkResult};
    use approx::assert_relative_eq;

    #[test]
    fn overlapping_boxes_depth_along_x() {
        let a = |d: Vec3| Vec3::new(1.0f32.copysign(d.x), 1.0f32.copysign(d.y), 1.0f32.copysign(d.z));
        let b = |d: Vec3| {
            Vec3::new(1.5, 0.0, 0.0) + Vec3::new(1.0f32.copysign(d.x), 1.0f32.copysign(d.y), 1.0f32.copysign(d.z))
        };
        let GjkResult::Intersecting(simplex) = gjk::<Dim3, _, _>(&a, &b, Vec3::X, Real::MAX) else {
            panic!("boxes should overlap");
        };
        let (normal, depth) = epa_3d(&simplex, |d| minkowski_support::<Dim3, _, _>(&a, &b, d)).unwrap();
        assert_relative_eq!(depth, 0.5, epsilon = 1e-3);
        assert_relative_eq!(normal.x, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn overlapping_discs_depth() {
        let a = |d: Vec2| d.normalize_or_zero();
        let b = |d: Vec2| Vec2::new(0.0, 1.5) + d.normalize_or_zero();
        let GjkResult::Intersecting(simplex) = gjk::<Dim2, _, _>(&a, &b, Vec2::Y, Real::MAX) else {
            panic!("discs should overlap");
        };
        let (normal, depth) = epa_2d(&simplex, |d| minkowski_support::<Dim2, _, _>(&a, &b, d)).unwrap();
        assert_relative_eq!(depth, 0.5, epsilon = 1e-2);
        assert_relative_eq!(normal.y, 1.0, epsilon = 1e-2);
    }
}
