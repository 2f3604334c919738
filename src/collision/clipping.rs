use glam::{Vec2, Vec3};

const EPSILON: f32 = 1e-4;

/// Id flag marking a point produced by an intersection rather than an original vertex.
const CLIPPED_FLAG: u32 = 0x100;

#[derive(Debug, Clone, Copy)]
pub struct Plane {
    normal: Vec3,
    distance: f32,
}

impl Plane {
    fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

fn clipped_id(plane: usize, edge: usize) -> u32 {
    CLIPPED_FLAG | ((plane as u32) << 4) | edge as u32
}

/// Clips a tagged polygon against a set of planes using the Sutherland-Hodgman algorithm.
/// A point survives a plane when its signed distance is non-positive.
pub fn clip_polygon(vertices: &[(Vec3, u32)], planes: &[Plane]) -> Vec<(Vec3, u32)> {
    let mut output = vertices.to_vec();
    for (index, plane) in planes.iter().enumerate() {
        output = clip_against_plane(&output, *plane, index);
        if output.is_empty() {
            break;
        }
    }
    output
}

fn clip_against_plane(vertices: &[(Vec3, u32)], plane: Plane, plane_index: usize) -> Vec<(Vec3, u32)> {
    if vertices.is_empty() {
        return Vec::new();
    }

    let mut clipped = Vec::new();
    for i in 0..vertices.len() {
        let (current, _) = vertices[i];
        let next = vertices[(i + 1) % vertices.len()];

        let current_dist = plane.signed_distance(current);
        let next_dist = plane.signed_distance(next.0);

        let current_inside = current_dist <= EPSILON;
        let next_inside = next_dist <= EPSILON;

        if current_inside && next_inside {
            clipped.push(next);
        } else if current_inside && !next_inside {
            if let Some(intersection) =
                line_plane_intersection(current, next.0, current_dist, next_dist)
            {
                clipped.push((intersection, clipped_id(plane_index, i)));
            }
        } else if !current_inside && next_inside {
            if let Some(intersection) =
                line_plane_intersection(current, next.0, current_dist, next_dist)
            {
                clipped.push((intersection, clipped_id(plane_index, i)));
            }
            clipped.push(next);
        }
    }

    clipped
}

fn line_plane_intersection(start: Vec3, end: Vec3, start_dist: f32, end_dist: f32) -> Option<Vec3> {
    let denom = start_dist - end_dist;
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let t = start_dist / denom;
    Some(start + (end - start) * t)
}

/// Clips the segment `[a, b]` against every plane, keeping the original ids of
/// endpoints that survive.
fn clip_segment_by_planes(a: (Vec3, u32), b: (Vec3, u32), planes: &[Plane]) -> Vec<(Vec3, u32)> {
    let (mut start, mut end) = (a, b);
    for (index, plane) in planes.iter().enumerate() {
        let d0 = plane.signed_distance(start.0);
        let d1 = plane.signed_distance(end.0);
        match (d0 <= EPSILON, d1 <= EPSILON) {
            (true, true) => {}
            (false, false) => return Vec::new(),
            (true, false) => {
                if let Some(p) = line_plane_intersection(start.0, end.0, d0, d1) {
                    end = (p, clipped_id(index, 1));
                }
            }
            (false, true) => {
                if let Some(p) = line_plane_intersection(start.0, end.0, d0, d1) {
                    start = (p, clipped_id(index, 0));
                }
            }
        }
    }
    vec![start, end]
}

/// Side planes of a reference feature, oriented so the feature lies on their negative side.
fn reference_planes(reference: &[Vec3], normal: Vec3) -> Vec<Plane> {
    match reference.len() {
        0 | 1 => Vec::new(),
        2 => {
            let edge = reference[1] - reference[0];
            vec![
                Plane::from_point_normal(reference[1], edge),
                Plane::from_point_normal(reference[0], -edge),
            ]
        }
        count => {
            let centroid = reference.iter().copied().sum::<Vec3>() / count as f32;
            (0..count)
                .filter_map(|i| {
                    let start = reference[i];
                    let end = reference[(i + 1) % count];
                    let side = (end - start).cross(normal);
                    if side.length_squared() <= f32::EPSILON {
                        return None;
                    }
                    let plane = Plane::from_point_normal(start, side);
                    if plane.signed_distance(centroid) > 0.0 {
                        Some(Plane::from_point_normal(start, -side))
                    } else {
                        Some(plane)
                    }
                })
                .collect()
        }
    }
}

/// Clips an incident face (point, segment or polygon) against the side planes of a
/// reference face.
pub fn clip_face(reference: &[Vec3], incident: &[Vec3], normal: Vec3) -> Vec<(Vec3, u32)> {
    let planes = reference_planes(reference, normal);
    let tagged: Vec<(Vec3, u32)> = incident
        .iter()
        .enumerate()
        .map(|(i, p)| (*p, i as u32))
        .collect();
    match tagged.len() {
        0 => Vec::new(),
        1 => tagged,
        2 => clip_segment_by_planes(tagged[0], tagged[1], &planes),
        _ => clip_polygon(&tagged, &planes),
    }
}

/// Planar counterpart of [`clip_face`]: clips the incident segment to the slab spanned
/// by the reference segment.
pub fn clip_segment(reference: &[Vec2], incident: &[Vec2], _normal: Vec2) -> Vec<(Vec2, u32)> {
    let tagged: Vec<(Vec2, u32)> = incident
        .iter()
        .enumerate()
        .map(|(i, p)| (*p, i as u32))
        .collect();
    if reference.len() < 2 || tagged.len() < 2 {
        return tagged;
    }

    let edge = reference[1] - reference[0];
    let length = edge.length();
    if length <= f32::EPSILON {
        return tagged;
    }
    let tangent = edge / length;
    let lo = tangent.dot(reference[0]);
    let hi = tangent.dot(reference[1]);

    let (mut start, mut end) = (tagged[0], tagged[1]);
    let bounds = [(lo, -1.0), (hi, 1.0)];
    for (index, (limit, sign)) in bounds.into_iter().enumerate() {
        let d0 = sign * (tangent.dot(start.0) - limit);
        let d1 = sign * (tangent.dot(end.0) - limit);
        match (d0 <= EPSILON, d1 <= EPSILON) {
            (true, true) => {}
            (false, false) => return Vec::new(),
            (true, false) => {
                let t = d0 / (d0 - d1);
                end = (start.0 + (end.0 - start.0) * t, 2 + index as u32);
            }
            (false, true) => {
                let t = d0 / (d0 - d1);
                start = (start.0 + (end.0 - start.0) * t, 2 + index as u32);
            }
        }
    }
    vec![start, end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn square_clipped_by_smaller_square() {
        let reference = [
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
        ];
        let incident = [
            Vec3::new(2.0, -0.1, 0.5),
            Vec3::new(0.0, -0.1, 0.5),
            Vec3::new(0.0, -0.1, -0.5),
            Vec3::new(2.0, -0.1, -0.5),
        ];
        let clipped = clip_face(&reference, &incident, Vec3::Y);
        assert_eq!(clipped.len(), 4);
        for (p, _) in &clipped {
            assert!(p.x <= 1.0 + 1e-4);
            assert!(p.x >= -1e-4);
        }
        assert!(clipped.iter().any(|(_, id)| id & CLIPPED_FLAG != 0));
        assert!(clipped.iter().any(|(_, id)| *id == 1));
    }

    #[test]
    fn segment_clipped_to_reference_slab() {
        let reference = [Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)];
        let incident = [Vec2::new(-3.0, -0.1), Vec2::new(0.5, -0.1)];
        let clipped = clip_segment(&reference, &incident, Vec2::Y);
        assert_eq!(clipped.len(), 2);
        assert_relative_eq!(clipped[0].0.x, -1.0, epsilon = 1e-5);
        assert_eq!(clipped[0].1, 2);
        assert_relative_eq!(clipped[1].0.x, 0.5, epsilon = 1e-5);
        assert_eq!(clipped[1].1, 1);
    }

    #[test]
    fn disjoint_segment_is_rejected() {
        let reference = [Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let incident = [Vec3::new(2.0, 0.0, 1.0), Vec3::new(3.0, 0.0, -1.0)];
        assert!(clip_face(&reference, &incident, Vec3::Y).is_empty());
    }
}
