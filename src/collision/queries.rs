//! Geometric queries on single shapes and shape pairs: ray casts, point containment,
//! closest points with penetration, and time of impact.

use serde::{Deserialize, Serialize};

use crate::core::mesh::Aabb;
use crate::core::types::Transform;
use crate::math::{Dim, Real, Vector};

use super::gjk::{self, gjk, minkowski_support, point_distance, GjkResult};
use super::shapes::Shape;

const RAY_TOLERANCE: Real = 1.0e-4;
const MAX_ADVANCEMENT_STEPS: usize = 64;

/// Half-line `origin + t * dir`; `t` is measured in multiples of `dir`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Ray<D: Dim> {
    pub origin: D::Vector,
    pub dir: D::Vector,
}

impl<D: Dim> Ray<D> {
    pub fn new(origin: D::Vector, dir: D::Vector) -> Self {
        Self { origin, dir }
    }

    pub fn point_at(&self, t: Real) -> D::Vector {
        self.origin + self.dir * t
    }

    fn to_local(self, pose: &Transform<D>) -> Self {
        Self {
            origin: pose.inverse_transform_point(self.origin),
            dir: pose.inverse_transform_vector(self.dir),
        }
    }

    /// Bounds of the segment `[origin, origin + dir * max_toi]`.
    pub fn aabb(&self, max_toi: Real) -> Aabb<D> {
        let reach = if max_toi.is_finite() { max_toi } else { 1.0e6 };
        let mut bounds = Aabb::empty();
        bounds.extend(self.origin);
        bounds.extend(self.point_at(reach));
        bounds
    }
}

/// Ray hit on a shape. A zero `normal` means the ray started inside a solid shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayIntersection<D: Dim> {
    pub toi: Real,
    pub normal: D::Vector,
}

/// Casts `ray` (world space) against `shape` placed at `pose`.
///
/// When the origin lies inside the shape the hit is reported at `toi = 0` with a zero
/// normal if `solid`, and skipped otherwise.
pub fn cast_ray<D: Dim>(
    shape: &Shape<D>,
    pose: &Transform<D>,
    ray: &Ray<D>,
    max_toi: Real,
    solid: bool,
) -> Option<RayIntersection<D>> {
    let local = ray.to_local(pose);
    let hit = match shape {
        Shape::Ball { radius } => ray_ball::<D>(&local, *radius, max_toi, solid),
        Shape::Cuboid { half_extents } => ray_cuboid::<D>(&local, *half_extents, max_toi, solid),
        Shape::TriMesh(_) | Shape::HeightField(_) => ray_composite(shape, &local, max_toi),
        _ => ray_support_map(shape, &local, max_toi, solid),
    }?;
    Some(RayIntersection {
        toi: hit.toi,
        normal: pose.transform_vector(hit.normal),
    })
}

fn ray_ball<D: Dim>(ray: &Ray<D>, radius: Real, max_toi: Real, solid: bool) -> Option<RayIntersection<D>> {
    let c = ray.origin.length_squared() - radius * radius;
    if c <= 0.0 {
        return inside_hit(solid);
    }
    let a = ray.dir.length_squared();
    if a <= Real::EPSILON {
        return None;
    }
    let b = ray.origin.dot(ray.dir);
    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / a;
    if t < 0.0 || t > max_toi {
        return None;
    }
    Some(RayIntersection {
        toi: t,
        normal: ray.point_at(t) / radius,
    })
}

fn ray_cuboid<D: Dim>(
    ray: &Ray<D>,
    half_extents: D::Vector,
    max_toi: Real,
    solid: bool,
) -> Option<RayIntersection<D>> {
    let inside = (0..D::DIM).all(|axis| ray.origin.component(axis).abs() <= half_extents.component(axis));
    if inside {
        return inside_hit(solid);
    }

    let mut t_min: Real = 0.0;
    let mut t_max = max_toi;
    let mut normal = D::Vector::ZERO;
    for axis in 0..D::DIM {
        let o = ray.origin.component(axis);
        let d = ray.dir.component(axis);
        let h = half_extents.component(axis);
        if d.abs() < Real::EPSILON {
            if o.abs() > h {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t1 = (-h - o) * inv;
        let mut t2 = (h - o) * inv;
        let mut sign = -1.0;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
            sign = 1.0;
        }
        if t1 > t_min {
            t_min = t1;
            normal = D::basis(axis) * sign;
        }
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }
    Some(RayIntersection { toi: t_min, normal })
}

fn inside_hit<D: Dim>(solid: bool) -> Option<RayIntersection<D>> {
    solid.then_some(RayIntersection {
        toi: 0.0,
        normal: D::Vector::ZERO,
    })
}

/// Conservative advancement of the ray against the core shape inflated by its margin.
fn ray_support_map<D: Dim>(
    shape: &Shape<D>,
    ray: &Ray<D>,
    max_toi: Real,
    solid: bool,
) -> Option<RayIntersection<D>> {
    let margin = shape.margin();
    let core = |dir: D::Vector| shape.core_support(dir);
    let (start_distance, _) = point_distance::<D, _>(&core, ray.origin);
    if start_distance <= margin + RAY_TOLERANCE {
        return inside_hit(solid);
    }
    let dir_length = ray.dir.length();
    if dir_length <= Real::EPSILON {
        return None;
    }

    let scale = shape.local_aabb().radius().max(1.0);
    let mut t = 0.0;
    for _ in 0..MAX_ADVANCEMENT_STEPS {
        let p = ray.point_at(t);
        let (distance, closest) = point_distance::<D, _>(&core, p);
        let gap = distance - margin;
        if gap <= RAY_TOLERANCE * scale {
            let normal = if margin > 0.0 && distance > Real::EPSILON {
                (p - closest) / distance
            } else {
                let back = p - ray.dir / dir_length * (0.01 * scale);
                let (_, back_closest) = point_distance::<D, _>(&core, back);
                (back - back_closest).normalize_or_zero()
            };
            return Some(RayIntersection { toi: t, normal });
        }
        // Distance is non-decreasing once the ray heads away from the closest point.
        if ray.dir.dot(closest - p) <= 0.0 {
            return None;
        }
        t += gap / dir_length;
        if t > max_toi {
            return None;
        }
    }
    None
}

fn ray_composite<D: Dim>(shape: &Shape<D>, ray: &Ray<D>, max_toi: Real) -> Option<RayIntersection<D>> {
    let mesh = shape.as_mesh()?;
    let mut best: Option<RayIntersection<D>> = None;
    for index in mesh.elements_intersecting(&ray.aabb(max_toi)) {
        let points = mesh.element_points(index);
        let limit = best.map(|b| b.toi).unwrap_or(max_toi);
        if let Some(hit) = ray_element::<D>(&points, ray, limit) {
            best = Some(hit);
        }
    }
    best
}

/// Unit normal of the hyperplane spanned by a segment (2D) or triangle (3D).
pub fn element_normal<D: Dim>(points: &[D::Vector]) -> Option<D::Vector> {
    let base = *points.first()?;
    let mut frame: Vec<D::Vector> = Vec::new();
    for p in &points[1..] {
        let mut v = *p - base;
        for u in &frame {
            v -= *u * v.dot(*u);
        }
        let length = v.length();
        if length > Real::EPSILON {
            frame.push(v / length);
        }
    }
    if frame.len() + 1 != D::DIM {
        return None;
    }
    (0..D::DIM)
        .map(|axis| {
            let mut r = D::basis(axis);
            for u in &frame {
                r -= *u * r.dot(*u);
            }
            r
        })
        .max_by(|a, b| a.length_squared().total_cmp(&b.length_squared()))
        .map(|r| r.normalize_or_zero())
}

/// Barycentric weights of `point` (assumed on the element's hyperplane) relative to its vertices.
fn element_barycentric<D: Dim>(points: &[D::Vector], point: D::Vector) -> Option<Vec<Real>> {
    let base = points[0];
    let edges: Vec<D::Vector> = points[1..].iter().map(|p| *p - base).collect();
    let m = edges.len();
    let offset = point - base;
    let mut rows = vec![vec![0.0; m + 1]; m];
    for row in 0..m {
        for col in 0..m {
            rows[row][col] = edges[row].dot(edges[col]);
        }
        rows[row][m] = edges[row].dot(offset);
    }
    let mu = gjk::solve_linear(rows, Real::EPSILON)?;
    let mut weights = vec![1.0 - mu.iter().sum::<Real>()];
    weights.extend(mu);
    Some(weights)
}

fn ray_element<D: Dim>(points: &[D::Vector], ray: &Ray<D>, max_toi: Real) -> Option<RayIntersection<D>> {
    let normal = element_normal::<D>(points)?;
    let denom = ray.dir.dot(normal);
    if denom.abs() <= Real::EPSILON {
        return None;
    }
    let t = (points[0] - ray.origin).dot(normal) / denom;
    if t < 0.0 || t > max_toi {
        return None;
    }
    let weights = element_barycentric::<D>(points, ray.point_at(t))?;
    if weights.iter().any(|&w| w < -RAY_TOLERANCE) {
        return None;
    }
    // Mesh elements are two-sided: face the normal against the ray.
    let normal = if denom > 0.0 { -normal } else { normal };
    Some(RayIntersection { toi: t, normal })
}

/// Whether `point` (world space) lies inside `shape` at `pose`. Composite shapes have no interior.
pub fn contains_point<D: Dim>(shape: &Shape<D>, pose: &Transform<D>, point: D::Vector) -> bool {
    let local = pose.inverse_transform_point(point);
    match shape {
        Shape::Ball { radius } => local.length_squared() <= radius * radius,
        Shape::Cuboid { half_extents } => {
            (0..D::DIM).all(|axis| local.component(axis).abs() <= half_extents.component(axis))
        }
        Shape::TriMesh(_) | Shape::HeightField(_) => false,
        _ => {
            let core = |dir: D::Vector| shape.core_support(dir);
            let (distance, _) = point_distance::<D, _>(&core, local);
            distance <= shape.margin() + Real::EPSILON
        }
    }
}

/// Closest features of two convex shapes. `distance` is negative when they penetrate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointContact<D: Dim> {
    pub distance: Real,
    /// Unit direction from A toward B.
    pub normal: D::Vector,
    /// Deepest/closest point on A, world space.
    pub point_a: D::Vector,
    /// Deepest/closest point on B, world space.
    pub point_b: D::Vector,
}

/// Contact between two convex shapes, or `None` when they are farther apart than `max_distance`.
pub fn contact<D: Dim>(
    shape_a: &Shape<D>,
    pose_a: &Transform<D>,
    shape_b: &Shape<D>,
    pose_b: &Transform<D>,
    max_distance: Real,
) -> Option<PointContact<D>> {
    let margin_a = shape_a.margin();
    let margin_b = shape_b.margin();
    let margins = margin_a + margin_b;
    let core_a = shape_a.world_core_support(pose_a);
    let core_b = shape_b.world_core_support(pose_b);
    let initial = pose_b.translation - pose_a.translation;

    match gjk::<D, _, _>(&core_a, &core_b, initial, max_distance + margins) {
        GjkResult::Distant => None,
        GjkResult::Closest {
            distance,
            normal,
            point_a,
            point_b,
        } if distance > Real::EPSILON => {
            let gap = distance - margins;
            if gap > max_distance {
                return None;
            }
            Some(PointContact {
                distance: gap,
                normal,
                point_a: point_a + normal * margin_a,
                point_b: point_b - normal * margin_b,
            })
        }
        _ => Some(penetration(shape_a, pose_a, shape_b, pose_b)),
    }
}

/// Penetration of two overlapping shapes through EPA on the full support maps.
fn penetration<D: Dim>(
    shape_a: &Shape<D>,
    pose_a: &Transform<D>,
    shape_b: &Shape<D>,
    pose_b: &Transform<D>,
) -> PointContact<D> {
    let full_a = shape_a.world_support(pose_a);
    let full_b = shape_b.world_support(pose_b);
    let initial = pose_b.translation - pose_a.translation;

    let epa = match gjk::<D, _, _>(&full_a, &full_b, initial, Real::MAX) {
        GjkResult::Intersecting(simplex) => {
            D::epa(&simplex, |dir| minkowski_support::<D, _, _>(&full_a, &full_b, dir))
        }
        _ => None,
    };

    let (normal, depth) = match epa {
        Some((normal, depth)) if normal.is_finite() && normal != D::Vector::ZERO => (normal, depth),
        _ => {
            // Degenerate overlap: separate along the center offset.
            let mut normal = initial.normalize_or_zero();
            if normal == D::Vector::ZERO {
                normal = D::basis(1);
            }
            let depth = full_a(normal).dot(normal) - full_b(-normal).dot(normal);
            (normal, depth.max(0.0))
        }
    };

    let point_b = full_b(-normal);
    PointContact {
        distance: -depth,
        normal,
        point_a: point_b + normal * depth,
        point_b,
    }
}

/// Overlap test that also handles one composite operand.
pub fn intersection_test<D: Dim>(
    shape_a: &Shape<D>,
    pose_a: &Transform<D>,
    shape_b: &Shape<D>,
    pose_b: &Transform<D>,
) -> bool {
    closest_distance(shape_a, pose_a, shape_b, pose_b, 0.0)
        .map(|distance| distance <= 0.0)
        .unwrap_or(false)
}

/// Smallest signed distance between two shapes up to `max_distance`; composite
/// operands are reduced to their overlapping elements.
pub fn closest_distance<D: Dim>(
    shape_a: &Shape<D>,
    pose_a: &Transform<D>,
    shape_b: &Shape<D>,
    pose_b: &Transform<D>,
    max_distance: Real,
) -> Option<Real> {
    match (shape_a.is_composite(), shape_b.is_composite()) {
        (true, true) => None,
        (false, false) => contact(shape_a, pose_a, shape_b, pose_b, max_distance).map(|c| c.distance),
        (true, false) => composite_distance(shape_a, pose_a, shape_b, pose_b, max_distance),
        (false, true) => composite_distance(shape_b, pose_b, shape_a, pose_a, max_distance),
    }
}

fn composite_distance<D: Dim>(
    composite: &Shape<D>,
    composite_pose: &Transform<D>,
    convex: &Shape<D>,
    convex_pose: &Transform<D>,
    max_distance: Real,
) -> Option<Real> {
    let region = convex
        .compute_aabb(convex_pose)
        .loosened(max_distance)
        .transformed(&composite_pose.inverse());
    let mesh = composite.as_mesh()?;
    mesh.elements_intersecting(&region)
        .into_iter()
        .filter_map(|index| composite.element_shape(index))
        .filter_map(|element| contact(&element, composite_pose, convex, convex_pose, max_distance))
        .map(|c| c.distance)
        .min_by(|a, b| a.total_cmp(b))
}

/// Rigid motion over one interval: the parent frame moves from `start` to `end`
/// while the shape stays at `local` relative to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion<D: Dim> {
    pub start: Transform<D>,
    pub end: Transform<D>,
    pub local: Transform<D>,
}

impl<D: Dim> Motion<D> {
    pub fn new(start: Transform<D>, end: Transform<D>, local: Transform<D>) -> Self {
        Self { start, end, local }
    }

    pub fn stationary(pose: Transform<D>) -> Self {
        Self::new(pose, pose, Transform::identity())
    }

    pub fn pose_at(&self, t: Real) -> Transform<D> {
        self.start.interpolate(&self.end, t).combine(&self.local)
    }

    fn displacement(&self) -> D::Vector {
        self.end.translation - self.start.translation
    }

    fn angle(&self) -> Real {
        let relative = D::compose(&D::inverse_rotation(&self.start.rotation), &self.end.rotation);
        D::rotation_vector(&relative).length()
    }
}

/// Distance from the frame origin to the farthest point of `shape` placed at `local`.
fn bounding_radius<D: Dim>(shape: &Shape<D>, local: &Transform<D>) -> Real {
    let bounds = shape.local_aabb().transformed(local);
    bounds.min.abs().component_max(bounds.max.abs()).length()
}

/// Earliest fraction `t ∈ [0, 1]` of the interval at which the shapes come within
/// `target_distance`, found by conservative advancement.
///
/// Pairs already penetrating at `t = 0` only report an impact when
/// `penetration_is_impact` is set and they are still approaching.
pub fn time_of_impact<D: Dim>(
    shape_a: &Shape<D>,
    motion_a: &Motion<D>,
    shape_b: &Shape<D>,
    motion_b: &Motion<D>,
    target_distance: Real,
    penetration_is_impact: bool,
) -> Option<Real> {
    match (shape_a.is_composite(), shape_b.is_composite()) {
        (true, true) => None,
        (false, false) => convex_time_of_impact(
            shape_a,
            motion_a,
            shape_b,
            motion_b,
            target_distance,
            penetration_is_impact,
        ),
        (true, false) => composite_time_of_impact(
            shape_a,
            motion_a,
            shape_b,
            motion_b,
            target_distance,
            penetration_is_impact,
        ),
        (false, true) => composite_time_of_impact(
            shape_b,
            motion_b,
            shape_a,
            motion_a,
            target_distance,
            penetration_is_impact,
        ),
    }
}

fn composite_time_of_impact<D: Dim>(
    composite: &Shape<D>,
    composite_motion: &Motion<D>,
    convex: &Shape<D>,
    convex_motion: &Motion<D>,
    target_distance: Real,
    penetration_is_impact: bool,
) -> Option<Real> {
    let mesh = composite.as_mesh()?;
    let swept = convex
        .compute_aabb(&convex_motion.pose_at(0.0))
        .merged(&convex.compute_aabb(&convex_motion.pose_at(1.0)))
        .loosened(
            target_distance
                + composite_motion.displacement().length()
                + composite_motion.angle() * bounding_radius(composite, &composite_motion.local),
        );
    let region = swept.transformed(&composite_motion.pose_at(0.0).inverse());

    mesh.elements_intersecting(&region)
        .into_iter()
        .filter_map(|index| composite.element_shape(index))
        .filter_map(|element| {
            convex_time_of_impact(
                &element,
                composite_motion,
                convex,
                convex_motion,
                target_distance,
                penetration_is_impact,
            )
        })
        .min_by(|a, b| a.total_cmp(b))
}

fn convex_time_of_impact<D: Dim>(
    shape_a: &Shape<D>,
    motion_a: &Motion<D>,
    shape_b: &Shape<D>,
    motion_b: &Motion<D>,
    target_distance: Real,
    penetration_is_impact: bool,
) -> Option<Real> {
    let relative_displacement = motion_b.displacement() - motion_a.displacement();
    let angular_bound = motion_a.angle() * bounding_radius(shape_a, &motion_a.local)
        + motion_b.angle() * bounding_radius(shape_b, &motion_b.local);
    let tolerance = (target_distance * 0.1).max(1.0e-4);

    let mut t: Real = 0.0;
    for _ in 0..MAX_ADVANCEMENT_STEPS {
        let pose_a = motion_a.pose_at(t);
        let pose_b = motion_b.pose_at(t);
        let c = contact(shape_a, &pose_a, shape_b, &pose_b, Real::MAX)?;
        let closing_speed = -relative_displacement.dot(c.normal);

        if c.distance < 0.0 && t == 0.0 {
            return (penetration_is_impact && closing_speed > 0.0).then_some(0.0);
        }
        if c.distance <= target_distance + tolerance {
            return (closing_speed > 0.0 || c.distance < 0.0).then_some(t);
        }

        let bound = closing_speed.max(0.0) + angular_bound;
        if bound <= Real::EPSILON {
            return None;
        }
        t += (c.distance - target_distance) / bound;
        if t > 1.0 {
            return None;
        }
    }
    None
}
