use serde::{Deserialize, Serialize};

use crate::core::mesh::{Aabb, HeightField, TriMesh};
use crate::core::types::{MassProperties, Transform};
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{Dim, Real, Vector};

/// Cosine above which a flat feature is preferred over a single support point.
const FLAT_FEATURE_COS: Real = 0.95;
/// Relative tolerance used to gather hull vertices lying on the support face.
const FACE_TOLERANCE: Real = 1.0e-3;

/// Closed set of collision shapes. Capsules, cylinders and cones are aligned with local Y.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Shape<D: Dim> {
    Ball { radius: Real },
    Cuboid { half_extents: D::Vector },
    Capsule { half_height: Real, radius: Real },
    ConvexHull { points: Vec<D::Vector> },
    Cylinder { half_height: Real, radius: Real },
    Cone { half_height: Real, radius: Real },
    TriMesh(TriMesh<D>),
    HeightField(HeightField<D>),
}

/// Discriminant used by the pair dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Ball,
    Cuboid,
    Capsule,
    ConvexHull,
    Cylinder,
    Cone,
    TriMesh,
    HeightField,
}

fn positive(value: Real, what: &str) -> PhysicsResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::DegenerateInput(format!(
            "{what} must be positive and finite, got {value}"
        )))
    }
}

impl<D: Dim> Shape<D> {
    pub fn ball(radius: Real) -> Self {
        Shape::Ball { radius }
    }

    pub fn cuboid(half_extents: D::Vector) -> Self {
        Shape::Cuboid { half_extents }
    }

    pub fn capsule(half_height: Real, radius: Real) -> Self {
        Shape::Capsule {
            half_height,
            radius,
        }
    }

    pub fn convex_hull(points: Vec<D::Vector>) -> Self {
        Shape::ConvexHull { points }
    }

    pub fn cylinder(half_height: Real, radius: Real) -> Self {
        Shape::Cylinder {
            half_height,
            radius,
        }
    }

    pub fn cone(half_height: Real, radius: Real) -> Self {
        Shape::Cone {
            half_height,
            radius,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Ball { .. } => ShapeKind::Ball,
            Shape::Cuboid { .. } => ShapeKind::Cuboid,
            Shape::Capsule { .. } => ShapeKind::Capsule,
            Shape::ConvexHull { .. } => ShapeKind::ConvexHull,
            Shape::Cylinder { .. } => ShapeKind::Cylinder,
            Shape::Cone { .. } => ShapeKind::Cone,
            Shape::TriMesh(_) => ShapeKind::TriMesh,
            Shape::HeightField(_) => ShapeKind::HeightField,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Shape::TriMesh(_) | Shape::HeightField(_))
    }

    /// Mesh backing a composite shape.
    pub fn as_mesh(&self) -> Option<&TriMesh<D>> {
        match self {
            Shape::TriMesh(mesh) => Some(mesh),
            Shape::HeightField(field) => Some(field.mesh()),
            _ => None,
        }
    }

    /// Element `index` of a composite shape as a standalone convex shape.
    pub fn element_shape(&self, index: usize) -> Option<Shape<D>> {
        let points = self.as_mesh()?.element_points(index);
        if points.is_empty() {
            None
        } else {
            Some(Shape::ConvexHull { points })
        }
    }

    /// Checks dimensions are finite and strictly positive.
    pub fn validate(&self) -> PhysicsResult<()> {
        match self {
            Shape::Ball { radius } => positive(*radius, "ball radius"),
            Shape::Cuboid { half_extents } => {
                if half_extents.is_finite() && half_extents.min_element() > 0.0 {
                    Ok(())
                } else {
                    Err(PhysicsError::DegenerateInput(format!(
                        "cuboid half extents must be positive and finite, got {half_extents:?}"
                    )))
                }
            }
            Shape::Capsule {
                half_height,
                radius,
            } => {
                positive(*radius, "capsule radius")?;
                if half_height.is_finite() && *half_height >= 0.0 {
                    Ok(())
                } else {
                    Err(PhysicsError::DegenerateInput(
                        "capsule half height must be finite and non-negative".into(),
                    ))
                }
            }
            Shape::Cylinder {
                half_height,
                radius,
            }
            | Shape::Cone {
                half_height,
                radius,
            } => {
                positive(*half_height, "half height")?;
                positive(*radius, "radius")
            }
            Shape::ConvexHull { points } => {
                if points.len() < D::DIM {
                    return Err(PhysicsError::DegenerateInput(format!(
                        "convex hull needs at least {} points, got {}",
                        D::DIM,
                        points.len()
                    )));
                }
                if points.iter().any(|p| !p.is_finite()) {
                    return Err(PhysicsError::DegenerateInput(
                        "convex hull point is not finite".into(),
                    ));
                }
                Ok(())
            }
            // Meshes are validated on construction.
            Shape::TriMesh(_) | Shape::HeightField(_) => Ok(()),
        }
    }

    /// Radius that is added around the core shape (balls and capsules).
    pub fn margin(&self) -> Real {
        match self {
            Shape::Ball { radius } | Shape::Capsule { radius, .. } => *radius,
            _ => 0.0,
        }
    }

    /// Support point of the shape without its margin, in local space.
    pub fn core_support(&self, dir: D::Vector) -> D::Vector {
        let up = D::basis(1);
        match self {
            Shape::Ball { .. } => D::Vector::ZERO,
            Shape::Capsule { half_height, .. } => {
                if dir.component(1) >= 0.0 {
                    up * *half_height
                } else {
                    up * -*half_height
                }
            }
            Shape::Cuboid { half_extents } => {
                let mut point = *half_extents;
                for axis in 0..D::DIM {
                    if dir.component(axis) < 0.0 {
                        point.set_component(axis, -half_extents.component(axis));
                    }
                }
                point
            }
            Shape::ConvexHull { points } => support_of_points::<D>(points, dir),
            Shape::Cylinder {
                half_height,
                radius,
            } => {
                let radial = radial_direction::<D>(dir) * *radius;
                let cap = if dir.component(1) >= 0.0 {
                    *half_height
                } else {
                    -*half_height
                };
                radial + up * cap
            }
            Shape::Cone {
                half_height,
                radius,
            } => {
                let apex = up * *half_height;
                let rim = radial_direction::<D>(dir) * *radius - up * *half_height;
                if apex.dot(dir) >= rim.dot(dir) {
                    apex
                } else {
                    rim
                }
            }
            Shape::TriMesh(mesh) => support_of_points::<D>(mesh.vertices(), dir),
            Shape::HeightField(field) => support_of_points::<D>(field.mesh().vertices(), dir),
        }
    }

    /// Full support point (core plus margin) in local space.
    pub fn support(&self, dir: D::Vector) -> D::Vector {
        let margin = self.margin();
        if margin > 0.0 {
            self.core_support(dir) + dir.normalize_or_zero() * margin
        } else {
            self.core_support(dir)
        }
    }

    /// World-space support map for this shape placed at `pose`.
    pub fn world_support<'a>(
        &'a self,
        pose: &'a Transform<D>,
    ) -> impl Fn(D::Vector) -> D::Vector + 'a {
        move |dir: D::Vector| {
            pose.transform_point(self.support(pose.inverse_transform_vector(dir)))
        }
    }

    /// World-space support map of the core shape (margin excluded).
    pub fn world_core_support<'a>(
        &'a self,
        pose: &'a Transform<D>,
    ) -> impl Fn(D::Vector) -> D::Vector + 'a {
        move |dir: D::Vector| {
            pose.transform_point(self.core_support(pose.inverse_transform_vector(dir)))
        }
    }

    /// Vertices of the surface feature most aligned with `dir`, in local space.
    /// Curved regions yield a single support point.
    pub fn support_feature(&self, dir: D::Vector) -> Vec<D::Vector> {
        let dir = dir.normalize_or_zero();
        if dir == D::Vector::ZERO {
            return vec![self.support(D::basis(1))];
        }
        let up = D::basis(1);
        match self {
            Shape::Ball { .. } => vec![self.support(dir)],
            Shape::Cuboid { half_extents } => cuboid_face::<D>(*half_extents, dir),
            Shape::Capsule {
                half_height,
                radius,
            } => {
                let axial = dir.component(1);
                if axial.abs() < 1.0 - FLAT_FEATURE_COS && *half_height > 0.0 {
                    let side = radial_direction::<D>(dir) * *radius;
                    vec![side + up * *half_height, side - up * *half_height]
                } else {
                    vec![self.support(dir)]
                }
            }
            Shape::Cylinder {
                half_height,
                radius,
            } => {
                let axial = dir.component(1);
                if axial.abs() >= FLAT_FEATURE_COS {
                    let cap = up * half_height.copysign(axial);
                    disc_points::<D>(cap, *radius)
                } else if axial.abs() < 1.0 - FLAT_FEATURE_COS {
                    let side = radial_direction::<D>(dir) * *radius;
                    vec![side + up * *half_height, side - up * *half_height]
                } else {
                    vec![self.support(dir)]
                }
            }
            Shape::Cone {
                half_height,
                radius,
            } => {
                if dir.component(1) <= -FLAT_FEATURE_COS {
                    disc_points::<D>(up * -*half_height, *radius)
                } else {
                    vec![self.support(dir)]
                }
            }
            Shape::ConvexHull { points } => hull_face::<D>(points, dir),
            Shape::TriMesh(_) | Shape::HeightField(_) => vec![self.support(dir)],
        }
    }

    /// Outward direction of `support_feature(dir)`: the face normal for flat features.
    pub fn feature_normal(&self, dir: D::Vector) -> D::Vector {
        let dir = dir.normalize_or_zero();
        match self {
            Shape::Cuboid { .. } => {
                let axis = dominant_axis::<D>(dir);
                D::basis(axis) * dir.component(axis).signum()
            }
            Shape::Cylinder { .. } if dir.component(1).abs() >= FLAT_FEATURE_COS => {
                D::basis(1) * dir.component(1).signum()
            }
            Shape::Cone { .. } if dir.component(1) <= -FLAT_FEATURE_COS => -D::basis(1),
            _ => dir,
        }
    }

    pub fn local_aabb(&self) -> Aabb<D> {
        let up = D::basis(1);
        match self {
            Shape::Ball { radius } => {
                Aabb::from_half_extents(D::Vector::ZERO, D::Vector::splat(*radius))
            }
            Shape::Cuboid { half_extents } => {
                Aabb::from_half_extents(D::Vector::ZERO, *half_extents)
            }
            Shape::Capsule {
                half_height,
                radius,
            } => Aabb::from_half_extents(
                D::Vector::ZERO,
                D::Vector::splat(*radius) + up * *half_height,
            ),
            Shape::Cylinder {
                half_height,
                radius,
            }
            | Shape::Cone {
                half_height,
                radius,
            } => {
                let mut half = D::Vector::splat(*radius);
                half.set_component(1, *half_height);
                Aabb::from_half_extents(D::Vector::ZERO, half)
            }
            Shape::ConvexHull { points } => Aabb::from_points(points),
            Shape::TriMesh(mesh) => mesh.aabb(),
            Shape::HeightField(field) => field.mesh().aabb(),
        }
    }

    /// World-space bounds at `pose`.
    pub fn compute_aabb(&self, pose: &Transform<D>) -> Aabb<D> {
        match self {
            Shape::Ball { radius } => {
                Aabb::from_half_extents(pose.translation, D::Vector::splat(*radius))
            }
            Shape::ConvexHull { points } => {
                let world: Vec<D::Vector> =
                    points.iter().map(|p| pose.transform_point(*p)).collect();
                Aabb::from_points(&world)
            }
            _ => self.local_aabb().transformed(pose),
        }
    }

    /// Smallest distance from the local origin to the shape surface. Used as the CCD
    /// motion threshold.
    pub fn ccd_thickness(&self) -> Real {
        match self {
            Shape::Ball { radius } | Shape::Capsule { radius, .. } => *radius,
            Shape::Cuboid { half_extents } => half_extents.min_element(),
            Shape::Cylinder {
                half_height,
                radius,
            }
            | Shape::Cone {
                half_height,
                radius,
            } => half_height.min(*radius),
            _ => self.local_aabb().half_extents().min_element().max(0.0),
        }
    }

    /// Mass properties for the given density. Meshes and heightfields are massless;
    /// hulls, cylinders and cones are approximated by their bounding box.
    pub fn mass_properties(&self, density: Real) -> MassProperties<D> {
        match self {
            Shape::Ball { radius } => {
                let mass = D::ball_volume(*radius) * density;
                MassProperties::new(D::Vector::ZERO, mass, D::ball_inertia(*radius, mass))
            }
            Shape::Cuboid { half_extents } => {
                let mass = box_volume::<D>(*half_extents) * density;
                MassProperties::new(
                    D::Vector::ZERO,
                    mass,
                    D::cuboid_inertia(*half_extents, mass),
                )
            }
            Shape::Capsule {
                half_height,
                radius,
            } => {
                let mass = D::capsule_volume(*half_height, *radius) * density;
                MassProperties::new(
                    D::Vector::ZERO,
                    mass,
                    D::capsule_inertia(*half_height, *radius, mass),
                )
            }
            Shape::ConvexHull { .. } | Shape::Cylinder { .. } | Shape::Cone { .. } => {
                let bounds = self.local_aabb();
                let half = bounds.half_extents();
                let mass = box_volume::<D>(half) * density;
                MassProperties::new(bounds.center(), mass, D::cuboid_inertia(half, mass))
            }
            Shape::TriMesh(_) | Shape::HeightField(_) => MassProperties::zero(),
        }
    }
}

fn box_volume<D: Dim>(half_extents: D::Vector) -> Real {
    (0..D::DIM)
        .map(|axis| 2.0 * half_extents.component(axis))
        .product()
}

fn support_of_points<D: Dim>(points: &[D::Vector], dir: D::Vector) -> D::Vector {
    points
        .iter()
        .copied()
        .max_by(|a, b| a.dot(dir).total_cmp(&b.dot(dir)))
        .unwrap_or(D::Vector::ZERO)
}

/// Unit direction of `dir` with its Y component removed.
fn radial_direction<D: Dim>(dir: D::Vector) -> D::Vector {
    let mut radial = dir;
    radial.set_component(1, 0.0);
    radial.normalize_or_zero()
}

fn dominant_axis<D: Dim>(dir: D::Vector) -> usize {
    (0..D::DIM)
        .max_by(|&a, &b| {
            dir.component(a)
                .abs()
                .total_cmp(&dir.component(b).abs())
        })
        .unwrap_or(0)
}

/// Face of a box most aligned with `dir`, vertices in cyclic order.
fn cuboid_face<D: Dim>(half_extents: D::Vector, dir: D::Vector) -> Vec<D::Vector> {
    let axis = dominant_axis::<D>(dir);
    let mut center = D::Vector::ZERO;
    center.set_component(axis, half_extents.component(axis).copysign(dir.component(axis)));
    let others: Vec<usize> = (0..D::DIM).filter(|&a| a != axis).collect();

    // Sign patterns walk the face boundary: (+,+), (-,+), (-,-), (+,-).
    let patterns: &[(Real, Real)] = if others.len() == 1 {
        &[(1.0, 0.0), (-1.0, 0.0)]
    } else {
        &[(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]
    };
    patterns
        .iter()
        .map(|&(su, sv)| {
            let mut vertex = center;
            vertex.set_component(others[0], su * half_extents.component(others[0]));
            if let Some(&second) = others.get(1) {
                vertex.set_component(second, sv * half_extents.component(second));
            }
            vertex
        })
        .collect()
}

/// Polygon approximating a flat circular cap centered at `center` and orthogonal to Y.
fn disc_points<D: Dim>(center: D::Vector, radius: Real) -> Vec<D::Vector> {
    let x = D::basis(0) * radius;
    if D::DIM == 2 {
        vec![center + x, center - x]
    } else {
        let z = D::basis(2) * radius;
        vec![center + x, center + z, center - x, center - z]
    }
}

fn hull_face<D: Dim>(points: &[D::Vector], dir: D::Vector) -> Vec<D::Vector> {
    let Some(max) = points
        .iter()
        .map(|p| p.dot(dir))
        .max_by(|a, b| a.total_cmp(b))
    else {
        return Vec::new();
    };
    let extent = points
        .iter()
        .map(|p| p.length())
        .fold(0.0, Real::max)
        .max(1.0);
    let face: Vec<D::Vector> = points
        .iter()
        .copied()
        .filter(|p| p.dot(dir) >= max - FACE_TOLERANCE * extent)
        .collect();
    if face.len() <= 1 {
        return face;
    }

    let [t1, t2] = D::tangents(dir);
    if D::DIM == 2 {
        // A planar face is the segment between the extreme points along the tangent.
        let lo = face
            .iter()
            .copied()
            .min_by(|a, b| a.dot(t1).total_cmp(&b.dot(t1)));
        let hi = face
            .iter()
            .copied()
            .max_by(|a, b| a.dot(t1).total_cmp(&b.dot(t1)));
        return lo.into_iter().chain(hi).collect();
    }

    let mut centroid = D::Vector::ZERO;
    for p in &face {
        centroid += *p;
    }
    centroid = centroid / face.len() as Real;
    let mut ordered = face;
    ordered.sort_by(|a, b| {
        let da = *a - centroid;
        let db = *b - centroid;
        da.dot(t2)
            .atan2(da.dot(t1))
            .total_cmp(&db.dot(t2).atan2(db.dot(t1)))
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Dim2, Dim3};
    use approx::assert_relative_eq;
    use glam::{Vec2, Vec3};

    #[test]
    fn validation_rejects_bad_dimensions() {
        assert!(Shape::<Dim3>::ball(-1.0).validate().is_err());
        assert!(Shape::<Dim3>::ball(Real::NAN).validate().is_err());
        assert!(Shape::<Dim2>::cuboid(Vec2::new(1.0, 0.0)).validate().is_err());
        assert!(Shape::<Dim2>::convex_hull(vec![Vec2::ZERO]).validate().is_err());
        assert!(Shape::<Dim3>::capsule(0.0, 0.5).validate().is_ok());
    }

    #[test]
    fn capsule_support_includes_margin() {
        let capsule = Shape::<Dim3>::capsule(1.0, 0.5);
        let top = capsule.support(Vec3::Y);
        assert_relative_eq!(top.y, 1.5);
        let side = capsule.support(Vec3::X);
        assert_relative_eq!(side.x, 0.5);
    }

    #[test]
    fn cuboid_face_is_cyclic() {
        let face = cuboid_face::<Dim3>(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.1, 0.9, 0.0));
        assert_eq!(face.len(), 4);
        for v in &face {
            assert_relative_eq!(v.y, 2.0);
        }
        // Consecutive vertices share an edge.
        for i in 0..4 {
            let a = face[i];
            let b = face[(i + 1) % 4];
            let differing = (0..3).filter(|&k| (a[k] - b[k]).abs() > 1e-6).count();
            assert_eq!(differing, 1);
        }
    }

    #[test]
    fn hull_face_collects_coplanar_vertices() {
        let hull = Shape::<Dim2>::convex_hull(vec![
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ]);
        let face = hull.support_feature(Vec2::new(0.0, -1.0));
        assert_eq!(face.len(), 2);
        assert!(face.iter().all(|p| (p.y + 1.0).abs() < 1e-6));
    }

    #[test]
    fn mass_of_unit_ball() {
        let props = Shape::<Dim3>::ball(1.0).mass_properties(1.0);
        assert_relative_eq!(props.mass, 4.0 / 3.0 * std::f32::consts::PI, epsilon = 1e-5);
        let disc = Shape::<Dim2>::ball(1.0).mass_properties(2.0);
        assert_relative_eq!(disc.mass, 2.0 * std::f32::consts::PI, epsilon = 1e-5);
        assert_relative_eq!(disc.inertia, 0.5 * disc.mass, epsilon = 1e-5);
    }

    #[test]
    fn rotated_aabb_contains_shape() {
        let shape = Shape::<Dim2>::cuboid(Vec2::new(2.0, 0.5));
        let pose = Transform::new(Vec2::ZERO, crate::math::Rot2::from_angle(std::f32::consts::FRAC_PI_2));
        let aabb = shape.compute_aabb(&pose);
        assert_relative_eq!(aabb.max.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(aabb.max.x, 0.5, epsilon = 1e-5);
    }
}
