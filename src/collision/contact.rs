//! Contact manifolds: one per pair of sub-shapes, built from the closest features
//! of the two colliders.

use serde::{Deserialize, Serialize};

use crate::core::collider::Collider;
use crate::core::types::{Material, Transform};
use crate::math::{Dim, Real, Vector};

use super::queries;
use super::shapes::Shape;

/// Cosine above which a feature is considered facing the contact normal.
const FEATURE_ALIGNMENT: Real = 0.9;

/// Tag added to feature ids when the reference face belongs to the second collider.
const FLIPPED_FEATURE: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ContactPoint<D: Dim> {
    /// Contact point on the first collider, in that collider's local frame.
    pub local_p1: D::Vector,
    /// Contact point on the second collider, in that collider's local frame.
    pub local_p2: D::Vector,
    /// Positive when penetrating, negative for a speculative gap.
    pub depth: Real,
    pub feature_id: u32,
    pub normal_impulse: Real,
    pub tangent_impulses: [Real; 2],
}

/// Contacts between one sub-shape of each collider. Convex colliders use sub-shape 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ContactManifold<D: Dim> {
    pub subshape1: usize,
    pub subshape2: usize,
    /// Normal pointing from the first collider toward the second, in the first collider's frame.
    pub local_normal1: D::Vector,
    /// Same normal in world space.
    pub normal: D::Vector,
    pub points: Vec<ContactPoint<D>>,
    pub friction: Real,
    pub restitution: Real,
}

impl<D: Dim> ContactManifold<D> {
    pub fn deepest_depth(&self) -> Real {
        self.points
            .iter()
            .map(|point| point.depth)
            .fold(Real::NEG_INFINITY, Real::max)
    }

    /// Copies impulses from `previous` onto points with the same feature id.
    pub(crate) fn warm_start_from(&mut self, previous: &ContactManifold<D>) {
        for point in &mut self.points {
            if let Some(old) = previous
                .points
                .iter()
                .find(|old| old.feature_id == point.feature_id)
            {
                point.normal_impulse = old.normal_impulse;
                point.tangent_impulses = old.tangent_impulses;
            }
        }
    }
}

/// World-space contact found between two convex shapes.
struct RawPoint<D: Dim> {
    point1: D::Vector,
    point2: D::Vector,
    depth: Real,
    feature_id: u32,
}

/// Builds every manifold between two colliders whose gap is below `prediction`.
pub fn generate_manifolds<D: Dim>(
    collider1: &Collider<D>,
    collider2: &Collider<D>,
    prediction: Real,
) -> Vec<ContactManifold<D>> {
    let shape1 = collider1.shape();
    let shape2 = collider2.shape();
    let pose1 = collider1.position();
    let pose2 = collider2.position();
    let material = Material::combine_pair(&collider1.material, &collider2.material);

    let mut manifolds = Vec::new();
    let mut push = |subshape1: usize, subshape2: usize, found: Option<(D::Vector, Vec<RawPoint<D>>)>| {
        if let Some((normal, points)) = found {
            manifolds.push(ContactManifold {
                subshape1,
                subshape2,
                local_normal1: pose1.inverse_transform_vector(normal),
                normal,
                points: points
                    .into_iter()
                    .map(|raw| ContactPoint {
                        local_p1: pose1.inverse_transform_point(raw.point1),
                        local_p2: pose2.inverse_transform_point(raw.point2),
                        depth: raw.depth,
                        feature_id: raw.feature_id,
                        normal_impulse: 0.0,
                        tangent_impulses: [0.0; 2],
                    })
                    .collect(),
                friction: material.friction,
                restitution: material.restitution,
            });
        }
    };

    match (shape1.is_composite(), shape2.is_composite()) {
        (true, true) => {}
        (false, false) => push(0, 0, convex_contacts(shape1, pose1, shape2, pose2, prediction)),
        (true, false) => {
            for (index, element) in overlapping_elements(shape1, pose1, shape2, pose2, prediction) {
                push(index, 0, convex_contacts(&element, pose1, shape2, pose2, prediction));
            }
        }
        (false, true) => {
            for (index, element) in overlapping_elements(shape2, pose2, shape1, pose1, prediction) {
                push(0, index, convex_contacts(shape1, pose1, &element, pose2, prediction));
            }
        }
    }
    manifolds
}

/// Mesh elements of `composite` whose bounds come within `prediction` of `other`.
fn overlapping_elements<D: Dim>(
    composite: &Shape<D>,
    composite_pose: &Transform<D>,
    other: &Shape<D>,
    other_pose: &Transform<D>,
    prediction: Real,
) -> Vec<(usize, Shape<D>)> {
    let Some(mesh) = composite.as_mesh() else {
        return Vec::new();
    };
    let region = other
        .compute_aabb(other_pose)
        .loosened(prediction)
        .transformed(&composite_pose.inverse());
    mesh.elements_intersecting(&region)
        .into_iter()
        .filter_map(|index| composite.element_shape(index).map(|shape| (index, shape)))
        .collect()
}

/// Contact normal (world, from shape 1 toward shape 2) and points between two convex shapes.
fn convex_contacts<D: Dim>(
    shape1: &Shape<D>,
    pose1: &Transform<D>,
    shape2: &Shape<D>,
    pose2: &Transform<D>,
    prediction: Real,
) -> Option<(D::Vector, Vec<RawPoint<D>>)> {
    if let (Shape::Ball { radius: r1 }, Shape::Ball { radius: r2 }) = (shape1, shape2) {
        return ball_ball(pose1.translation, *r1, pose2.translation, *r2, prediction);
    }

    let contact = queries::contact(shape1, pose1, shape2, pose2, prediction)?;
    let normal = contact.normal;
    let single = || {
        Some((
            normal,
            vec![RawPoint {
                point1: contact.point_a,
                point2: contact.point_b,
                depth: -contact.distance,
                feature_id: 0,
            }],
        ))
    };

    let local_dir1 = pose1.inverse_transform_vector(normal);
    let local_dir2 = pose2.inverse_transform_vector(-normal);
    let feature1: Vec<D::Vector> = shape1
        .support_feature(local_dir1)
        .into_iter()
        .map(|p| pose1.transform_point(p))
        .collect();
    let feature2: Vec<D::Vector> = shape2
        .support_feature(local_dir2)
        .into_iter()
        .map(|p| pose2.transform_point(p))
        .collect();
    if feature1.len() < 2 || feature2.len() < 2 {
        return single();
    }

    let face_normal1 = pose1.transform_vector(shape1.feature_normal(local_dir1));
    let face_normal2 = pose2.transform_vector(shape2.feature_normal(local_dir2));
    let alignment1 = face_normal1.dot(normal);
    let alignment2 = -face_normal2.dot(normal);
    if alignment1.max(alignment2) < FEATURE_ALIGNMENT {
        return single();
    }

    let flipped = alignment2 > alignment1;
    let (reference, incident, reference_normal) = if flipped {
        (&feature2, &feature1, face_normal2)
    } else {
        (&feature1, &feature2, face_normal1)
    };
    let offset = reference_normal.dot(reference[0]);
    let tag = if flipped { FLIPPED_FEATURE } else { 0 };

    let mut points: Vec<RawPoint<D>> = D::clip_features(reference, incident, reference_normal)
        .into_iter()
        .filter_map(|(incident_point, id)| {
            let separation = reference_normal.dot(incident_point) - offset;
            if separation > prediction {
                return None;
            }
            let reference_point = incident_point - reference_normal * separation;
            let (point1, point2) = if flipped {
                (incident_point, reference_point)
            } else {
                (reference_point, incident_point)
            };
            Some(RawPoint {
                point1,
                point2,
                depth: -separation,
                feature_id: id | tag,
            })
        })
        .collect();

    if points.is_empty() {
        return single();
    }
    reduce_points(&mut points, D::MAX_MANIFOLD_POINTS);
    let manifold_normal = if flipped { -reference_normal } else { reference_normal };
    Some((manifold_normal, points))
}

fn ball_ball<D: Dim>(
    center1: D::Vector,
    radius1: Real,
    center2: D::Vector,
    radius2: Real,
    prediction: Real,
) -> Option<(D::Vector, Vec<RawPoint<D>>)> {
    let offset = center2 - center1;
    let distance = offset.length();
    let gap = distance - radius1 - radius2;
    if gap > prediction {
        return None;
    }
    let normal = if distance > Real::EPSILON {
        offset / distance
    } else {
        D::basis(1)
    };
    Some((
        normal,
        vec![RawPoint {
            point1: center1 + normal * radius1,
            point2: center2 - normal * radius2,
            depth: -gap,
            feature_id: 0,
        }],
    ))
}

/// Keeps the deepest point, then greedily the points farthest from those already kept.
fn reduce_points<D: Dim>(points: &mut Vec<RawPoint<D>>, max_points: usize) {
    if points.len() <= max_points {
        return;
    }
    let mut kept: Vec<RawPoint<D>> = Vec::with_capacity(max_points);
    let deepest = points
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.depth.total_cmp(&b.depth))
        .map(|(index, _)| index)
        .unwrap_or(0);
    kept.push(points.swap_remove(deepest));

    while kept.len() < max_points && !points.is_empty() {
        let farthest = points
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let spread = kept
                    .iter()
                    .map(|k| (k.point2 - candidate.point2).length_squared())
                    .fold(Real::INFINITY, Real::min);
                (index, spread)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
            .unwrap_or(0);
        kept.push(points.swap_remove(farthest));
    }
    kept.sort_by_key(|point| point.feature_id);
    *points = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::{ColliderBuilder, ColliderSet};
    use crate::core::rigidbody::{RigidBodyBuilder, RigidBodySet};
    use crate::math::{Dim2, Dim3};
    use approx::assert_relative_eq;
    use glam::{Vec2, Vec3};

    fn placed<D: Dim>(builder: ColliderBuilder<D>, translation: D::Vector) -> Collider<D> {
        let mut bodies = RigidBodySet::<D>::new();
        let mut colliders = ColliderSet::new();
        let body = bodies.insert(RigidBodyBuilder::dynamic().translation(translation).build().unwrap());
        let handle = colliders.insert(builder.build().unwrap(), body, &mut bodies).unwrap();
        colliders.get(handle).unwrap().clone()
    }

    #[test]
    fn resting_box_gets_four_points() {
        let ground = placed(ColliderBuilder::<Dim3>::cuboid(Vec3::new(5.0, 0.5, 5.0)), Vec3::ZERO);
        let cube = placed(ColliderBuilder::<Dim3>::cuboid(Vec3::splat(0.5)), Vec3::new(0.0, 0.99, 0.0));
        let manifolds = generate_manifolds(&ground, &cube, 0.01);
        assert_eq!(manifolds.len(), 1);
        let manifold = &manifolds[0];
        assert_eq!(manifold.points.len(), 4);
        assert_relative_eq!(manifold.normal.y, 1.0, epsilon = 1e-4);
        for point in &manifold.points {
            assert_relative_eq!(point.depth, 0.01, epsilon = 1e-4);
        }
    }

    #[test]
    fn planar_box_on_box_gets_two_points() {
        let ground = placed(ColliderBuilder::<Dim2>::cuboid(Vec2::new(5.0, 0.5)), Vec2::ZERO);
        let crate_ = placed(ColliderBuilder::<Dim2>::cuboid(Vec2::splat(0.5)), Vec2::new(1.0, 0.99));
        let manifolds = generate_manifolds(&ground, &crate_, 0.01);
        assert_eq!(manifolds[0].points.len(), 2);
        let xs: Vec<Real> = manifolds[0]
            .points
            .iter()
            .map(|p| ground.position().transform_point(p.local_p1).x)
            .collect();
        assert!(xs.iter().any(|x| (x - 0.5).abs() < 1e-3));
        assert!(xs.iter().any(|x| (x - 1.5).abs() < 1e-3));
    }

    #[test]
    fn balls_use_the_center_axis() {
        let a = placed(ColliderBuilder::<Dim3>::ball(1.0), Vec3::ZERO);
        let b = placed(ColliderBuilder::<Dim3>::ball(1.0), Vec3::new(1.5, 0.0, 0.0));
        let manifolds = generate_manifolds(&a, &b, 0.0);
        assert_relative_eq!(manifolds[0].normal.x, 1.0);
        assert_relative_eq!(manifolds[0].points[0].depth, 0.5, epsilon = 1e-5);

        let coincident = placed(ColliderBuilder::<Dim3>::ball(1.0), Vec3::ZERO);
        let manifolds = generate_manifolds(&a, &coincident, 0.0);
        assert!(manifolds[0].normal.is_finite());
    }

    #[test]
    fn distant_pairs_produce_nothing() {
        let a = placed(ColliderBuilder::<Dim2>::capsule(0.5, 0.2), Vec2::ZERO);
        let b = placed(ColliderBuilder::<Dim2>::cuboid(Vec2::splat(0.5)), Vec2::new(3.0, 0.0));
        assert!(generate_manifolds(&a, &b, 0.1).is_empty());
    }

    #[test]
    fn heightfield_yields_per_element_manifolds() {
        let field = placed(
            ColliderBuilder::<Dim3>::heightfield(vec![0.0; 9], 2, 2, Vec3::new(4.0, 1.0, 4.0)),
            Vec3::ZERO,
        );
        let ball = placed(ColliderBuilder::<Dim3>::ball(0.5), Vec3::new(0.3, 0.45, 0.3));
        let manifolds = generate_manifolds(&field, &ball, 0.01);
        assert!(!manifolds.is_empty());
        for manifold in &manifolds {
            assert_eq!(manifold.subshape2, 0);
            assert!(manifold.normal.y > 0.9);
        }
    }

    #[test]
    fn warm_start_matches_feature_ids() {
        let ground = placed(ColliderBuilder::<Dim2>::cuboid(Vec2::new(5.0, 0.5)), Vec2::ZERO);
        let crate_ = placed(ColliderBuilder::<Dim2>::cuboid(Vec2::splat(0.5)), Vec2::new(0.0, 0.99));
        let mut previous = generate_manifolds(&ground, &crate_, 0.01).remove(0);
        for point in &mut previous.points {
            point.normal_impulse = 2.0;
        }
        let mut current = generate_manifolds(&ground, &crate_, 0.01).remove(0);
        current.warm_start_from(&previous);
        assert!(current.points.iter().all(|p| p.normal_impulse == 2.0));
    }
}
