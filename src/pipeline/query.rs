//! Scene queries against exact collider poses.
//!
//! [`QueryPipeline::update`] rebuilds a median-split bounding-volume tree from the
//! current body poses; every query then walks the tree and runs the exact shape test
//! on the surviving leaves.

use serde::{Deserialize, Serialize};

use crate::collision::queries::{self, Motion, Ray, RayIntersection};
use crate::collision::shapes::Shape;
use crate::core::collider::{Collider, ColliderSet, CollisionGroups};
use crate::core::mesh::Aabb;
use crate::core::rigidbody::RigidBodySet;
use crate::core::types::Transform;
use crate::math::{Dim, Real, Vector};
use crate::utils::allocator::{ColliderHandle, RigidBodyHandle};

/// Which colliders a query may report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryFilter {
    pub groups: Option<CollisionGroups>,
    pub exclude_sensors: bool,
    pub exclude_collider: Option<ColliderHandle>,
    pub exclude_rigid_body: Option<RigidBodyHandle>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(mut self, groups: CollisionGroups) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn exclude_sensors(mut self) -> Self {
        self.exclude_sensors = true;
        self
    }

    pub fn exclude_collider(mut self, handle: ColliderHandle) -> Self {
        self.exclude_collider = Some(handle);
        self
    }

    pub fn exclude_rigid_body(mut self, handle: RigidBodyHandle) -> Self {
        self.exclude_rigid_body = Some(handle);
        self
    }

    pub fn test<D: Dim>(&self, handle: ColliderHandle, collider: &Collider<D>) -> bool {
        if self.exclude_collider == Some(handle) || self.exclude_rigid_body == Some(collider.parent()) {
            return false;
        }
        if self.exclude_sensors && collider.is_sensor() {
            return false;
        }
        self.groups
            .map_or(true, |groups| groups.test(&collider.collision_groups))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
enum BvhNode<D: Dim> {
    Leaf {
        aabb: Aabb<D>,
        collider: ColliderHandle,
        pose: Transform<D>,
    },
    Internal {
        aabb: Aabb<D>,
        children: [usize; 2],
    },
}

impl<D: Dim> BvhNode<D> {
    fn aabb(&self) -> &Aabb<D> {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

struct LeafInput<D: Dim> {
    aabb: Aabb<D>,
    collider: ColliderHandle,
    pose: Transform<D>,
}

/// Bounding-volume tree over every collider, rebuilt by [`QueryPipeline::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct QueryPipeline<D: Dim> {
    nodes: Vec<BvhNode<D>>,
    root: Option<usize>,
}

impl<D: Dim> Default for QueryPipeline<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> QueryPipeline<D> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    /// Number of colliders indexed by the last update.
    pub fn len(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, BvhNode::Leaf { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Rebuilds the tree from the bodies' current poses.
    pub fn update(&mut self, bodies: &RigidBodySet<D>, colliders: &ColliderSet<D>) {
        let mut leaves: Vec<LeafInput<D>> = colliders
            .iter()
            .map(|(handle, collider)| {
                let pose = bodies
                    .get(collider.parent())
                    .map_or(*collider.position(), |body| body.position().combine(collider.local_position()));
                LeafInput {
                    aabb: collider.shape().compute_aabb(&pose),
                    collider: handle,
                    pose,
                }
            })
            .collect();

        self.nodes.clear();
        self.nodes.reserve(leaves.len() * 2);
        self.root = if leaves.is_empty() {
            None
        } else {
            Some(self.build(&mut leaves))
        };
    }

    fn build(&mut self, leaves: &mut [LeafInput<D>]) -> usize {
        if let [leaf] = leaves {
            self.nodes.push(BvhNode::Leaf {
                aabb: leaf.aabb,
                collider: leaf.collider,
                pose: leaf.pose,
            });
            return self.nodes.len() - 1;
        }

        let mut centers = Aabb::<D>::empty();
        for leaf in leaves.iter() {
            centers.extend(leaf.aabb.center());
        }
        let extents = centers.max - centers.min;
        let axis = (0..D::DIM)
            .max_by(|a, b| extents.component(*a).total_cmp(&extents.component(*b)))
            .unwrap_or(0);
        leaves.sort_by(|a, b| {
            a.aabb
                .center()
                .component(axis)
                .total_cmp(&b.aabb.center().component(axis))
                .then(a.collider.cmp(&b.collider))
        });

        let mid = leaves.len() / 2;
        let (left_leaves, right_leaves) = leaves.split_at_mut(mid);
        let left = self.build(left_leaves);
        let right = self.build(right_leaves);
        let aabb = self.nodes[left].aabb().merged(self.nodes[right].aabb());
        self.nodes.push(BvhNode::Internal {
            aabb,
            children: [left, right],
        });
        self.nodes.len() - 1
    }

    /// Calls `leaf` for every leaf whose box passes `overlaps`.
    fn visit(
        &self,
        overlaps: impl Fn(&Aabb<D>) -> bool,
        mut leaf: impl FnMut(ColliderHandle, &Transform<D>),
    ) {
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !overlaps(node.aabb()) {
                continue;
            }
            match node {
                BvhNode::Leaf { collider, pose, .. } => leaf(*collider, pose),
                BvhNode::Internal { children, .. } => stack.extend(children.iter().rev()),
            }
        }
    }

    /// Nearest hit along `ray` within `max_toi`.
    pub fn cast_ray(
        &self,
        colliders: &ColliderSet<D>,
        ray: &Ray<D>,
        max_toi: Real,
        solid: bool,
        filter: &QueryFilter,
    ) -> Option<(ColliderHandle, RayIntersection<D>)> {
        let mut best: Option<(ColliderHandle, RayIntersection<D>)> = None;
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let limit = best.map_or(max_toi, |(_, hit)| hit.toi);
            if node.aabb().cast_ray(ray.origin, ray.dir, limit).is_none() {
                continue;
            }
            match node {
                BvhNode::Internal { children, .. } => stack.extend(children.iter().rev()),
                BvhNode::Leaf { collider: handle, pose, .. } => {
                    let Some(collider) = colliders.get(*handle).filter(|c| filter.test(*handle, *c)) else {
                        continue;
                    };
                    let Some(hit) = queries::cast_ray(collider.shape(), pose, ray, limit, solid) else {
                        continue;
                    };
                    let closer = best.map_or(true, |(best_handle, best_hit)| {
                        hit.toi < best_hit.toi || (hit.toi == best_hit.toi && *handle < best_handle)
                    });
                    if closer {
                        best = Some((*handle, hit));
                    }
                }
            }
        }
        best
    }

    /// Every hit along `ray`, nearest first.
    pub fn intersections_with_ray(
        &self,
        colliders: &ColliderSet<D>,
        ray: &Ray<D>,
        max_toi: Real,
        solid: bool,
        filter: &QueryFilter,
    ) -> Vec<(ColliderHandle, RayIntersection<D>)> {
        let mut hits = Vec::new();
        self.visit(
            |aabb| aabb.cast_ray(ray.origin, ray.dir, max_toi).is_some(),
            |handle, pose| {
                let Some(collider) = colliders.get(handle).filter(|c| filter.test(handle, *c)) else {
                    return;
                };
                if let Some(hit) = queries::cast_ray(collider.shape(), pose, ray, max_toi, solid) {
                    hits.push((handle, hit));
                }
            },
        );
        hits.sort_by(|a, b| a.1.toi.total_cmp(&b.1.toi).then(a.0.cmp(&b.0)));
        hits
    }

    /// Colliders containing `point`.
    pub fn intersections_with_point(
        &self,
        colliders: &ColliderSet<D>,
        point: D::Vector,
        filter: &QueryFilter,
    ) -> Vec<ColliderHandle> {
        let mut found = Vec::new();
        self.visit(
            |aabb| aabb.contains_point(point),
            |handle, pose| {
                let Some(collider) = colliders.get(handle).filter(|c| filter.test(handle, *c)) else {
                    return;
                };
                if queries::contains_point(collider.shape(), pose, point) {
                    found.push(handle);
                }
            },
        );
        found.sort();
        found
    }

    /// Colliders overlapping `shape` placed at `pose`.
    pub fn intersections_with_shape(
        &self,
        colliders: &ColliderSet<D>,
        pose: &Transform<D>,
        shape: &Shape<D>,
        filter: &QueryFilter,
    ) -> Vec<ColliderHandle> {
        let bounds = shape.compute_aabb(pose);
        let mut found = Vec::new();
        self.visit(
            |aabb| aabb.intersects(&bounds),
            |handle, collider_pose| {
                let Some(collider) = colliders.get(handle).filter(|c| filter.test(handle, *c)) else {
                    return;
                };
                if queries::intersection_test(shape, pose, collider.shape(), collider_pose) {
                    found.push(handle);
                }
            },
        );
        found.sort();
        found
    }

    /// Colliders whose bounding box overlaps `aabb`.
    pub fn colliders_in_aabb(&self, aabb: &Aabb<D>) -> Vec<ColliderHandle> {
        let mut found = Vec::new();
        self.visit(|node| node.intersects(aabb), |handle, _| found.push(handle));
        found.sort();
        found
    }

    /// Sweeps `shape` from `pose` along `velocity` for `max_toi` seconds and returns the
    /// first collider hit with its time of impact.
    pub fn cast_shape(
        &self,
        colliders: &ColliderSet<D>,
        pose: &Transform<D>,
        velocity: D::Vector,
        shape: &Shape<D>,
        max_toi: Real,
        filter: &QueryFilter,
    ) -> Option<(ColliderHandle, Real)> {
        let end = Transform::new(pose.translation + velocity * max_toi, pose.rotation);
        let motion = Motion::new(*pose, end, Transform::identity());
        let swept = shape.compute_aabb(pose).merged(&shape.compute_aabb(&end));

        let mut best: Option<(ColliderHandle, Real)> = None;
        self.visit(
            |aabb| aabb.intersects(&swept),
            |handle, collider_pose| {
                let Some(collider) = colliders.get(handle).filter(|c| filter.test(handle, *c)) else {
                    return;
                };
                let Some(fraction) = queries::time_of_impact(
                    shape,
                    &motion,
                    collider.shape(),
                    &Motion::stationary(*collider_pose),
                    0.0,
                    true,
                ) else {
                    return;
                };
                let toi = fraction * max_toi;
                if best.map_or(true, |(best_handle, best_toi)| {
                    toi < best_toi || (toi == best_toi && handle < best_handle)
                }) {
                    best = Some((handle, toi));
                }
            },
        );
        best
    }
}
