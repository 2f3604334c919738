use serde::{Deserialize, Serialize};

use crate::collision::shapes::Shape;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{Dim, Real};
use crate::utils::allocator::{Arena, ColliderHandle, RigidBodyHandle};

use super::mesh::{Aabb, HeightField, TriMesh};
use super::rigidbody::{RigidBody, RigidBodySet};
use super::types::{CombineRule, MassProperties, Material, Transform};

/// Layer/mask filter. Two colliders interact when each one's mask contains the other's layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionGroups {
    pub layer: u32,
    pub mask: u32,
}

impl Default for CollisionGroups {
    fn default() -> Self {
        Self {
            layer: 1,
            mask: u32::MAX,
        }
    }
}

impl CollisionGroups {
    pub fn new(layer: u32, mask: u32) -> Self {
        Self { layer, mask }
    }

    pub fn test(&self, other: &CollisionGroups) -> bool {
        (self.mask & other.layer) != 0 && (other.mask & self.layer) != 0
    }
}

/// Geometry attached to a rigid body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Collider<D: Dim> {
    pub(crate) shape: Shape<D>,
    pub(crate) local_position: Transform<D>,
    pub(crate) position: Transform<D>,
    pub(crate) parent: RigidBodyHandle,
    pub(crate) sensor: bool,
    pub material: Material,
    pub collision_groups: CollisionGroups,
    pub user_data: u128,
}

impl<D: Dim> Collider<D> {
    pub fn shape(&self) -> &Shape<D> {
        &self.shape
    }

    /// Pose relative to the parent body.
    pub fn local_position(&self) -> &Transform<D> {
        &self.local_position
    }

    /// World pose as of the last pipeline step or insertion.
    pub fn position(&self) -> &Transform<D> {
        &self.position
    }

    pub fn parent(&self) -> RigidBodyHandle {
        self.parent
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn density(&self) -> Real {
        self.material.density
    }

    pub fn friction(&self) -> Real {
        self.material.friction
    }

    pub fn restitution(&self) -> Real {
        self.material.restitution
    }

    pub fn compute_aabb(&self) -> Aabb<D> {
        self.shape.compute_aabb(&self.position)
    }

    /// Mass contribution expressed in the parent body frame. Sensors weigh nothing.
    pub fn mass_properties(&self) -> MassProperties<D> {
        if self.sensor {
            return MassProperties::zero();
        }
        self.shape
            .mass_properties(self.material.density)
            .transformed(&self.local_position)
    }

    pub(crate) fn update_position(&mut self, parent: &Transform<D>) {
        self.position = parent.combine(&self.local_position);
    }
}

/// Descriptor used to create a [`Collider`].
#[derive(Debug, Clone)]
pub struct ColliderBuilder<D: Dim> {
    shape: PhysicsResult<Shape<D>>,
    local_position: Transform<D>,
    material: Material,
    sensor: bool,
    collision_groups: CollisionGroups,
    user_data: u128,
}

impl<D: Dim> ColliderBuilder<D> {
    pub fn new(shape: Shape<D>) -> Self {
        Self::from_result(Ok(shape))
    }

    fn from_result(shape: PhysicsResult<Shape<D>>) -> Self {
        Self {
            shape,
            local_position: Transform::identity(),
            material: Material::default(),
            sensor: false,
            collision_groups: CollisionGroups::default(),
            user_data: 0,
        }
    }

    pub fn ball(radius: Real) -> Self {
        Self::new(Shape::ball(radius))
    }

    pub fn cuboid(half_extents: D::Vector) -> Self {
        Self::new(Shape::cuboid(half_extents))
    }

    pub fn capsule(half_height: Real, radius: Real) -> Self {
        Self::new(Shape::capsule(half_height, radius))
    }

    pub fn convex_hull(points: Vec<D::Vector>) -> Self {
        Self::new(Shape::convex_hull(points))
    }

    pub fn cylinder(half_height: Real, radius: Real) -> Self {
        Self::new(Shape::cylinder(half_height, radius))
    }

    pub fn cone(half_height: Real, radius: Real) -> Self {
        Self::new(Shape::cone(half_height, radius))
    }

    /// Polyline in 2D, triangle mesh in 3D. Invalid indices surface from [`build`](Self::build).
    pub fn trimesh(vertices: Vec<D::Vector>, elements: Vec<D::Element>) -> Self {
        Self::from_result(TriMesh::new(vertices, elements).map(Shape::TriMesh))
    }

    pub fn heightfield(heights: Vec<Real>, nrows: usize, ncols: usize, scale: D::Vector) -> Self {
        Self::from_result(HeightField::new(heights, nrows, ncols, scale).map(Shape::HeightField))
    }

    pub fn position(mut self, position: Transform<D>) -> Self {
        self.local_position = position;
        self
    }

    pub fn translation(mut self, translation: D::Vector) -> Self {
        self.local_position.translation = translation;
        self
    }

    pub fn rotation(mut self, rotation: D::Rotation) -> Self {
        self.local_position.rotation = rotation;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn density(mut self, density: Real) -> Self {
        self.material.density = density;
        self
    }

    pub fn friction(mut self, friction: Real) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn restitution(mut self, restitution: Real) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn friction_combine_rule(mut self, rule: CombineRule) -> Self {
        self.material.friction_combine_rule = rule;
        self
    }

    pub fn restitution_combine_rule(mut self, rule: CombineRule) -> Self {
        self.material.restitution_combine_rule = rule;
        self
    }

    pub fn sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn collision_groups(mut self, groups: CollisionGroups) -> Self {
        self.collision_groups = groups;
        self
    }

    pub fn user_data(mut self, data: u128) -> Self {
        self.user_data = data;
        self
    }

    pub fn build(self) -> PhysicsResult<Collider<D>> {
        self.build_checked()
            .inspect_err(|err| log::warn!("rejected collider descriptor: {err}"))
    }

    fn build_checked(self) -> PhysicsResult<Collider<D>> {
        let shape = self.shape?;
        shape.validate()?;
        if !self.local_position.is_finite() {
            return Err(PhysicsError::DegenerateInput(format!(
                "collider pose is not finite: {:?}",
                self.local_position
            )));
        }
        for (value, what) in [
            (self.material.density, "density"),
            (self.material.friction, "friction"),
            (self.material.restitution, "restitution"),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PhysicsError::DegenerateInput(format!(
                    "{what} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(Collider {
            shape,
            local_position: self.local_position,
            position: self.local_position,
            parent: RigidBodyHandle::invalid(),
            sensor: self.sensor,
            material: self.material,
            collision_groups: self.collision_groups,
            user_data: self.user_data,
        })
    }
}

/// Generational storage of colliders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ColliderSet<D: Dim> {
    colliders: Arena<Collider<D>>,
}

impl<D: Dim> Default for ColliderSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> ColliderSet<D> {
    pub fn new() -> Self {
        Self {
            colliders: Arena::new(),
        }
    }

    /// Attaches `collider` to `parent`, refreshing the parent's mass unless it was overridden.
    pub fn insert(
        &mut self,
        collider: Collider<D>,
        parent: RigidBodyHandle,
        bodies: &mut RigidBodySet<D>,
    ) -> PhysicsResult<ColliderHandle> {
        let body = bodies.get_mut(parent).ok_or(PhysicsError::InvalidHandle)?;
        let mut collider = collider;
        collider.parent = parent;
        collider.update_position(&body.position);
        let handle = ColliderHandle(self.colliders.insert(collider));
        body.colliders.push(handle);
        self.refresh_body_mass(body);
        body.wake_up();
        Ok(handle)
    }

    /// Detaches and removes a collider, refreshing its parent's mass.
    pub fn remove(
        &mut self,
        handle: ColliderHandle,
        bodies: &mut RigidBodySet<D>,
        wake_up: bool,
    ) -> Option<Collider<D>> {
        let collider = self.colliders.remove(handle.0)?;
        if let Some(body) = bodies.get_mut(collider.parent) {
            body.colliders.retain(|c| *c != handle);
            self.refresh_body_mass(body);
            if wake_up {
                body.wake_up();
            }
        }
        Some(collider)
    }

    /// Removal used when the parent body is already gone.
    pub(crate) fn remove_detached(&mut self, handle: ColliderHandle) -> Option<Collider<D>> {
        self.colliders.remove(handle.0)
    }

    pub fn get(&self, handle: ColliderHandle) -> Option<&Collider<D>> {
        self.colliders.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: ColliderHandle) -> Option<&mut Collider<D>> {
        self.colliders.get_mut(handle.0)
    }

    pub fn contains(&self, handle: ColliderHandle) -> bool {
        self.colliders.contains(handle.0)
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColliderHandle, &Collider<D>)> + '_ {
        self.colliders
            .iter()
            .map(|(id, collider)| (ColliderHandle(id), collider))
    }

    /// Refreshes world poses of the colliders attached to `body`.
    pub(crate) fn update_positions(&mut self, body: &RigidBody<D>) {
        for handle in &body.colliders {
            if let Some(collider) = self.colliders.get_mut(handle.0) {
                collider.update_position(&body.position);
            }
        }
    }

    /// Refreshes every collider's world pose from its parent.
    pub(crate) fn update_all_positions(&mut self, bodies: &RigidBodySet<D>) {
        for (_, body) in bodies.iter() {
            self.update_positions(body);
        }
    }

    pub(crate) fn refresh_body_mass(&self, body: &mut RigidBody<D>) {
        let parts: Vec<MassProperties<D>> = body
            .colliders
            .iter()
            .filter_map(|handle| self.get(*handle))
            .map(Collider::mass_properties)
            .collect();
        body.recompute_mass_properties(parts.into_iter());
    }
}
