use serde::{Deserialize, Serialize};

use crate::config::{
    DEFAULT_ANGULAR_DAMPING, DEFAULT_ANGULAR_SLEEP_THRESHOLD, DEFAULT_LINEAR_DAMPING,
    DEFAULT_LINEAR_SLEEP_THRESHOLD,
};
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{Dim, Real, Vector};
use crate::utils::allocator::{Arena, ColliderHandle, RigidBodyHandle};

use super::collider::ColliderSet;
use super::joint::JointSet;
use super::types::{MassProperties, Transform, Velocity};

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyStatus {
    /// Never moves.
    Static,
    /// Moved by forces, contacts and joints.
    #[default]
    Dynamic,
    /// Moved by the user through velocities or target poses; pushes dynamic bodies.
    Kinematic,
}

/// Sleep bookkeeping of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    pub sleeping: bool,
    pub can_sleep: bool,
    pub linear_threshold: Real,
    pub angular_threshold: Real,
    /// Time the body has continuously stayed under both thresholds.
    pub time_since_can_sleep: Real,
}

impl Default for Activation {
    fn default() -> Self {
        Self {
            sleeping: false,
            can_sleep: true,
            linear_threshold: DEFAULT_LINEAR_SLEEP_THRESHOLD,
            angular_threshold: DEFAULT_ANGULAR_SLEEP_THRESHOLD,
            time_since_can_sleep: 0.0,
        }
    }
}

impl Activation {
    pub fn wake_up(&mut self) {
        self.sleeping = false;
        self.time_since_can_sleep = 0.0;
    }
}

/// A rigid body. Its velocity is the velocity of its center of mass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RigidBody<D: Dim> {
    pub(crate) position: Transform<D>,
    pub(crate) previous_position: Transform<D>,
    pub(crate) next_kinematic_position: Option<Transform<D>>,
    /// Set while a kinematic body's velocity comes from its pose targets rather than
    /// from `set_linvel`/`set_angvel`.
    #[serde(default)]
    pub(crate) position_driven: bool,
    pub(crate) velocity: Velocity<D>,
    pub(crate) mass_properties: MassProperties<D>,
    pub(crate) mass_override: Option<MassProperties<D>>,
    pub(crate) inv_mass: Real,
    pub(crate) world_inv_inertia: D::AngularInertia,
    pub(crate) status: BodyStatus,
    pub(crate) colliders: Vec<ColliderHandle>,
    pub(crate) force: D::Vector,
    pub(crate) torque: D::Angular,
    pub(crate) ccd_enabled: bool,
    pub activation: Activation,
    pub linear_damping: Real,
    pub angular_damping: Real,
    pub gravity_scale: Real,
    pub user_data: u128,
}

impl<D: Dim> RigidBody<D> {
    pub fn position(&self) -> &Transform<D> {
        &self.position
    }

    pub fn translation(&self) -> D::Vector {
        self.position.translation
    }

    pub fn rotation(&self) -> &D::Rotation {
        &self.position.rotation
    }

    /// Pose at the start of the last step.
    pub fn previous_position(&self) -> &Transform<D> {
        &self.previous_position
    }

    /// Teleports the body. The previous pose is reset too so CCD does not sweep the jump.
    pub fn set_position(&mut self, position: Transform<D>, wake_up: bool) {
        self.position = position;
        self.previous_position = position;
        self.update_world_inertia();
        if wake_up {
            self.wake_up();
        }
    }

    pub fn set_translation(&mut self, translation: D::Vector, wake_up: bool) {
        let mut position = self.position;
        position.translation = translation;
        self.set_position(position, wake_up);
    }

    /// Target pose a kinematic body reaches at the end of the next step. The body stops
    /// there unless a new target is set before the following step.
    pub fn set_next_kinematic_position(&mut self, position: Transform<D>) {
        if self.is_kinematic() {
            self.next_kinematic_position = Some(position);
        }
    }

    pub fn next_kinematic_position(&self) -> Option<&Transform<D>> {
        self.next_kinematic_position.as_ref()
    }

    pub fn velocity(&self) -> &Velocity<D> {
        &self.velocity
    }

    pub fn linvel(&self) -> D::Vector {
        self.velocity.linear
    }

    pub fn angvel(&self) -> D::Angular {
        self.velocity.angular
    }

    pub fn set_linvel(&mut self, linvel: D::Vector, wake_up: bool) {
        if self.is_static() {
            return;
        }
        self.velocity.linear = linvel;
        self.position_driven = false;
        if wake_up {
            self.wake_up();
        }
    }

    pub fn set_angvel(&mut self, angvel: D::Angular, wake_up: bool) {
        if self.is_static() {
            return;
        }
        self.velocity.angular = angvel;
        self.position_driven = false;
        if wake_up {
            self.wake_up();
        }
    }

    /// Velocity of the material point currently at `point` (world space).
    pub fn velocity_at_point(&self, point: D::Vector) -> D::Vector {
        self.velocity.at_point(point - self.center_of_mass())
    }

    pub fn status(&self) -> BodyStatus {
        self.status
    }

    pub fn set_status(&mut self, status: BodyStatus) {
        if status == self.status {
            return;
        }
        self.status = status;
        if status == BodyStatus::Static {
            self.velocity = Velocity::default();
        }
        if status != BodyStatus::Kinematic {
            self.next_kinematic_position = None;
            self.position_driven = false;
        }
        self.refresh_inverse_mass();
        self.wake_up();
    }

    pub fn is_static(&self) -> bool {
        self.status == BodyStatus::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.status == BodyStatus::Dynamic
    }

    pub fn is_kinematic(&self) -> bool {
        self.status == BodyStatus::Kinematic
    }

    pub fn is_sleeping(&self) -> bool {
        self.activation.sleeping
    }

    /// Whether the body moved or may move this step.
    pub fn is_moving(&self) -> bool {
        !self.is_static()
            && !self.is_sleeping()
            && (self.velocity.linear != D::Vector::ZERO
                || self.velocity.angular != D::Angular::ZERO
                || self.next_kinematic_position.is_some())
    }

    pub fn wake_up(&mut self) {
        if !self.is_static() {
            self.activation.wake_up();
        }
    }

    /// Puts the body to sleep immediately, zeroing its velocity.
    pub fn sleep(&mut self) {
        if self.is_static() {
            return;
        }
        self.activation.sleeping = true;
        self.velocity = Velocity::default();
        self.reset_forces();
    }

    pub fn colliders(&self) -> &[ColliderHandle] {
        &self.colliders
    }

    pub fn is_ccd_enabled(&self) -> bool {
        self.ccd_enabled
    }

    pub fn enable_ccd(&mut self, enabled: bool) {
        self.ccd_enabled = enabled;
    }

    pub fn mass(&self) -> Real {
        self.mass_properties.mass
    }

    /// Zero for static, kinematic and massless bodies.
    pub fn inv_mass(&self) -> Real {
        self.inv_mass
    }

    /// Inverse inertia expressed in world space.
    pub fn world_inv_inertia(&self) -> D::AngularInertia {
        self.world_inv_inertia
    }

    /// Mass properties in the body frame.
    pub fn mass_properties(&self) -> &MassProperties<D> {
        &self.mass_properties
    }

    /// Overrides the mass properties derived from the attached colliders.
    pub fn set_mass_properties(&mut self, properties: MassProperties<D>, wake_up: bool) {
        self.mass_override = Some(properties);
        self.mass_properties = properties;
        self.refresh_inverse_mass();
        if wake_up {
            self.wake_up();
        }
    }

    pub fn center_of_mass(&self) -> D::Vector {
        self.position.transform_point(self.mass_properties.local_com)
    }

    pub fn apply_force(&mut self, force: D::Vector, wake_up: bool) {
        if !self.is_dynamic() {
            return;
        }
        self.force += force;
        if wake_up {
            self.wake_up();
        }
    }

    pub fn apply_torque(&mut self, torque: D::Angular, wake_up: bool) {
        if !self.is_dynamic() {
            return;
        }
        self.torque += torque;
        if wake_up {
            self.wake_up();
        }
    }

    pub fn apply_force_at_point(&mut self, force: D::Vector, point: D::Vector, wake_up: bool) {
        if !self.is_dynamic() {
            return;
        }
        self.force += force;
        self.torque += D::cross(point - self.center_of_mass(), force);
        if wake_up {
            self.wake_up();
        }
    }

    pub fn apply_impulse(&mut self, impulse: D::Vector, wake_up: bool) {
        if !self.is_dynamic() {
            return;
        }
        self.velocity.linear += impulse * self.inv_mass;
        if wake_up {
            self.wake_up();
        }
    }

    pub fn apply_torque_impulse(&mut self, impulse: D::Angular, wake_up: bool) {
        if !self.is_dynamic() {
            return;
        }
        self.velocity.angular += D::inertia_mul(self.world_inv_inertia, impulse);
        if wake_up {
            self.wake_up();
        }
    }

    pub fn apply_impulse_at_point(&mut self, impulse: D::Vector, point: D::Vector, wake_up: bool) {
        let torque = D::cross(point - self.center_of_mass(), impulse);
        self.apply_impulse(impulse, wake_up);
        self.apply_torque_impulse(torque, wake_up);
    }

    pub fn reset_forces(&mut self) {
        self.force = D::Vector::ZERO;
        self.torque = D::Angular::ZERO;
    }

    /// Accumulated force for the coming step.
    pub fn force(&self) -> D::Vector {
        self.force
    }

    pub fn torque(&self) -> D::Angular {
        self.torque
    }

    /// Pose reached after moving the center of mass by `velocity` for `dt`, rotating about it.
    pub fn integrated_position(&self, velocity: &Velocity<D>, dt: Real) -> Transform<D> {
        let com = self.center_of_mass() + velocity.linear * dt;
        let rotation = D::integrate_rotation(&self.position.rotation, velocity.angular, dt);
        Transform::new(com - D::rotate(&rotation, self.mass_properties.local_com), rotation)
    }

    /// Recomputes mass properties from collider contributions already expressed in the body frame.
    pub(crate) fn recompute_mass_properties(&mut self, parts: impl Iterator<Item = MassProperties<D>>) {
        if let Some(properties) = self.mass_override {
            self.mass_properties = properties;
        } else {
            self.mass_properties = parts.fold(MassProperties::zero(), |acc, part| acc.combined(&part));
        }
        self.refresh_inverse_mass();
    }

    fn refresh_inverse_mass(&mut self) {
        self.inv_mass = if self.is_dynamic() {
            self.mass_properties.inv_mass()
        } else {
            0.0
        };
        self.update_world_inertia();
    }

    pub(crate) fn update_world_inertia(&mut self) {
        self.world_inv_inertia = if self.is_dynamic() && self.mass_properties.mass > Real::EPSILON {
            let local = D::inertia_inverse(self.mass_properties.inertia);
            D::inertia_rotate(local, &self.position.rotation)
        } else {
            D::inertia_zero()
        };
    }
}

/// Descriptor used to create a [`RigidBody`].
#[derive(Debug, Clone)]
pub struct RigidBodyBuilder<D: Dim> {
    status: BodyStatus,
    position: Transform<D>,
    velocity: Velocity<D>,
    linear_damping: Real,
    angular_damping: Real,
    gravity_scale: Real,
    can_sleep: bool,
    sleeping: bool,
    ccd_enabled: bool,
    mass_properties: Option<MassProperties<D>>,
    user_data: u128,
}

impl<D: Dim> RigidBodyBuilder<D> {
    pub fn new(status: BodyStatus) -> Self {
        Self {
            status,
            position: Transform::identity(),
            velocity: Velocity::default(),
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            gravity_scale: 1.0,
            can_sleep: true,
            sleeping: false,
            ccd_enabled: false,
            mass_properties: None,
            user_data: 0,
        }
    }

    pub fn dynamic() -> Self {
        Self::new(BodyStatus::Dynamic)
    }

    pub fn fixed() -> Self {
        Self::new(BodyStatus::Static)
    }

    pub fn kinematic() -> Self {
        Self::new(BodyStatus::Kinematic)
    }

    pub fn position(mut self, position: Transform<D>) -> Self {
        self.position = position;
        self
    }

    pub fn translation(mut self, translation: D::Vector) -> Self {
        self.position.translation = translation;
        self
    }

    pub fn rotation(mut self, rotation: D::Rotation) -> Self {
        self.position.rotation = rotation;
        self
    }

    pub fn linvel(mut self, linvel: D::Vector) -> Self {
        self.velocity.linear = linvel;
        self
    }

    pub fn angvel(mut self, angvel: D::Angular) -> Self {
        self.velocity.angular = angvel;
        self
    }

    pub fn linear_damping(mut self, damping: Real) -> Self {
        self.linear_damping = damping;
        self
    }

    pub fn angular_damping(mut self, damping: Real) -> Self {
        self.angular_damping = damping;
        self
    }

    pub fn gravity_scale(mut self, scale: Real) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    pub fn sleeping(mut self, sleeping: bool) -> Self {
        self.sleeping = sleeping;
        self
    }

    pub fn ccd_enabled(mut self, enabled: bool) -> Self {
        self.ccd_enabled = enabled;
        self
    }

    /// Fixes the mass properties instead of deriving them from collider densities.
    pub fn mass_properties(mut self, properties: MassProperties<D>) -> Self {
        self.mass_properties = Some(properties);
        self
    }

    pub fn user_data(mut self, data: u128) -> Self {
        self.user_data = data;
        self
    }

    pub fn build(self) -> PhysicsResult<RigidBody<D>> {
        self.build_checked()
            .inspect_err(|err| log::warn!("rejected rigid body descriptor: {err}"))
    }

    fn build_checked(self) -> PhysicsResult<RigidBody<D>> {
        if !self.position.is_finite() {
            return Err(PhysicsError::DegenerateInput(format!(
                "rigid body pose is not finite: {:?}",
                self.position
            )));
        }
        if !self.velocity.is_finite() {
            return Err(PhysicsError::DegenerateInput(format!(
                "rigid body velocity is not finite: {:?}",
                self.velocity
            )));
        }
        for (value, what) in [
            (self.linear_damping, "linear damping"),
            (self.angular_damping, "angular damping"),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PhysicsError::DegenerateInput(format!(
                    "{what} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !self.gravity_scale.is_finite() {
            return Err(PhysicsError::DegenerateInput(
                "gravity scale is not finite".to_string(),
            ));
        }
        if let Some(properties) = &self.mass_properties {
            if !properties.mass.is_finite() || properties.mass < 0.0 || !properties.local_com.is_finite() {
                return Err(PhysicsError::DegenerateInput(format!(
                    "invalid mass properties: {properties:?}"
                )));
            }
        }

        let velocity = if self.status == BodyStatus::Static {
            Velocity::default()
        } else {
            self.velocity
        };
        let mut body = RigidBody {
            position: self.position,
            previous_position: self.position,
            next_kinematic_position: None,
            position_driven: false,
            velocity,
            mass_properties: self.mass_properties.unwrap_or_default(),
            mass_override: self.mass_properties,
            inv_mass: 0.0,
            world_inv_inertia: D::inertia_zero(),
            status: self.status,
            colliders: Vec::new(),
            force: D::Vector::ZERO,
            torque: D::Angular::ZERO,
            ccd_enabled: self.ccd_enabled,
            activation: Activation {
                sleeping: self.sleeping && self.status != BodyStatus::Static,
                can_sleep: self.can_sleep,
                ..Activation::default()
            },
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            gravity_scale: self.gravity_scale,
            user_data: self.user_data,
        };
        body.refresh_inverse_mass();
        Ok(body)
    }
}

/// Bodies removed together with everything that referenced them.
#[derive(Debug, Clone)]
pub struct RemovedBody<D: Dim> {
    pub body: RigidBody<D>,
    pub colliders: Vec<ColliderHandle>,
}

/// Generational storage of rigid bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RigidBodySet<D: Dim> {
    bodies: Arena<RigidBody<D>>,
}

impl<D: Dim> Default for RigidBodySet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> RigidBodySet<D> {
    pub fn new() -> Self {
        Self {
            bodies: Arena::new(),
        }
    }

    pub fn insert(&mut self, body: RigidBody<D>) -> RigidBodyHandle {
        let mut body = body;
        body.colliders.clear();
        RigidBodyHandle(self.bodies.insert(body))
    }

    pub fn get(&self, handle: RigidBodyHandle) -> Option<&RigidBody<D>> {
        self.bodies.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody<D>> {
        self.bodies.get_mut(handle.0)
    }

    pub(crate) fn get2_mut(
        &mut self,
        a: RigidBodyHandle,
        b: RigidBodyHandle,
    ) -> Option<(&mut RigidBody<D>, &mut RigidBody<D>)> {
        self.bodies.get2_mut(a.0, b.0)
    }

    pub fn contains(&self, handle: RigidBodyHandle) -> bool {
        self.bodies.contains(handle.0)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Bodies in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (RigidBodyHandle, &RigidBody<D>)> + '_ {
        self.bodies
            .iter()
            .map(|(id, body)| (RigidBodyHandle(id), body))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RigidBodyHandle, &mut RigidBody<D>)> + '_ {
        self.bodies
            .iter_mut()
            .map(|(id, body)| (RigidBodyHandle(id), body))
    }

    pub fn handles(&self) -> Vec<RigidBodyHandle> {
        self.bodies.ids().map(RigidBodyHandle).collect()
    }

    /// Removes a body along with its colliders and every joint attached to it.
    ///
    /// The broad and narrow phases still reference the returned colliders;
    /// `PhysicsPipeline::remove_rigid_body` purges them as well.
    pub fn remove(
        &mut self,
        handle: RigidBodyHandle,
        colliders: &mut ColliderSet<D>,
        joints: &mut JointSet<D>,
    ) -> Option<RemovedBody<D>> {
        let body = self.bodies.remove(handle.0)?;
        for collider in &body.colliders {
            colliders.remove_detached(*collider);
        }
        for joint in joints.attached_to(handle) {
            if let Some(removed) = joints.remove_detached(joint) {
                let other = if removed.body1 == handle {
                    removed.body2
                } else {
                    removed.body1
                };
                if let Some(other) = self.get_mut(other) {
                    other.wake_up();
                }
            }
        }
        log::debug!(
            "removed rigid body {:?} with {} colliders",
            handle,
            body.colliders.len()
        );
        let colliders = body.colliders.clone();
        Some(RemovedBody { body, colliders })
    }

    /// Wakes every body.
    pub fn wake_all(&mut self) {
        for (_, body) in self.iter_mut() {
            body.wake_up();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Dim2, Dim3};
    use glam::{Vec2, Vec3};

    #[test]
    fn builder_rejects_nan_pose() {
        let result = RigidBodyBuilder::<Dim3>::dynamic()
            .translation(Vec3::new(Real::NAN, 0.0, 0.0))
            .build();
        assert!(matches!(result, Err(PhysicsError::DegenerateInput(_))));
    }

    #[test]
    fn status_predicates_match_status() {
        let kinematic = RigidBodyBuilder::<Dim2>::kinematic().build().unwrap();
        assert!(kinematic.is_kinematic());
        assert!(!kinematic.is_dynamic());
        let dynamic = RigidBodyBuilder::<Dim2>::dynamic().build().unwrap();
        assert!(dynamic.is_dynamic());
        assert!(!dynamic.is_kinematic());
    }

    #[test]
    fn static_bodies_ignore_velocity_and_impulses() {
        let mut body = RigidBodyBuilder::<Dim2>::fixed()
            .linvel(Vec2::new(1.0, 0.0))
            .build()
            .unwrap();
        assert_eq!(body.linvel(), Vec2::ZERO);
        body.apply_impulse(Vec2::new(5.0, 0.0), true);
        body.set_linvel(Vec2::X, true);
        assert_eq!(body.linvel(), Vec2::ZERO);
    }

    #[test]
    fn impulse_wakes_sleeping_body() {
        let mut body = RigidBodyBuilder::<Dim3>::dynamic()
            .mass_properties(MassProperties::new(Vec3::ZERO, 2.0, glam::Mat3::IDENTITY))
            .sleeping(true)
            .build()
            .unwrap();
        assert!(body.is_sleeping());
        body.apply_impulse(Vec3::new(4.0, 0.0, 0.0), true);
        assert!(!body.is_sleeping());
        assert_eq!(body.linvel(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn integration_rotates_about_center_of_mass() {
        let body = RigidBodyBuilder::<Dim2>::dynamic()
            .mass_properties(MassProperties::new(Vec2::new(1.0, 0.0), 1.0, 1.0))
            .build()
            .unwrap();
        let velocity = Velocity::new(Vec2::ZERO, std::f32::consts::PI);
        let next = body.integrated_position(&velocity, 1.0);
        // The center of mass stays put while the frame origin swings around it.
        assert!((next.transform_point(Vec2::new(1.0, 0.0)) - Vec2::new(1.0, 0.0)).length() < 1e-5);
        assert!((next.translation - Vec2::new(2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn stale_handle_is_detected() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let mut colliders = ColliderSet::new();
        let mut joints = JointSet::new();
        let first = bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        bodies.remove(first, &mut colliders, &mut joints).unwrap();
        let second = bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        assert_eq!(first.index(), second.index());
        assert!(bodies.get(first).is_none());
        assert!(bodies.get(second).is_some());
    }
}
