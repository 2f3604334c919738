use crate::collision::broadphase::BroadPhase;
use crate::collision::narrowphase::NarrowPhase;
use crate::collision::queries::{Ray, RayIntersection};
use crate::config::{IntegrationParameters, DEFAULT_GRAVITY, MAX_SUBSTEPS_PER_ADVANCE};
use crate::core::collider::{Collider, ColliderSet};
use crate::core::joint::{Joint, JointSet};
use crate::core::rigidbody::{RemovedBody, RigidBody, RigidBodySet};
use crate::dynamics::forces::ForceRegistry;
use crate::error::{PhysicsResult, SnapshotError};
use crate::math::{Dim, Dim2, Dim3, Real};
use crate::pipeline::events::EventQueue;
use crate::pipeline::physics::PhysicsPipeline;
use crate::pipeline::query::{QueryFilter, QueryPipeline};
use crate::pipeline::serialization::SerializationPipeline;
use crate::utils::allocator::{ColliderHandle, JointHandle, RigidBodyHandle};
use crate::utils::profiling::PhysicsProfiler;

/// Central simulation container owning every set, both collision phases, the query
/// tree and the step pipeline.
#[derive(Debug)]
pub struct PhysicsWorld<D: Dim> {
    pub gravity: D::Vector,
    pub params: IntegrationParameters,
    pub bodies: RigidBodySet<D>,
    pub colliders: ColliderSet<D>,
    pub joints: JointSet<D>,
    pub broad_phase: BroadPhase<D>,
    pub narrow_phase: NarrowPhase<D>,
    pub query_pipeline: QueryPipeline<D>,
    /// Events of every step so far, until drained.
    pub events: EventQueue,
    pipeline: PhysicsPipeline<D>,
    time_accumulated: Real,
}

pub type PhysicsWorld2D = PhysicsWorld<Dim2>;
pub type PhysicsWorld3D = PhysicsWorld<Dim3>;

impl<D: Dim> Default for PhysicsWorld<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> PhysicsWorld<D> {
    /// Empty world with gravity along -Y.
    pub fn new() -> Self {
        Self::with_params(D::basis(1) * -DEFAULT_GRAVITY.abs(), IntegrationParameters::default())
    }

    pub fn with_params(gravity: D::Vector, params: IntegrationParameters) -> Self {
        Self {
            gravity,
            params,
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: JointSet::new(),
            broad_phase: BroadPhase::default(),
            narrow_phase: NarrowPhase::new(),
            query_pipeline: QueryPipeline::new(),
            events: EventQueue::new(),
            pipeline: PhysicsPipeline::new(),
            time_accumulated: 0.0,
        }
    }

    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.pipeline.set_parallel_enabled(enabled);
    }

    pub fn parallel_enabled(&self) -> bool {
        self.pipeline.parallel_enabled()
    }

    pub fn profiler(&self) -> &PhysicsProfiler {
        &self.pipeline.profiler
    }

    pub fn forces_mut(&mut self) -> &mut ForceRegistry<D> {
        &mut self.pipeline.forces
    }

    pub fn insert_body(&mut self, body: RigidBody<D>) -> RigidBodyHandle {
        self.bodies.insert(body)
    }

    pub fn insert_collider(&mut self, collider: Collider<D>, parent: RigidBodyHandle) -> PhysicsResult<ColliderHandle> {
        self.colliders.insert(collider, parent, &mut self.bodies)
    }

    pub fn insert_joint(&mut self, joint: Joint<D>) -> PhysicsResult<JointHandle> {
        self.joints.insert(joint, &mut self.bodies)
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> Option<RemovedBody<D>> {
        self.pipeline.remove_rigid_body(
            handle,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
        )
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Option<Collider<D>> {
        self.pipeline.remove_collider(
            handle,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            true,
        )
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> Option<Joint<D>> {
        self.pipeline
            .remove_joint(handle, &mut self.bodies, &mut self.joints, true)
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody<D>> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody<D>> {
        self.bodies.get_mut(handle)
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider<D>> {
        self.colliders.get(handle)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint<D>> {
        self.joints.get(handle)
    }

    /// Runs exactly one step of `params.dt` and refreshes the query tree.
    pub fn step(&mut self) {
        self.pipeline.step(
            self.gravity,
            &self.params,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            Some(&mut self.events),
        );
        self.update_query_pipeline();
    }

    /// Advances the simulation using a fixed timestep accumulator and returns the
    /// number of steps taken. Time beyond the substep cap is dropped.
    pub fn advance(&mut self, dt: Real) -> usize {
        if !(dt.is_finite() && dt > 0.0) || self.params.dt <= 0.0 {
            return 0;
        }
        self.time_accumulated += dt;

        let mut steps = 0;
        while self.time_accumulated >= self.params.dt && steps < MAX_SUBSTEPS_PER_ADVANCE {
            self.time_accumulated -= self.params.dt;
            self.step();
            steps += 1;
        }
        if self.time_accumulated >= self.params.dt {
            log::debug!(
                "advance capped at {} steps; dropping {:.3} s",
                MAX_SUBSTEPS_PER_ADVANCE,
                self.time_accumulated
            );
            self.time_accumulated %= self.params.dt;
        }
        steps
    }

    /// Fraction of a step left in the accumulator, for render interpolation.
    pub fn interpolation_alpha(&self) -> Real {
        if self.params.dt > 0.0 {
            self.time_accumulated / self.params.dt
        } else {
            0.0
        }
    }

    /// Rebuilds the query tree from the current poses. [`step`](Self::step) does this
    /// automatically; call it after moving bodies by hand.
    pub fn update_query_pipeline(&mut self) {
        self.query_pipeline.update(&self.bodies, &self.colliders);
    }

    pub fn cast_ray(
        &self,
        ray: &Ray<D>,
        max_toi: Real,
        solid: bool,
        filter: &QueryFilter,
    ) -> Option<(ColliderHandle, RayIntersection<D>)> {
        self.query_pipeline
            .cast_ray(&self.colliders, ray, max_toi, solid, filter)
    }

    /// Encodes the whole world, keeping every handle valid across a restore.
    ///
    /// Force generators are not part of the snapshot: `restore` keeps the ones already
    /// registered on this world and `from_snapshot` starts with none.
    pub fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        SerializationPipeline::new().serialize_all(
            self.gravity,
            &self.params,
            &self.broad_phase,
            &self.narrow_phase,
            &self.bodies,
            &self.colliders,
            &self.joints,
            &self.query_pipeline,
        )
    }

    /// Replaces the world state with a snapshot. On error the world is left untouched.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        let snapshot = SerializationPipeline::new().deserialize_all::<D>(bytes)?;
        self.gravity = snapshot.gravity;
        self.params = snapshot.params;
        self.broad_phase = snapshot.broad_phase;
        self.narrow_phase = snapshot.narrow_phase;
        self.bodies = snapshot.bodies;
        self.colliders = snapshot.colliders;
        self.joints = snapshot.joints;
        self.query_pipeline = snapshot.query_pipeline;
        self.events.clear();
        self.time_accumulated = 0.0;
        Ok(())
    }

    /// Builds a fresh world from a snapshot. Register force generators again afterwards.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let mut world = Self::new();
        world.restore(bytes)?;
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::ColliderBuilder;
    use crate::core::rigidbody::RigidBodyBuilder;
    use crate::dynamics::forces::DragForce;
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn worlds_are_send_and_sync() {
        assert_send_sync::<PhysicsWorld2D>();
        assert_send_sync::<PhysicsWorld3D>();
    }

    #[test]
    fn default_gravity_points_down() {
        let world = PhysicsWorld2D::new();
        assert_relative_eq!(world.gravity.y, -9.81);
    }

    #[test]
    fn advance_caps_substeps() {
        let mut world = PhysicsWorld2D::new();
        let dt = world.params.dt;
        assert_eq!(world.advance(dt * 0.5), 0);
        assert_eq!(world.advance(dt * 0.6), 1);
        assert_eq!(world.advance(dt * 100.0), MAX_SUBSTEPS_PER_ADVANCE);
        assert!(world.interpolation_alpha() < 1.0);
        assert_eq!(world.advance(-1.0), 0);
    }

    #[test]
    fn failed_restore_keeps_world() {
        let mut world = PhysicsWorld2D::new();
        let body = world.insert_body(RigidBodyBuilder::dynamic().build().unwrap());
        world
            .insert_collider(ColliderBuilder::ball(0.5).build().unwrap(), body)
            .unwrap();
        assert!(world.restore(b"RBSN").is_err());
        assert!(world.body(body).is_some());
        assert_eq!(world.colliders.len(), 1);
    }

    #[test]
    fn force_generators_stay_out_of_snapshots() {
        let mut world = PhysicsWorld2D::new();
        world.forces_mut().add_force(DragForce::new(0.5));
        let bytes = world.snapshot().unwrap();

        world.restore(&bytes).unwrap();
        assert_eq!(world.forces_mut().len(), 1);

        let mut fresh = PhysicsWorld2D::from_snapshot(&bytes).unwrap();
        assert!(fresh.forces_mut().is_empty());
    }

    #[test]
    fn ray_sees_body_after_step() {
        let mut world = PhysicsWorld2D::with_params(Vec2::ZERO, IntegrationParameters::default());
        let body = world.insert_body(
            RigidBodyBuilder::fixed()
                .translation(Vec2::new(0.0, 5.0))
                .build()
                .unwrap(),
        );
        let collider = world
            .insert_collider(ColliderBuilder::cuboid(Vec2::new(1.0, 1.0)).build().unwrap(), body)
            .unwrap();
        world.step();
        let ray = Ray::new(Vec2::ZERO, Vec2::Y);
        let (hit, intersection) = world.cast_ray(&ray, 100.0, true, &QueryFilter::new()).unwrap();
        assert_eq!(hit, collider);
        assert_relative_eq!(intersection.toi, 4.0, epsilon = 1e-5);
        assert_relative_eq!(intersection.normal.y, -1.0, epsilon = 1e-5);
    }
}
