use std::time::Instant;

use crate::collision::broadphase::BroadPhase;
use crate::collision::ccd::CCDSolver;
use crate::collision::narrowphase::NarrowPhase;
use crate::config::IntegrationParameters;
use crate::core::collider::{Collider, ColliderSet};
use crate::core::joint::{Joint, JointSet};
use crate::core::rigidbody::{RemovedBody, RigidBodySet};
use crate::dynamics::forces::ForceRegistry;
use crate::dynamics::integrator::Integrator;
use crate::dynamics::island::IslandManager;
use crate::dynamics::parallel;
use crate::dynamics::solver;
use crate::math::Dim;
use crate::utils::allocator::{ColliderHandle, JointHandle, RigidBodyHandle};
use crate::utils::logging::{warn_if_step_budget_exceeded, ScopedTimer};
use crate::utils::profiling::PhysicsProfiler;

use super::events::EventQueue;

/// Runs one simulation step over caller-owned sets.
///
/// The pipeline itself only holds scratch state (islands, CCD counters, the profiler,
/// registered force generators and events produced by removals between steps).
#[derive(Debug)]
pub struct PhysicsPipeline<D: Dim> {
    pub profiler: PhysicsProfiler,
    pub forces: ForceRegistry<D>,
    islands: IslandManager,
    ccd: CCDSolver,
    integrator: Integrator,
    parallel_enabled: bool,
    pending_events: EventQueue,
}

impl<D: Dim> Default for PhysicsPipeline<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> PhysicsPipeline<D> {
    pub fn new() -> Self {
        let mut pipeline = Self {
            profiler: PhysicsProfiler::default(),
            forces: ForceRegistry::new(),
            islands: IslandManager::new(),
            ccd: CCDSolver::new(),
            integrator: Integrator::new(),
            parallel_enabled: false,
            pending_events: EventQueue::new(),
        };
        pipeline.set_parallel_enabled(parallel::parallel_available());
        pipeline
    }

    /// Toggles rayon jobs for the narrow phase, solver and integrator. Has no effect
    /// without the `parallel` feature.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled && parallel::parallel_available();
        self.integrator.set_parallel(self.parallel_enabled);
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn islands(&self) -> &IslandManager {
        &self.islands
    }

    pub fn ccd(&self) -> &CCDSolver {
        &self.ccd
    }

    /// Advances the simulation by `params.dt`.
    ///
    /// Events produced during the step are appended to `events`; without a queue they
    /// are dropped.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        gravity: D::Vector,
        params: &IntegrationParameters,
        broad_phase: &mut BroadPhase<D>,
        narrow_phase: &mut NarrowPhase<D>,
        bodies: &mut RigidBodySet<D>,
        colliders: &mut ColliderSet<D>,
        joints: &mut JointSet<D>,
        events: Option<&mut EventQueue>,
    ) {
        let step_start = Instant::now();
        self.profiler.reset();
        self.profiler.body_count = bodies.len();

        // Bodies may have been teleported since the last step.
        colliders.update_all_positions(bodies);

        {
            let _timer = ScopedTimer::recording("forces", &mut self.profiler.integrator_time);
            self.forces.apply_all(bodies, params.dt);
            self.integrator.apply_forces(gravity, params, bodies);
        }

        let candidates = {
            let _timer = ScopedTimer::recording("broad_phase", &mut self.profiler.broad_phase_time);
            broad_phase.update(params, bodies, colliders)
        };
        self.profiler.candidate_pair_count = candidates.len();

        {
            let _timer = ScopedTimer::recording("narrow_phase", &mut self.profiler.narrow_phase_time);
            narrow_phase.update(
                params,
                &candidates,
                bodies,
                colliders,
                self.parallel_enabled,
                &mut self.pending_events,
            );
        }
        self.profiler.contact_pair_count = narrow_phase.active_contact_count();

        {
            let _timer = ScopedTimer::recording("islands", &mut self.profiler.island_time);
            self.islands.update(params, bodies, colliders, narrow_phase, joints);
        }
        self.profiler.active_island_count = self.islands.active_island_count();

        {
            let _timer = ScopedTimer::recording("solver", &mut self.profiler.solver_time);
            solver::solve_islands(
                params,
                self.islands.islands(),
                bodies,
                colliders,
                narrow_phase,
                joints,
                self.parallel_enabled,
            );
        }

        {
            let _timer = ScopedTimer::recording("integrate", &mut self.profiler.integrator_time);
            self.integrator.integrate(params, bodies, colliders);
        }

        {
            let _timer = ScopedTimer::recording("ccd", &mut self.profiler.ccd_time);
            self.profiler.ccd_substeps = self.ccd.solve(params, bodies, colliders);
        }

        match events {
            Some(queue) => queue.append(&mut self.pending_events),
            None => self.pending_events.clear(),
        }

        self.profiler.total_step_time = step_start.elapsed();
        warn_if_step_budget_exceeded(self.profiler.total_step_time, params.dt * 1000.0);
        self.profiler.report();
    }

    /// Removes a body, its colliders and attached joints, and every broad/narrow-phase
    /// reference to them. Stop events are delivered with the next step.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_rigid_body(
        &mut self,
        handle: RigidBodyHandle,
        broad_phase: &mut BroadPhase<D>,
        narrow_phase: &mut NarrowPhase<D>,
        bodies: &mut RigidBodySet<D>,
        colliders: &mut ColliderSet<D>,
        joints: &mut JointSet<D>,
    ) -> Option<RemovedBody<D>> {
        let removed = bodies.remove(handle, colliders, joints)?;
        for collider in &removed.colliders {
            broad_phase.remove(*collider);
            narrow_phase.remove_collider(*collider, &mut self.pending_events);
        }
        Some(removed)
    }

    pub fn remove_collider(
        &mut self,
        handle: ColliderHandle,
        broad_phase: &mut BroadPhase<D>,
        narrow_phase: &mut NarrowPhase<D>,
        bodies: &mut RigidBodySet<D>,
        colliders: &mut ColliderSet<D>,
        wake_up: bool,
    ) -> Option<Collider<D>> {
        let collider = colliders.remove(handle, bodies, wake_up)?;
        broad_phase.remove(handle);
        narrow_phase.remove_collider(handle, &mut self.pending_events);
        log::debug!("removed collider {:?}", handle);
        Some(collider)
    }

    pub fn remove_joint(
        &mut self,
        handle: JointHandle,
        bodies: &mut RigidBodySet<D>,
        joints: &mut JointSet<D>,
        wake_up: bool,
    ) -> Option<Joint<D>> {
        let joint = joints.remove(handle, bodies, wake_up)?;
        log::debug!("removed joint {:?}", handle);
        Some(joint)
    }
}
