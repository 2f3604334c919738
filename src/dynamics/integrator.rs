use crate::config::IntegrationParameters;
use crate::core::collider::ColliderSet;
use crate::core::rigidbody::{RigidBody, RigidBodySet};
use crate::core::types::Velocity;
use crate::math::{Dim, Real};

use super::parallel;

/// Advances body velocities and poses over one step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integrator {
    parallel: bool,
}

impl Integrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parallel(&mut self, enabled: bool) {
        self.parallel = enabled;
    }

    /// Gravity plus accumulated forces for awake dynamic bodies; kinematic bodies get
    /// the velocity that carries them to their next pose.
    pub fn apply_forces<D: Dim>(&self, gravity: D::Vector, params: &IntegrationParameters, bodies: &mut RigidBodySet<D>) {
        let dt = params.dt;
        let mut jobs: Vec<&mut RigidBody<D>> = bodies.iter_mut().map(|(_, body)| body).collect();
        parallel::for_each_job(&mut jobs, self.parallel, |body| {
            if body.is_kinematic() {
                derive_kinematic_velocity(body, dt);
                return;
            }
            if !body.is_dynamic() || body.is_sleeping() {
                return;
            }
            let linear = gravity * body.gravity_scale + body.force * body.inv_mass;
            let angular = D::inertia_mul(body.world_inv_inertia, body.torque);
            body.velocity.linear += linear * dt;
            body.velocity.angular += angular * dt;
            body.reset_forces();
        });
    }

    /// Moves dynamic bodies by their velocity and kinematic bodies to their next pose,
    /// then damps dynamic velocities and refreshes collider poses.
    pub fn integrate<D: Dim>(
        &self,
        params: &IntegrationParameters,
        bodies: &mut RigidBodySet<D>,
        colliders: &mut ColliderSet<D>,
    ) {
        let dt = params.dt;
        let mut jobs: Vec<&mut RigidBody<D>> = bodies.iter_mut().map(|(_, body)| body).collect();
        parallel::for_each_job(&mut jobs, self.parallel, |body| integrate_body(body, dt));
        colliders.update_all_positions(bodies);
    }
}

fn derive_kinematic_velocity<D: Dim>(body: &mut RigidBody<D>, dt: Real) {
    let Some(next) = body.next_kinematic_position else {
        // Target reached last step and none queued: the body stops there.
        if body.position_driven {
            body.velocity = Velocity::default();
            body.position_driven = false;
        }
        return;
    };
    if dt <= 0.0 {
        return;
    }
    body.position_driven = true;
    let local_com = body.mass_properties.local_com;
    let displacement = next.transform_point(local_com) - body.position.transform_point(local_com);
    let rotation = D::compose(&next.rotation, &D::inverse_rotation(&body.position.rotation));
    body.velocity.linear = displacement / dt;
    body.velocity.angular = D::rotation_vector(&rotation) / dt;
}

fn integrate_body<D: Dim>(body: &mut RigidBody<D>, dt: Real) {
    if body.is_static() || body.is_sleeping() {
        body.previous_position = body.position;
        return;
    }
    body.previous_position = body.position;
    if body.is_kinematic() {
        if let Some(next) = body.next_kinematic_position.take() {
            body.position = next;
        } else {
            body.position = body.integrated_position(&body.velocity, dt);
        }
        return;
    }

    body.velocity.linear *= 1.0 / (1.0 + dt * body.linear_damping);
    body.velocity.angular *= 1.0 / (1.0 + dt * body.angular_damping);
    body.position = body.integrated_position(&body.velocity, dt);
    body.update_world_inertia();
}
