//! Continuous collision detection for fast bodies.
//!
//! Runs after integration. A CCD-enabled body that moved farther than its thinnest
//! collider during the step is swept from its previous pose; at the earliest time of
//! impact it is stopped, its contacts are solved, and the remaining time is integrated.

use crate::collision::contact::{generate_manifolds, ContactManifold};
use crate::collision::narrowphase::PairKey;
use crate::collision::queries::{time_of_impact, Motion};
use crate::config::IntegrationParameters;
use crate::core::collider::{Collider, ColliderSet};
use crate::core::rigidbody::{RigidBody, RigidBodySet};
use crate::core::types::Transform;
use crate::dynamics::solver::solve_body_velocity;
use crate::math::{Dim, Real, Vector};
use crate::utils::allocator::{ColliderHandle, RigidBodyHandle};

/// Earliest impact found along a body's sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub toi: Real,
    pub collider: ColliderHandle,
    pub other: ColliderHandle,
}

#[derive(Debug, Clone, Default)]
pub struct CCDSolver {
    substeps: usize,
    exhausted: usize,
}

impl CCDSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substeps performed during the last `solve`.
    pub fn last_substep_count(&self) -> usize {
        self.substeps
    }

    /// Bodies left at their impact pose because the substep budget ran out.
    pub fn last_exhausted_count(&self) -> usize {
        self.exhausted
    }

    /// Bodies whose motion this step is large enough to warrant a sweep.
    pub fn candidates<D: Dim>(&self, bodies: &RigidBodySet<D>, colliders: &ColliderSet<D>) -> Vec<RigidBodyHandle> {
        bodies
            .iter()
            .filter(|(_, body)| body.is_dynamic() && body.is_ccd_enabled() && !body.is_sleeping())
            .filter(|(_, body)| {
                ccd_thickness(body, colliders).is_some_and(|thickness| {
                    com_travel(body, body.previous_position(), body.position()) > thickness
                })
            })
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Sweeps every candidate body and resolves its earliest impacts.
    pub fn solve<D: Dim>(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut RigidBodySet<D>,
        colliders: &mut ColliderSet<D>,
    ) -> usize {
        self.substeps = 0;
        self.exhausted = 0;
        for handle in self.candidates(bodies, colliders) {
            self.solve_body(params, handle, bodies, colliders);
        }
        self.substeps
    }

    fn solve_body<D: Dim>(
        &mut self,
        params: &IntegrationParameters,
        handle: RigidBodyHandle,
        bodies: &mut RigidBodySet<D>,
        colliders: &mut ColliderSet<D>,
    ) {
        let max_substeps = params.ccd_substeps();
        let Some(body) = bodies.get(handle) else {
            return;
        };
        let Some(thickness) = ccd_thickness(body, colliders) else {
            return;
        };
        let mut start = *body.previous_position();
        let mut end = *body.position();
        let mut remaining = params.dt;
        let mut last_hit: Option<ColliderHandle> = None;

        for substep in 0..=max_substeps {
            // Motion left after a resolved impact may be small enough for discrete contacts.
            if substep > 0 && bodies.get(handle).map_or(true, |b| com_travel(b, &start, &end) <= thickness) {
                break;
            }
            let Some(impact) = earliest_impact(params, handle, &start, &end, bodies, colliders) else {
                break;
            };
            // Sliding along the surface just resolved: the velocity solve already handled it.
            if impact.toi <= 0.0 && last_hit == Some(impact.other) {
                break;
            }
            last_hit = Some(impact.other);
            let pose = start.interpolate(&end, impact.toi);
            place_body(handle, pose, bodies, colliders);

            if substep == max_substeps {
                self.exhausted += 1;
                log::warn!(
                    "CCD substeps exhausted for body {}; leaving it at its impact pose",
                    handle.index()
                );
                break;
            }
            self.substeps += 1;
            remaining *= 1.0 - impact.toi;

            let manifolds = impact_manifolds(params, handle, bodies, colliders);
            let Some(velocity) = solve_body_velocity(params, handle, &manifolds, bodies, colliders) else {
                break;
            };
            let Some(body) = bodies.get_mut(handle) else {
                break;
            };
            body.velocity = velocity;
            if params.return_after_ccd_substep {
                // Remaining motion is left to the next step.
                break;
            }
            start = pose;
            end = body.integrated_position(&velocity, remaining);
            place_body(handle, end, bodies, colliders);
        }
    }
}

fn ccd_thickness<D: Dim>(body: &RigidBody<D>, colliders: &ColliderSet<D>) -> Option<Real> {
    body.colliders()
        .iter()
        .filter_map(|h| colliders.get(*h))
        .filter(|c| !c.is_sensor())
        .map(|c| c.shape().ccd_thickness())
        .min_by(|a, b| a.total_cmp(b))
}

fn com_travel<D: Dim>(body: &RigidBody<D>, from: &Transform<D>, to: &Transform<D>) -> Real {
    let local_com = body.mass_properties().local_com;
    (to.transform_point(local_com) - from.transform_point(local_com)).length()
}

fn place_body<D: Dim>(
    handle: RigidBodyHandle,
    pose: Transform<D>,
    bodies: &mut RigidBodySet<D>,
    colliders: &mut ColliderSet<D>,
) {
    if let Some(body) = bodies.get_mut(handle) {
        body.position = pose;
        body.update_world_inertia();
        colliders.update_positions(body);
    }
}

fn blocks<D: Dim>(own: &Collider<D>, other: &Collider<D>) -> bool {
    !other.is_sensor() && own.parent() != other.parent() && own.collision_groups.test(&other.collision_groups)
}

/// Earliest impact of the body moving from `start` to `end` against every other collider
/// at its current pose.
pub fn earliest_impact<D: Dim>(
    params: &IntegrationParameters,
    handle: RigidBodyHandle,
    start: &Transform<D>,
    end: &Transform<D>,
    bodies: &RigidBodySet<D>,
    colliders: &ColliderSet<D>,
) -> Option<Impact> {
    let body: &RigidBody<D> = bodies.get(handle)?;
    let target = params.prediction_distance * 0.5;
    let mut best: Option<Impact> = None;

    for own_handle in body.colliders() {
        let Some(own) = colliders.get(*own_handle) else {
            continue;
        };
        if own.is_sensor() {
            continue;
        }
        let motion = Motion::new(*start, *end, *own.local_position());
        let swept = own
            .shape()
            .compute_aabb(&motion.pose_at(0.0))
            .merged(&own.shape().compute_aabb(&motion.pose_at(1.0)))
            .loosened(target);

        for (other_handle, other) in colliders.iter() {
            if !blocks(own, other) || !swept.intersects(&other.compute_aabb()) {
                continue;
            }
            let Some(toi) = time_of_impact(
                own.shape(),
                &motion,
                other.shape(),
                &Motion::stationary(*other.position()),
                target,
                params.ccd_on_penetration_enabled,
            ) else {
                continue;
            };
            if best.map_or(true, |b| toi < b.toi) {
                best = Some(Impact {
                    toi,
                    collider: *own_handle,
                    other: other_handle,
                });
            }
        }
    }
    best
}

/// Fresh manifolds between the body's colliders and everything within prediction distance.
fn impact_manifolds<D: Dim>(
    params: &IntegrationParameters,
    handle: RigidBodyHandle,
    bodies: &RigidBodySet<D>,
    colliders: &ColliderSet<D>,
) -> Vec<(PairKey, ContactManifold<D>)> {
    let Some(body) = bodies.get(handle) else {
        return Vec::new();
    };
    let mut manifolds = Vec::new();
    for own_handle in body.colliders() {
        let Some(own) = colliders.get(*own_handle) else {
            continue;
        };
        if own.is_sensor() {
            continue;
        }
        let region = own.compute_aabb().loosened(params.prediction_distance);
        for (other_handle, other) in colliders.iter() {
            if !blocks(own, other) || !region.intersects(&other.compute_aabb()) {
                continue;
            }
            for manifold in generate_manifolds(own, other, params.prediction_distance) {
                manifolds.push(((*own_handle, other_handle), manifold));
            }
        }
    }
    manifolds
}
