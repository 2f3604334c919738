use std::collections::HashMap;

use crate::collision::contact::ContactManifold;
use crate::collision::narrowphase::{NarrowPhase, PairKey};
use crate::config::IntegrationParameters;
use crate::core::collider::ColliderSet;
use crate::core::joint::{impulse_slots, Joint, JointKind, JointSet};
use crate::core::rigidbody::{RigidBody, RigidBodySet};
use crate::core::types::{Transform, Velocity};
use crate::math::{Dim, Real, Vector};
use crate::utils::allocator::{JointHandle, RigidBodyHandle};

use super::island::Island;
use super::parallel;

/// Working copy of a body for the duration of one solve.
#[derive(Debug, Clone)]
struct SolverBody<D: Dim> {
    handle: RigidBodyHandle,
    position: Transform<D>,
    local_com: D::Vector,
    velocity: Velocity<D>,
    inv_mass: Real,
    inv_inertia: D::AngularInertia,
    writable: bool,
}

impl<D: Dim> SolverBody<D> {
    fn new(handle: RigidBodyHandle, body: &RigidBody<D>, writable: bool) -> Self {
        let movable = writable && body.is_dynamic();
        Self {
            handle,
            position: body.position,
            local_com: body.mass_properties.local_com,
            velocity: body.velocity,
            inv_mass: if movable { body.inv_mass } else { 0.0 },
            inv_inertia: if movable {
                body.world_inv_inertia
            } else {
                D::inertia_zero()
            },
            writable: movable,
        }
    }

    fn com(&self) -> D::Vector {
        self.position.transform_point(self.local_com)
    }

    fn apply_impulse(&mut self, linear: D::Vector, angular: D::Angular) {
        self.velocity.linear += linear * self.inv_mass;
        self.velocity.angular += D::inertia_mul(self.inv_inertia, angular);
    }

    /// Moves the body as if `linear`/`angular` were impulses applied over unit time,
    /// rotating about the center of mass.
    fn apply_displacement(&mut self, linear: D::Vector, angular: D::Angular) {
        if !self.writable {
            return;
        }
        let com = self.com() + linear * self.inv_mass;
        let rotation = D::integrate_rotation(
            &self.position.rotation,
            D::inertia_mul(self.inv_inertia, angular),
            1.0,
        );
        self.position = Transform::new(com - D::rotate(&rotation, self.local_com), rotation);
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

/// One constraint row `J = [-lin, -ang1, lin, ang2]`.
#[derive(Debug, Clone, Copy)]
struct Jacobian<D: Dim> {
    lin: D::Vector,
    ang1: D::Angular,
    ang2: D::Angular,
}

impl<D: Dim> Jacobian<D> {
    /// Relative motion of the anchor points `r1`, `r2` along `dir`.
    fn linear(dir: D::Vector, r1: D::Vector, r2: D::Vector) -> Self {
        Self {
            lin: dir,
            ang1: D::cross(r1, dir),
            ang2: D::cross(r2, dir),
        }
    }

    /// Relative rotation about `axis`.
    fn angular(axis: D::Angular) -> Self {
        Self {
            lin: D::Vector::ZERO,
            ang1: axis,
            ang2: axis,
        }
    }

    fn velocity(&self, b1: &SolverBody<D>, b2: &SolverBody<D>) -> Real {
        self.lin.dot(b2.velocity.linear - b1.velocity.linear) + self.ang2.dot(b2.velocity.angular)
            - self.ang1.dot(b1.velocity.angular)
    }

    fn inv_effective_mass(&self, b1: &SolverBody<D>, b2: &SolverBody<D>) -> Real {
        (b1.inv_mass + b2.inv_mass) * self.lin.length_squared()
            + D::inertia_mul(b1.inv_inertia, self.ang1).dot(self.ang1)
            + D::inertia_mul(b2.inv_inertia, self.ang2).dot(self.ang2)
    }

    fn effective_mass(&self, b1: &SolverBody<D>, b2: &SolverBody<D>) -> Real {
        let k = self.inv_effective_mass(b1, b2);
        if k > Real::EPSILON {
            1.0 / k
        } else {
            0.0
        }
    }

    fn apply(&self, b1: &mut SolverBody<D>, b2: &mut SolverBody<D>, impulse: Real) {
        b1.apply_impulse(-self.lin * impulse, -self.ang1 * impulse);
        b2.apply_impulse(self.lin * impulse, self.ang2 * impulse);
    }

    fn displace(&self, b1: &mut SolverBody<D>, b2: &mut SolverBody<D>, impulse: Real) {
        b1.apply_displacement(-self.lin * impulse, -self.ang1 * impulse);
        b2.apply_displacement(self.lin * impulse, self.ang2 * impulse);
    }

    /// Drives the position error `error` toward zero by `fraction` in one displacement.
    fn correct(&self, b1: &mut SolverBody<D>, b2: &mut SolverBody<D>, error: Real, fraction: Real) {
        let k = self.inv_effective_mass(b1, b2);
        if k > Real::EPSILON {
            self.displace(b1, b2, -fraction * error / k);
        }
    }
}

#[derive(Debug, Clone)]
struct ContactPointConstraint<D: Dim> {
    normal: Jacobian<D>,
    normal_mass: Real,
    tangents: [Jacobian<D>; 2],
    tangent_mass: [Real; 2],
    target_velocity: Real,
    normal_impulse: Real,
    tangent_impulses: [Real; 2],
    /// Anchors in the body frames, used by the position passes.
    local_p1: D::Vector,
    local_p2: D::Vector,
}

#[derive(Debug, Clone)]
struct ContactConstraint<D: Dim> {
    /// Narrow-phase pair and manifold the impulses are written back to.
    source: Option<(PairKey, usize)>,
    body1: usize,
    body2: usize,
    local_normal1: D::Vector,
    friction: Real,
    points: Vec<ContactPointConstraint<D>>,
}

#[derive(Debug, Clone)]
struct JointRow<D: Dim> {
    jacobian: Jacobian<D>,
    mass: Real,
    target_velocity: Real,
    lower: Real,
    upper: Real,
    slot: usize,
    impulse: Real,
}

/// World-space placement of a joint's frames.
struct JointGeometry<D: Dim> {
    anchor1: D::Vector,
    anchor2: D::Vector,
    frame_rotation1: D::Rotation,
    frame_rotation2: D::Rotation,
    /// Free axis: the first basis vector of frame 1.
    axis: D::Vector,
    com1: D::Vector,
    com2: D::Vector,
}

impl<D: Dim> JointGeometry<D> {
    fn new(b1: &SolverBody<D>, b2: &SolverBody<D>, frame1: &Transform<D>, frame2: &Transform<D>) -> Self {
        let world1 = b1.position.combine(frame1);
        let world2 = b2.position.combine(frame2);
        Self {
            anchor1: world1.translation,
            anchor2: world2.translation,
            frame_rotation1: world1.rotation,
            frame_rotation2: world2.rotation,
            axis: D::rotate(&world1.rotation, D::basis(0)),
            com1: b1.com(),
            com2: b2.com(),
        }
    }

    fn translation_along_axis(&self) -> Real {
        (self.anchor2 - self.anchor1).dot(self.axis)
    }

    /// Rotation of frame 2 relative to frame 1 about the free axis.
    fn angle(&self) -> Real {
        let relative = D::compose(&D::inverse_rotation(&self.frame_rotation1), &self.frame_rotation2);
        D::rotation_vector(&relative).dot(D::angular_basis(0))
    }

    /// Rotation taking frame 1 onto frame 2, as a world-space rotation vector.
    fn rotation_error(&self) -> D::Angular {
        let relative = D::compose(&D::inverse_rotation(&self.frame_rotation1), &self.frame_rotation2);
        D::rotate_angular(&self.frame_rotation1, D::rotation_vector(&relative))
    }

    fn free_axis_jacobian(&self, kind: &JointKind) -> Jacobian<D> {
        match kind {
            JointKind::Revolute { .. } => Jacobian::angular(D::hinge_axis(self.axis)),
            _ => Jacobian::linear(self.axis, self.anchor2 - self.com1, self.anchor2 - self.com2),
        }
    }

    fn free_coordinate(&self, kind: &JointKind) -> Real {
        match kind {
            JointKind::Revolute { .. } => self.angle(),
            _ => self.translation_along_axis(),
        }
    }

    fn linear_locks(&self, kind: &JointKind) -> Vec<Jacobian<D>> {
        match kind {
            JointKind::Prismatic { .. } => {
                let (r1, r2) = (self.anchor2 - self.com1, self.anchor2 - self.com2);
                D::tangents(self.axis)
                    .into_iter()
                    .take(D::TANGENTS)
                    .map(|t| Jacobian::linear(t, r1, r2))
                    .collect()
            }
            _ => {
                let (r1, r2) = (self.anchor1 - self.com1, self.anchor2 - self.com2);
                (0..D::DIM)
                    .map(|i| Jacobian::linear(D::basis(i), r1, r2))
                    .collect()
            }
        }
    }

    fn angular_locks(&self, kind: &JointKind) -> Vec<D::Angular> {
        match kind {
            JointKind::Ball => Vec::new(),
            JointKind::Revolute { .. } => D::hinge_locked_axes(self.axis),
            JointKind::Fixed | JointKind::Prismatic { .. } => (0..D::ANG_DIM).map(D::angular_basis).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct JointConstraint<D: Dim> {
    handle: Option<JointHandle>,
    body1: usize,
    body2: usize,
    kind: JointKind,
    frame1: Transform<D>,
    frame2: Transform<D>,
    rows: Vec<JointRow<D>>,
}

/// Sequential-impulse solver for one island (or batch of islands).
#[derive(Debug, Clone, Default)]
pub(crate) struct IslandSolver<D: Dim> {
    bodies: Vec<SolverBody<D>>,
    index: HashMap<RigidBodyHandle, usize>,
    contacts: Vec<ContactConstraint<D>>,
    joints: Vec<JointConstraint<D>>,
}

impl<D: Dim> IslandSolver<D> {
    pub(crate) fn new() -> Self {
        Self {
            bodies: Vec::new(),
            index: HashMap::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
        }
    }

    /// Solver state for `island`, reading the current manifolds and joints.
    pub(crate) fn from_island(
        params: &IntegrationParameters,
        island: &Island,
        bodies: &RigidBodySet<D>,
        colliders: &ColliderSet<D>,
        narrow_phase: &NarrowPhase<D>,
        joints: &JointSet<D>,
    ) -> Self {
        let mut solver = Self::new();
        for handle in &island.bodies {
            solver.body_index(*handle, bodies, true);
        }
        for key in &island.contact_pairs {
            if let Some(pair) = narrow_phase.contact_pair(key.0, key.1) {
                for (index, manifold) in pair.manifolds.iter().enumerate() {
                    solver.add_manifold(params, Some((*key, index)), *key, manifold, bodies, colliders);
                }
            }
        }
        for handle in &island.joints {
            if let Some(joint) = joints.get(*handle) {
                solver.add_joint(params, Some(*handle), joint, bodies);
            }
        }
        solver
    }

    /// Index of `handle` in the working set. Bodies added with `writable == false`
    /// behave as infinitely heavy and are never written back.
    fn body_index(&mut self, handle: RigidBodyHandle, bodies: &RigidBodySet<D>, writable: bool) -> Option<usize> {
        if let Some(index) = self.index.get(&handle) {
            return Some(*index);
        }
        let body = bodies.get(handle)?;
        let index = self.bodies.len();
        self.bodies.push(SolverBody::new(handle, body, writable));
        self.index.insert(handle, index);
        Some(index)
    }

    pub(crate) fn add_manifold(
        &mut self,
        params: &IntegrationParameters,
        source: Option<(PairKey, usize)>,
        colliders_pair: PairKey,
        manifold: &ContactManifold<D>,
        bodies: &RigidBodySet<D>,
        colliders: &ColliderSet<D>,
    ) {
        if manifold.points.is_empty() {
            return;
        }
        let (Some(c1), Some(c2)) = (colliders.get(colliders_pair.0), colliders.get(colliders_pair.1)) else {
            return;
        };
        let (Some(i1), Some(i2)) = (
            self.body_index(c1.parent(), bodies, false),
            self.body_index(c2.parent(), bodies, false),
        ) else {
            return;
        };
        if i1 == i2 {
            return;
        }

        let (b1, b2) = (&self.bodies[i1], &self.bodies[i2]);
        let normal = manifold.normal;
        let tangents = D::tangents(normal);
        let (com1, com2) = (b1.com(), b2.com());
        let dt = params.dt;
        let inv_dt = params.inv_dt();
        let coeff = params.warmstart_coeff;

        let points = manifold
            .points
            .iter()
            .map(|point| {
                let p1 = c1.position().transform_point(point.local_p1);
                let p2 = c2.position().transform_point(point.local_p2);
                let (r1, r2) = (p1 - com1, p2 - com2);
                let normal_jacobian = Jacobian::linear(normal, r1, r2);
                let tangent_jacobians = [
                    Jacobian::linear(tangents[0], r1, r2),
                    Jacobian::linear(tangents[1], r1, r2),
                ];

                let approach = normal_jacobian.velocity(b1, b2);
                let gap = -point.depth;
                let bounces = manifold.restitution > 0.0
                    && approach < -params.restitution_velocity_threshold
                    && gap <= -approach * dt;
                let target_velocity = if bounces {
                    -manifold.restitution * approach
                } else if gap > 0.0 {
                    -gap * inv_dt
                } else {
                    0.0
                };

                ContactPointConstraint {
                    normal: normal_jacobian,
                    normal_mass: normal_jacobian.effective_mass(b1, b2),
                    tangents: tangent_jacobians,
                    tangent_mass: [
                        tangent_jacobians[0].effective_mass(b1, b2),
                        tangent_jacobians[1].effective_mass(b1, b2),
                    ],
                    target_velocity,
                    normal_impulse: point.normal_impulse * coeff,
                    tangent_impulses: [point.tangent_impulses[0] * coeff, point.tangent_impulses[1] * coeff],
                    local_p1: b1.position.inverse_transform_point(p1),
                    local_p2: b2.position.inverse_transform_point(p2),
                }
            })
            .collect();

        self.contacts.push(ContactConstraint {
            source,
            body1: i1,
            body2: i2,
            local_normal1: b1.position.inverse_transform_vector(normal),
            friction: manifold.friction,
            points,
        });
    }

    fn add_joint(
        &mut self,
        params: &IntegrationParameters,
        handle: Option<JointHandle>,
        joint: &Joint<D>,
        bodies: &RigidBodySet<D>,
    ) {
        let (Some(i1), Some(i2)) = (
            self.body_index(joint.body1, bodies, false),
            self.body_index(joint.body2, bodies, false),
        ) else {
            return;
        };
        if i1 == i2 {
            return;
        }
        let (b1, b2) = (&self.bodies[i1], &self.bodies[i2]);
        let geometry = JointGeometry::new(b1, b2, &joint.local_frame1, &joint.local_frame2);
        let coeff = params.warmstart_coeff;
        let warm = |slot: usize| joint.impulses.get(slot).copied().unwrap_or(0.0) * coeff;
        let locked = |jacobian: Jacobian<D>, slot: usize| JointRow {
            jacobian,
            mass: jacobian.effective_mass(b1, b2),
            target_velocity: 0.0,
            lower: Real::NEG_INFINITY,
            upper: Real::INFINITY,
            slot,
            impulse: warm(slot),
        };

        let mut rows = Vec::new();
        for (i, jacobian) in geometry.linear_locks(&joint.kind).into_iter().enumerate() {
            rows.push(locked(jacobian, i));
        }
        for (i, axis) in geometry.angular_locks(&joint.kind).into_iter().enumerate() {
            rows.push(locked(Jacobian::angular(axis), D::DIM + i));
        }

        let free = geometry.free_axis_jacobian(&joint.kind);
        if let Some(limits) = joint.kind.limits() {
            let coordinate = geometry.free_coordinate(&joint.kind);
            let bounds = if coordinate <= limits.min {
                Some((0.0, Real::INFINITY))
            } else if coordinate >= limits.max {
                Some((Real::NEG_INFINITY, 0.0))
            } else {
                None
            };
            if let Some((lower, upper)) = bounds {
                let slot = D::DIM + D::ANG_DIM;
                rows.push(JointRow {
                    lower,
                    upper,
                    impulse: warm(slot).clamp(lower, upper),
                    ..locked(free, slot)
                });
            }
        }
        if let Some(motor) = joint.kind.motor() {
            let slot = D::DIM + D::ANG_DIM + 1;
            let max_impulse = motor.max_force * params.dt;
            rows.push(JointRow {
                target_velocity: motor.target_velocity,
                lower: -max_impulse,
                upper: max_impulse,
                impulse: warm(slot).clamp(-max_impulse, max_impulse),
                ..locked(free, slot)
            });
        }

        self.joints.push(JointConstraint {
            handle,
            body1: i1,
            body2: i2,
            kind: joint.kind,
            frame1: joint.local_frame1,
            frame2: joint.local_frame2,
            rows,
        });
    }

    fn warm_start(&mut self) {
        for joint in &self.joints {
            let (b1, b2) = pair_mut(&mut self.bodies, joint.body1, joint.body2);
            for row in &joint.rows {
                row.jacobian.apply(b1, b2, row.impulse);
            }
        }
        for contact in &self.contacts {
            let (b1, b2) = pair_mut(&mut self.bodies, contact.body1, contact.body2);
            for point in &contact.points {
                point.normal.apply(b1, b2, point.normal_impulse);
                for k in 0..D::TANGENTS {
                    point.tangents[k].apply(b1, b2, point.tangent_impulses[k]);
                }
            }
        }
    }

    fn solve_velocity_pass(&mut self) {
        for joint in &mut self.joints {
            let (b1, b2) = pair_mut(&mut self.bodies, joint.body1, joint.body2);
            for row in &mut joint.rows {
                let error = row.jacobian.velocity(b1, b2) - row.target_velocity;
                let total = (row.impulse - error * row.mass).clamp(row.lower, row.upper);
                let delta = total - row.impulse;
                row.impulse = total;
                row.jacobian.apply(b1, b2, delta);
            }
        }

        for contact in &mut self.contacts {
            let (b1, b2) = pair_mut(&mut self.bodies, contact.body1, contact.body2);
            for point in &mut contact.points {
                let limit = contact.friction * point.normal_impulse;
                let mut proposed = point.tangent_impulses;
                for k in 0..D::TANGENTS {
                    let slip = point.tangents[k].velocity(b1, b2);
                    proposed[k] -= slip * point.tangent_mass[k];
                }
                let magnitude = proposed[..D::TANGENTS]
                    .iter()
                    .map(|x| x * x)
                    .sum::<Real>()
                    .sqrt();
                if magnitude > limit {
                    let scale = if magnitude > Real::EPSILON { limit / magnitude } else { 0.0 };
                    for value in proposed.iter_mut().take(D::TANGENTS) {
                        *value *= scale;
                    }
                }
                for k in 0..D::TANGENTS {
                    let delta = proposed[k] - point.tangent_impulses[k];
                    point.tangent_impulses[k] = proposed[k];
                    point.tangents[k].apply(b1, b2, delta);
                }

                let error = point.normal.velocity(b1, b2) - point.target_velocity;
                let total = (point.normal_impulse - error * point.normal_mass).max(0.0);
                let delta = total - point.normal_impulse;
                point.normal_impulse = total;
                point.normal.apply(b1, b2, delta);
            }
        }
    }

    fn solve_position_pass(&mut self, params: &IntegrationParameters) {
        for joint in &self.joints {
            let (b1, b2) = pair_mut(&mut self.bodies, joint.body1, joint.body2);
            correct_joint(params, joint, b1, b2);
        }

        for contact in &self.contacts {
            let (b1, b2) = pair_mut(&mut self.bodies, contact.body1, contact.body2);
            for point in &contact.points {
                let p1 = b1.position.transform_point(point.local_p1);
                let p2 = b2.position.transform_point(point.local_p2);
                let normal = b1.position.transform_vector(contact.local_normal1);
                let separation = (p2 - p1).dot(normal);
                let error = (separation + params.allowed_linear_error)
                    .min(0.0)
                    .max(-params.max_linear_correction);
                if error < 0.0 {
                    Jacobian::linear(normal, p1 - b1.com(), p2 - b2.com()).correct(b1, b2, error, params.erp);
                }
            }
        }
    }

    pub(crate) fn solve(&mut self, params: &IntegrationParameters) {
        self.warm_start();
        for _ in 0..params.max_velocity_iterations {
            self.solve_velocity_pass();
        }
        for _ in 0..params.max_position_iterations {
            self.solve_position_pass(params);
        }
    }

    /// Velocity passes only; positions stay untouched.
    pub(crate) fn solve_velocities(&mut self, params: &IntegrationParameters) {
        self.warm_start();
        for _ in 0..params.max_velocity_iterations {
            self.solve_velocity_pass();
        }
    }

    pub(crate) fn velocity_of(&self, handle: RigidBodyHandle) -> Option<Velocity<D>> {
        self.index.get(&handle).map(|i| self.bodies[*i].velocity)
    }

    /// Copies poses, velocities and accumulated impulses back to their owners.
    pub(crate) fn write_back(
        self,
        bodies: &mut RigidBodySet<D>,
        narrow_phase: &mut NarrowPhase<D>,
        joints: &mut JointSet<D>,
    ) {
        for solver_body in &self.bodies {
            if !solver_body.writable {
                continue;
            }
            if let Some(body) = bodies.get_mut(solver_body.handle) {
                body.position = solver_body.position;
                body.velocity = solver_body.velocity;
            }
        }

        for contact in &self.contacts {
            let Some((key, index)) = contact.source else {
                continue;
            };
            let Some(manifold) = narrow_phase
                .contact_pair_mut(&key)
                .and_then(|pair| pair.manifolds.get_mut(index))
            else {
                continue;
            };
            for (target, solved) in manifold.points.iter_mut().zip(&contact.points) {
                target.normal_impulse = solved.normal_impulse;
                target.tangent_impulses = solved.tangent_impulses;
            }
        }

        for joint in &self.joints {
            let Some(target) = joint.handle.and_then(|handle| joints.get_mut(handle)) else {
                continue;
            };
            let mut impulses = vec![0.0; impulse_slots::<D>()];
            for row in &joint.rows {
                impulses[row.slot] = row.impulse;
            }
            target.impulses = impulses;
        }
    }
}

/// One nonlinear position pass over a joint.
fn correct_joint<D: Dim>(
    params: &IntegrationParameters,
    joint: &JointConstraint<D>,
    b1: &mut SolverBody<D>,
    b2: &mut SolverBody<D>,
) {
    let erp = params.joint_erp;
    let max_linear = params.max_linear_correction;
    let max_angular = params.max_angular_correction;

    let geometry = JointGeometry::new(b1, b2, &joint.frame1, &joint.frame2);
    let mut offset = geometry.anchor2 - geometry.anchor1;
    if matches!(joint.kind, JointKind::Prismatic { .. }) {
        offset -= geometry.axis * offset.dot(geometry.axis);
    }
    for jacobian in geometry.linear_locks(&joint.kind) {
        let error = offset.dot(jacobian.lin);
        if error.abs() > params.allowed_linear_error {
            jacobian.correct(b1, b2, error.clamp(-max_linear, max_linear), erp);
        }
    }

    let geometry = JointGeometry::new(b1, b2, &joint.frame1, &joint.frame2);
    let rotation_error = match joint.kind {
        JointKind::Revolute { .. } => {
            // Misalignment of the two hinge axes.
            let axis2 = D::rotate(&geometry.frame_rotation2, D::basis(0));
            D::cross(geometry.axis, axis2)
        }
        _ => geometry.rotation_error(),
    };
    for axis in geometry.angular_locks(&joint.kind) {
        let error = rotation_error.dot(axis);
        if error.abs() > params.allowed_angular_error {
            Jacobian::angular(axis).correct(b1, b2, error.clamp(-max_angular, max_angular), erp);
        }
    }

    if let Some(limits) = joint.kind.limits() {
        let geometry = JointGeometry::new(b1, b2, &joint.frame1, &joint.frame2);
        let coordinate = geometry.free_coordinate(&joint.kind);
        let max_correction = match joint.kind {
            JointKind::Revolute { .. } => max_angular,
            _ => max_linear,
        };
        let error = if coordinate < limits.min {
            coordinate - limits.min
        } else if coordinate > limits.max {
            coordinate - limits.max
        } else {
            0.0
        };
        if error != 0.0 {
            geometry
                .free_axis_jacobian(&joint.kind)
                .correct(b1, b2, error.clamp(-max_correction, max_correction), erp);
        }
    }
}

/// Solves every island, in parallel when enabled, then writes results back in island order.
pub fn solve_islands<D: Dim>(
    params: &IntegrationParameters,
    islands: &[Island],
    bodies: &mut RigidBodySet<D>,
    colliders: &ColliderSet<D>,
    narrow_phase: &mut NarrowPhase<D>,
    joints: &mut JointSet<D>,
    parallel_enabled: bool,
) {
    let solved = {
        let (bodies, narrow_phase, joints) = (&*bodies, &*narrow_phase, &*joints);
        parallel::map_jobs(islands, parallel_enabled, |island| {
            let mut solver = IslandSolver::from_island(params, island, bodies, colliders, narrow_phase, joints);
            solver.solve(params);
            solver
        })
    };
    for solver in solved {
        solver.write_back(bodies, narrow_phase, joints);
    }
}

/// Velocity solve of a single body against fresh manifolds; every other body is
/// treated as immovable. Returns the body's new velocity.
pub(crate) fn solve_body_velocity<D: Dim>(
    params: &IntegrationParameters,
    handle: RigidBodyHandle,
    manifolds: &[(PairKey, ContactManifold<D>)],
    bodies: &RigidBodySet<D>,
    colliders: &ColliderSet<D>,
) -> Option<Velocity<D>> {
    let mut solver = IslandSolver::new();
    solver.body_index(handle, bodies, true)?;
    for (pair, manifold) in manifolds {
        solver.add_manifold(params, None, *pair, manifold, bodies, colliders);
    }
    solver.solve_velocities(params);
    solver.velocity_of(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::contact::generate_manifolds;
    use crate::core::collider::ColliderBuilder;
    use crate::core::joint::JointBuilder;
    use crate::core::rigidbody::RigidBodyBuilder;
    use crate::math::{Dim2, Dim3};
    use approx::assert_relative_eq;
    use glam::{Vec2, Vec3};

    #[test]
    fn contact_stops_approach_without_pulling() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let mut colliders = ColliderSet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build().unwrap());
        let g = colliders
            .insert(ColliderBuilder::cuboid(Vec2::new(5.0, 0.5)).build().unwrap(), ground, &mut bodies)
            .unwrap();
        let ball = bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(Vec2::new(0.0, 0.99))
                .linvel(Vec2::new(0.0, -0.5))
                .build()
                .unwrap(),
        );
        let b = colliders
            .insert(ColliderBuilder::ball(0.5).build().unwrap(), ball, &mut bodies)
            .unwrap();

        let params = IntegrationParameters::default();
        let manifolds = generate_manifolds(colliders.get(g).unwrap(), colliders.get(b).unwrap(), 0.01);
        let pairs: Vec<(PairKey, ContactManifold<Dim2>)> = manifolds.into_iter().map(|m| ((g, b), m)).collect();
        let velocity = solve_body_velocity(&params, ball, &pairs, &bodies, &colliders).unwrap();
        assert_relative_eq!(velocity.linear.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn warmstart_coeff_scales_carried_impulses() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let mut colliders = ColliderSet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build().unwrap());
        let g = colliders
            .insert(ColliderBuilder::cuboid(Vec2::new(5.0, 0.5)).build().unwrap(), ground, &mut bodies)
            .unwrap();
        let ball = bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(Vec2::new(0.0, 0.99))
                .build()
                .unwrap(),
        );
        let b = colliders
            .insert(ColliderBuilder::ball(0.5).build().unwrap(), ball, &mut bodies)
            .unwrap();
        let mut manifold = generate_manifolds(colliders.get(g).unwrap(), colliders.get(b).unwrap(), 0.01)
            .into_iter()
            .next()
            .unwrap();
        for point in &mut manifold.points {
            point.normal_impulse = 2.0;
        }
        let carried = 2.0 * manifold.points.len() as Real;
        let mass = bodies.get(ball).unwrap().mass();

        for coeff in [0.0, 0.5, 1.0] {
            let params = IntegrationParameters {
                warmstart_coeff: coeff,
                ..IntegrationParameters::default()
            };
            let mut solver = IslandSolver::new();
            solver.body_index(ball, &bodies, true);
            solver.add_manifold(&params, None, (g, b), &manifold, &bodies, &colliders);
            assert!(solver.contacts[0]
                .points
                .iter()
                .all(|point| point.normal_impulse == 2.0 * coeff));

            solver.warm_start();
            let velocity = solver.velocity_of(ball).unwrap();
            assert_relative_eq!(velocity.linear.y, coeff * carried / mass, epsilon = 1e-5);
        }
    }

    #[test]
    fn friction_is_bounded_by_normal_impulse() {
        let mut bodies = RigidBodySet::<Dim3>::new();
        let mut colliders = ColliderSet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build().unwrap());
        let g = colliders
            .insert(
                ColliderBuilder::cuboid(Vec3::new(5.0, 0.5, 5.0)).friction(0.1).build().unwrap(),
                ground,
                &mut bodies,
            )
            .unwrap();
        let cube = bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(Vec3::new(0.0, 0.995, 0.0))
                .linvel(Vec3::new(10.0, -1.0, 0.0))
                .build()
                .unwrap(),
        );
        let c = colliders
            .insert(
                ColliderBuilder::cuboid(Vec3::splat(0.5)).friction(0.1).build().unwrap(),
                cube,
                &mut bodies,
            )
            .unwrap();

        let params = IntegrationParameters::default();
        let manifolds = generate_manifolds(colliders.get(g).unwrap(), colliders.get(c).unwrap(), 0.01);
        let pairs: Vec<(PairKey, ContactManifold<Dim3>)> = manifolds.into_iter().map(|m| ((g, c), m)).collect();
        let velocity = solve_body_velocity(&params, cube, &pairs, &bodies, &colliders).unwrap();
        // Stopping 1 m/s of approach buys at most 0.1 m/s of friction.
        assert!(velocity.linear.x > 9.8);
        assert!(velocity.linear.y > -0.05);
    }

    #[test]
    fn ball_joint_pulls_anchors_together() {
        let mut bodies = RigidBodySet::<Dim3>::new();
        let mut colliders = ColliderSet::new();
        let mut joints = JointSet::new();
        let anchor = bodies.insert(RigidBodyBuilder::fixed().build().unwrap());
        let bob = bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(Vec3::new(0.0, -1.0, 0.0))
                .linvel(Vec3::new(1.0, 0.0, 0.0))
                .build()
                .unwrap(),
        );
        colliders
            .insert(ColliderBuilder::ball(0.1).build().unwrap(), bob, &mut bodies)
            .unwrap();
        joints
            .insert(
                JointBuilder::ball()
                    .local_anchor2(Vec3::new(0.0, 1.0, 0.0))
                    .build(anchor, bob),
                &mut bodies,
            )
            .unwrap();

        let params = IntegrationParameters::default();
        let island = Island {
            bodies: vec![bob],
            contact_pairs: Vec::new(),
            joints: joints.iter().map(|(h, _)| h).collect(),
        };
        let mut narrow = NarrowPhase::new();
        solve_islands(&params, &[island], &mut bodies, &colliders, &mut narrow, &mut joints, false);

        let body = bodies.get(bob).unwrap();
        // The anchor point sits at the origin; its velocity must vanish.
        let anchor_velocity = body.velocity_at_point(body.position().transform_point(Vec3::new(0.0, 1.0, 0.0)));
        assert!(anchor_velocity.length() < 1e-3);
        let (_, joint) = joints.iter().next().unwrap();
        assert!(joint.impulses()[0].abs() > 0.0);
    }

    #[test]
    fn revolute_motor_spins_wheel() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let mut colliders = ColliderSet::new();
        let mut joints = JointSet::new();
        let frame = bodies.insert(RigidBodyBuilder::fixed().build().unwrap());
        let wheel = bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        colliders
            .insert(ColliderBuilder::ball(0.5).build().unwrap(), wheel, &mut bodies)
            .unwrap();
        joints
            .insert(
                JointBuilder::revolute(Vec2::X).motor(2.0, 1000.0).build(frame, wheel),
                &mut bodies,
            )
            .unwrap();
        let island = Island {
            bodies: vec![wheel],
            contact_pairs: Vec::new(),
            joints: joints.iter().map(|(h, _)| h).collect(),
        };
        let mut narrow = NarrowPhase::new();
        let params = IntegrationParameters::default();
        solve_islands(&params, &[island], &mut bodies, &colliders, &mut narrow, &mut joints, false);
        assert_relative_eq!(bodies.get(wheel).unwrap().angvel(), 2.0, epsilon = 1e-3);
        assert_relative_eq!(bodies.get(wheel).unwrap().linvel().length(), 0.0, epsilon = 1e-4);
    }
}
