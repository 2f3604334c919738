use crate::core::rigidbody::{RigidBody, RigidBodySet};
use crate::math::{Dim, Real, Vector};
use crate::utils::allocator::RigidBodyHandle;

/// External force source evaluated at the start of every step.
pub trait ForceGenerator<D: Dim>: Send + Sync {
    fn apply(&self, handle: RigidBodyHandle, body: &mut RigidBody<D>, dt: Real);
}

/// Quadratic drag resisting the direction of motion.
#[derive(Debug, Clone, Copy)]
pub struct DragForce {
    pub drag_coefficient: Real,
}

impl DragForce {
    pub fn new(drag_coefficient: Real) -> Self {
        Self { drag_coefficient }
    }
}

impl<D: Dim> ForceGenerator<D> for DragForce {
    fn apply(&self, _handle: RigidBodyHandle, body: &mut RigidBody<D>, _dt: Real) {
        let velocity = body.linvel();
        let speed = velocity.length();
        if speed < 1e-6 {
            return;
        }
        body.apply_force(-velocity * (speed * self.drag_coefficient), false);
    }
}

/// Damped Hookean spring tying a point of one body to a fixed world anchor.
#[derive(Debug, Clone, Copy)]
pub struct SpringForce<D: Dim> {
    pub body: RigidBodyHandle,
    pub anchor: D::Vector,
    /// Attachment point in the body frame.
    pub local_attach: D::Vector,
    pub rest_length: Real,
    pub stiffness: Real,
    pub damping: Real,
}

impl<D: Dim> SpringForce<D> {
    pub fn new(body: RigidBodyHandle, anchor: D::Vector, rest_length: Real, stiffness: Real) -> Self {
        Self {
            body,
            anchor,
            local_attach: D::Vector::ZERO,
            rest_length,
            stiffness,
            damping: 0.0,
        }
    }

    pub fn with_damping(mut self, damping: Real) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_local_attach(mut self, local_attach: D::Vector) -> Self {
        self.local_attach = local_attach;
        self
    }
}

impl<D: Dim> ForceGenerator<D> for SpringForce<D> {
    fn apply(&self, handle: RigidBodyHandle, body: &mut RigidBody<D>, _dt: Real) {
        if handle != self.body {
            return;
        }
        let attach = body.position().transform_point(self.local_attach);
        let displacement = attach - self.anchor;
        let distance = displacement.length();
        if distance < 1e-6 {
            return;
        }
        let direction = displacement / distance;
        let extension = distance - self.rest_length;
        let speed = body.velocity_at_point(attach).dot(direction);
        let magnitude = -self.stiffness * extension - self.damping * speed;
        body.apply_force_at_point(direction * magnitude, attach, false);
    }
}

/// Force generators applied to every awake dynamic body each step.
#[derive(Default)]
pub struct ForceRegistry<D: Dim> {
    forces: Vec<Box<dyn ForceGenerator<D>>>,
}

impl<D: Dim> ForceRegistry<D> {
    pub fn new() -> Self {
        Self { forces: Vec::new() }
    }

    pub fn add_force<F: ForceGenerator<D> + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn clear(&mut self) {
        self.forces.clear();
    }

    pub fn apply_all(&self, bodies: &mut RigidBodySet<D>, dt: Real) {
        if self.forces.is_empty() {
            return;
        }
        for (handle, body) in bodies.iter_mut() {
            if !body.is_dynamic() || body.is_sleeping() {
                continue;
            }
            for force in &self.forces {
                force.apply(handle, body, dt);
            }
        }
    }
}

impl<D: Dim> std::fmt::Debug for ForceRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceRegistry")
            .field("forces", &self.forces.len())
            .finish()
    }
}
