use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{Dim, Real, Vector};
use crate::utils::allocator::{Arena, JointHandle, RigidBodyHandle};

use super::rigidbody::RigidBodySet;
use super::types::Transform;

/// Allowed range of the free coordinate (translation or angle).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub min: Real,
    pub max: Real,
}

/// Velocity motor driving the free coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointMotor {
    pub target_velocity: Real,
    pub max_force: Real,
}

/// Degrees of freedom removed by a joint. The free axis of prismatic and
/// revolute joints is the X axis of the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointKind {
    /// Anchors coincide; rotation is free.
    Ball,
    /// Anchors and orientations locked.
    Fixed,
    /// Relative translation along the axis only.
    Prismatic {
        limits: Option<JointLimits>,
        motor: Option<JointMotor>,
    },
    /// Relative rotation about the axis only.
    Revolute {
        limits: Option<JointLimits>,
        motor: Option<JointMotor>,
    },
}

impl JointKind {
    pub fn limits(&self) -> Option<JointLimits> {
        match self {
            JointKind::Prismatic { limits, .. } | JointKind::Revolute { limits, .. } => *limits,
            _ => None,
        }
    }

    pub fn motor(&self) -> Option<JointMotor> {
        match self {
            JointKind::Prismatic { motor, .. } | JointKind::Revolute { motor, .. } => *motor,
            _ => None,
        }
    }
}

/// Number of accumulated impulse slots: locked linear axes, locked angular axes, limit, motor.
pub(crate) fn impulse_slots<D: Dim>() -> usize {
    D::DIM + D::ANG_DIM + 2
}

/// Constraint between two bodies, each described by a frame in its body space.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Joint<D: Dim> {
    pub body1: RigidBodyHandle,
    pub body2: RigidBodyHandle,
    pub kind: JointKind,
    pub local_frame1: Transform<D>,
    pub local_frame2: Transform<D>,
    pub(crate) impulses: Vec<Real>,
}

impl<D: Dim> Joint<D> {
    pub fn new(
        body1: RigidBodyHandle,
        body2: RigidBodyHandle,
        kind: JointKind,
        local_frame1: Transform<D>,
        local_frame2: Transform<D>,
    ) -> Self {
        Self {
            body1,
            body2,
            kind,
            local_frame1,
            local_frame2,
            impulses: vec![0.0; impulse_slots::<D>()],
        }
    }

    /// Impulses accumulated during the last step, one slot per constraint row.
    pub fn impulses(&self) -> &[Real] {
        &self.impulses
    }

    fn validate(&self) -> PhysicsResult<()> {
        if self.body1 == self.body2 {
            return Err(PhysicsError::DegenerateInput(
                "a joint needs two distinct bodies".to_string(),
            ));
        }
        if !self.local_frame1.is_finite() || !self.local_frame2.is_finite() {
            return Err(PhysicsError::DegenerateInput(
                "joint frames must be finite".to_string(),
            ));
        }
        if let Some(limits) = self.kind.limits() {
            if !(limits.min.is_finite() && limits.max.is_finite() && limits.min <= limits.max) {
                return Err(PhysicsError::DegenerateInput(format!(
                    "invalid joint limits {limits:?}"
                )));
            }
        }
        if let Some(motor) = self.kind.motor() {
            if !motor.target_velocity.is_finite() || !motor.max_force.is_finite() || motor.max_force < 0.0 {
                return Err(PhysicsError::DegenerateInput(format!(
                    "invalid joint motor {motor:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Descriptor used to create a [`Joint`].
#[derive(Debug, Clone)]
pub struct JointBuilder<D: Dim> {
    kind: JointKind,
    frame1: Transform<D>,
    frame2: Transform<D>,
}

impl<D: Dim> JointBuilder<D> {
    fn new(kind: JointKind) -> Self {
        Self {
            kind,
            frame1: Transform::identity(),
            frame2: Transform::identity(),
        }
    }

    pub fn ball() -> Self {
        Self::new(JointKind::Ball)
    }

    pub fn fixed() -> Self {
        Self::new(JointKind::Fixed)
    }

    /// Slider along `axis`, given in both body frames.
    pub fn prismatic(axis: D::Vector) -> Self {
        Self::new(JointKind::Prismatic {
            limits: None,
            motor: None,
        })
        .axis(axis)
    }

    /// Hinge about `axis`, given in both body frames. The axis is ignored in 2D.
    pub fn revolute(axis: D::Vector) -> Self {
        Self::new(JointKind::Revolute {
            limits: None,
            motor: None,
        })
        .axis(axis)
    }

    fn axis(mut self, axis: D::Vector) -> Self {
        let rotation = D::rotation_between(D::basis(0), axis.normalize_or_zero());
        self.frame1.rotation = rotation;
        self.frame2.rotation = rotation;
        self
    }

    pub fn local_anchor1(mut self, anchor: D::Vector) -> Self {
        self.frame1.translation = anchor;
        self
    }

    pub fn local_anchor2(mut self, anchor: D::Vector) -> Self {
        self.frame2.translation = anchor;
        self
    }

    pub fn local_frame1(mut self, frame: Transform<D>) -> Self {
        self.frame1 = frame;
        self
    }

    pub fn local_frame2(mut self, frame: Transform<D>) -> Self {
        self.frame2 = frame;
        self
    }

    /// Limits on the free coordinate; ignored by ball and fixed joints.
    pub fn limits(mut self, min: Real, max: Real) -> Self {
        let new_limits = Some(JointLimits { min, max });
        match &mut self.kind {
            JointKind::Prismatic { limits, .. } | JointKind::Revolute { limits, .. } => *limits = new_limits,
            _ => {}
        }
        self
    }

    /// Motor on the free coordinate; ignored by ball and fixed joints.
    pub fn motor(mut self, target_velocity: Real, max_force: Real) -> Self {
        let new_motor = Some(JointMotor {
            target_velocity,
            max_force,
        });
        match &mut self.kind {
            JointKind::Prismatic { motor, .. } | JointKind::Revolute { motor, .. } => *motor = new_motor,
            _ => {}
        }
        self
    }

    pub fn build(self, body1: RigidBodyHandle, body2: RigidBodyHandle) -> Joint<D> {
        Joint::new(body1, body2, self.kind, self.frame1, self.frame2)
    }
}

/// Generational storage of joints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct JointSet<D: Dim> {
    joints: Arena<Joint<D>>,
}

impl<D: Dim> Default for JointSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> JointSet<D> {
    pub fn new() -> Self {
        Self {
            joints: Arena::new(),
        }
    }

    /// Inserts a joint between two live bodies and wakes them.
    pub fn insert(&mut self, joint: Joint<D>, bodies: &mut RigidBodySet<D>) -> PhysicsResult<JointHandle> {
        joint
            .validate()
            .inspect_err(|err| log::warn!("rejected joint: {err}"))?;
        if !bodies.contains(joint.body1) || !bodies.contains(joint.body2) {
            return Err(PhysicsError::InvalidHandle);
        }
        for body in [joint.body1, joint.body2] {
            if let Some(body) = bodies.get_mut(body) {
                body.wake_up();
            }
        }
        let mut joint = joint;
        joint.impulses = vec![0.0; impulse_slots::<D>()];
        Ok(JointHandle(self.joints.insert(joint)))
    }

    pub fn remove(
        &mut self,
        handle: JointHandle,
        bodies: &mut RigidBodySet<D>,
        wake_up: bool,
    ) -> Option<Joint<D>> {
        let joint = self.joints.remove(handle.0)?;
        if wake_up {
            for body in [joint.body1, joint.body2] {
                if let Some(body) = bodies.get_mut(body) {
                    body.wake_up();
                }
            }
        }
        Some(joint)
    }

    pub(crate) fn remove_detached(&mut self, handle: JointHandle) -> Option<Joint<D>> {
        self.joints.remove(handle.0)
    }

    pub fn get(&self, handle: JointHandle) -> Option<&Joint<D>> {
        self.joints.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: JointHandle) -> Option<&mut Joint<D>> {
        self.joints.get_mut(handle.0)
    }

    pub fn contains(&self, handle: JointHandle) -> bool {
        self.joints.contains(handle.0)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointHandle, &Joint<D>)> + '_ {
        self.joints.iter().map(|(id, joint)| (JointHandle(id), joint))
    }

    /// Joints with `body` as one of their endpoints.
    pub fn attached_to(&self, body: RigidBodyHandle) -> Vec<JointHandle> {
        self.iter()
            .filter(|(_, joint)| joint.body1 == body || joint.body2 == body)
            .map(|(handle, _)| handle)
            .collect()
    }
}
