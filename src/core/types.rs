use serde::{Deserialize, Serialize};

use crate::math::{Dim, Real, Vector};

/// Rigid pose: translation followed by rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Transform<D: Dim> {
    pub translation: D::Vector,
    pub rotation: D::Rotation,
}

impl<D: Dim> Default for Transform<D> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<D: Dim> Transform<D> {
    pub fn identity() -> Self {
        Self {
            translation: D::Vector::ZERO,
            rotation: D::identity_rotation(),
        }
    }

    pub fn new(translation: D::Vector, rotation: D::Rotation) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: D::Vector) -> Self {
        Self::new(translation, D::identity_rotation())
    }

    /// Applies `other` in the local frame of `self`, returning `self ∘ other`.
    pub fn combine(&self, other: &Transform<D>) -> Transform<D> {
        Transform {
            translation: self.translation + D::rotate(&self.rotation, other.translation),
            rotation: D::compose(&self.rotation, &other.rotation),
        }
    }

    pub fn inverse(&self) -> Transform<D> {
        let rotation = D::inverse_rotation(&self.rotation);
        Transform {
            translation: -D::rotate(&rotation, self.translation),
            rotation,
        }
    }

    pub fn transform_point(&self, point: D::Vector) -> D::Vector {
        self.translation + D::rotate(&self.rotation, point)
    }

    pub fn inverse_transform_point(&self, point: D::Vector) -> D::Vector {
        D::inverse_rotate(&self.rotation, point - self.translation)
    }

    pub fn transform_vector(&self, vector: D::Vector) -> D::Vector {
        D::rotate(&self.rotation, vector)
    }

    pub fn inverse_transform_vector(&self, vector: D::Vector) -> D::Vector {
        D::inverse_rotate(&self.rotation, vector)
    }

    /// Interpolates translation linearly and rotation spherically.
    pub fn interpolate(&self, other: &Transform<D>, t: Real) -> Transform<D> {
        Transform {
            translation: self.translation + (other.translation - self.translation) * t,
            rotation: D::slerp(&self.rotation, &other.rotation, t),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && D::rotation_is_finite(&self.rotation)
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Velocity<D: Dim> {
    pub linear: D::Vector,
    pub angular: D::Angular,
}

impl<D: Dim> Default for Velocity<D> {
    fn default() -> Self {
        Self {
            linear: D::Vector::ZERO,
            angular: D::Angular::ZERO,
        }
    }
}

impl<D: Dim> Velocity<D> {
    pub fn new(linear: D::Vector, angular: D::Angular) -> Self {
        Self { linear, angular }
    }

    /// Velocity of a point at lever arm `r` from the center of mass.
    pub fn at_point(&self, r: D::Vector) -> D::Vector {
        self.linear + D::angular_cross(self.angular, r)
    }

    pub fn is_finite(&self) -> bool {
        self.linear.is_finite() && self.angular.is_finite()
    }
}

/// Mass, local center of mass and inertia tensor about that center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MassProperties<D: Dim> {
    pub local_com: D::Vector,
    pub mass: Real,
    pub inertia: D::AngularInertia,
}

impl<D: Dim> Default for MassProperties<D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<D: Dim> MassProperties<D> {
    pub fn zero() -> Self {
        Self {
            local_com: D::Vector::ZERO,
            mass: 0.0,
            inertia: D::inertia_zero(),
        }
    }

    pub fn new(local_com: D::Vector, mass: Real, inertia: D::AngularInertia) -> Self {
        Self {
            local_com,
            mass,
            inertia,
        }
    }

    pub fn inv_mass(&self) -> Real {
        if self.mass > Real::EPSILON {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// Expresses these properties in the parent frame of `pose`.
    pub fn transformed(&self, pose: &Transform<D>) -> Self {
        Self {
            local_com: pose.transform_point(self.local_com),
            mass: self.mass,
            inertia: D::inertia_rotate(self.inertia, &pose.rotation),
        }
    }

    /// Sums two mass distributions expressed in the same frame (parallel-axis rule).
    pub fn combined(&self, other: &Self) -> Self {
        let mass = self.mass + other.mass;
        if mass <= Real::EPSILON {
            return Self::zero();
        }
        let com = (self.local_com * self.mass + other.local_com * other.mass) / mass;
        let shift_a = D::inertia_shift(self.mass, self.local_com - com);
        let shift_b = D::inertia_shift(other.mass, other.local_com - com);
        let inertia = D::inertia_add(
            D::inertia_add(self.inertia, shift_a),
            D::inertia_add(other.inertia, shift_b),
        );
        Self {
            local_com: com,
            mass,
            inertia,
        }
    }
}

/// Rule used to merge a material coefficient from two colliders.
///
/// When the two colliders disagree, the rule that comes last in declaration
/// order wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum CombineRule {
    #[default]
    Average,
    Min,
    Multiply,
    Max,
}

impl CombineRule {
    pub fn combine(self, a: Real, b: Real) -> Real {
        match self {
            CombineRule::Average => 0.5 * (a + b),
            CombineRule::Min => a.min(b),
            CombineRule::Multiply => a * b,
            CombineRule::Max => a.max(b),
        }
    }

    pub fn resolve(self, other: CombineRule) -> CombineRule {
        self.max(other)
    }
}

/// Surface and bulk coefficients of a collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub density: Real,
    pub friction: Real,
    pub restitution: Real,
    pub friction_combine_rule: CombineRule,
    pub restitution_combine_rule: CombineRule,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            friction: 0.5,
            restitution: 0.0,
            friction_combine_rule: CombineRule::Average,
            restitution_combine_rule: CombineRule::Average,
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            density: 1.4,
            friction: 1.0,
            restitution: 0.8,
            ..Default::default()
        }
    }

    pub fn steel() -> Self {
        Self {
            density: 7.8,
            friction: 0.44,
            restitution: 0.4,
            ..Default::default()
        }
    }

    pub fn ice() -> Self {
        Self {
            density: 0.9,
            friction: 0.03,
            restitution: 0.05,
            friction_combine_rule: CombineRule::Min,
            ..Default::default()
        }
    }

    pub fn combine_pair(a: &Self, b: &Self) -> MaterialPairProperties {
        let friction_rule = a.friction_combine_rule.resolve(b.friction_combine_rule);
        let restitution_rule = a.restitution_combine_rule.resolve(b.restitution_combine_rule);
        MaterialPairProperties {
            friction: friction_rule.combine(a.friction, b.friction),
            restitution: restitution_rule.combine(a.restitution, b.restitution),
        }
    }
}

/// Coefficients resolved for one contact pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MaterialPairProperties {
    pub friction: Real,
    pub restitution: Real,
}
