//! Dimension abstraction layered on top of `glam`.
//!
//! Every simulation type is generic over a [`Dim`] implementation. [`Dim2`] and
//! [`Dim3`] are the two instantiations: they pick the vector, angular, rotation
//! and inertia representations, and provide the handful of operations whose
//! formula depends on the dimension (cross products, rotation exponential map,
//! inertia tensors, EPA and face clipping).

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use serde::{de::DeserializeOwned, Serialize};

use crate::collision::gjk::SupportPoint;

mod dim2;
mod dim3;

pub use dim2::{Dim2, Rot2};
pub use dim3::Dim3;

/// Scalar type used throughout the engine.
pub type Real = f32;

/// Minimal vector-space capability set shared by `Vec2`, `Vec3` and the scalar
/// angular quantities of the 2D instantiation.
pub trait Vector:
    Copy
    + Debug
    + PartialEq
    + Default
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Real, Output = Self>
    + Div<Real, Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign<Real>
    + Serialize
    + DeserializeOwned
{
    const ZERO: Self;
    const DIM: usize;

    fn splat(value: Real) -> Self;
    fn dot(self, other: Self) -> Real;
    fn component(self, index: usize) -> Real;
    fn set_component(&mut self, index: usize, value: Real);
    fn component_min(self, other: Self) -> Self;
    fn component_max(self, other: Self) -> Self;
    fn component_mul(self, other: Self) -> Self;
    fn abs(self) -> Self;
    fn is_finite(self) -> bool;

    fn length_squared(self) -> Real {
        self.dot(self)
    }

    fn length(self) -> Real {
        self.dot(self).sqrt()
    }

    fn normalize_or_zero(self) -> Self {
        let length = self.length();
        if length > Real::EPSILON {
            self / length
        } else {
            Self::ZERO
        }
    }

    fn max_element(self) -> Real {
        (0..Self::DIM)
            .map(|i| self.component(i))
            .fold(Real::NEG_INFINITY, Real::max)
    }

    fn min_element(self) -> Real {
        (0..Self::DIM)
            .map(|i| self.component(i))
            .fold(Real::INFINITY, Real::min)
    }
}

impl Vector for Real {
    const ZERO: Self = 0.0;
    const DIM: usize = 1;

    fn splat(value: Real) -> Self {
        value
    }

    fn dot(self, other: Self) -> Real {
        self * other
    }

    fn component(self, _index: usize) -> Real {
        self
    }

    fn set_component(&mut self, _index: usize, value: Real) {
        *self = value;
    }

    fn component_min(self, other: Self) -> Self {
        self.min(other)
    }

    fn component_max(self, other: Self) -> Self {
        self.max(other)
    }

    fn component_mul(self, other: Self) -> Self {
        self * other
    }

    fn abs(self) -> Self {
        Real::abs(self)
    }

    fn is_finite(self) -> bool {
        Real::is_finite(self)
    }

    fn length(self) -> Real {
        Real::abs(self)
    }

    fn normalize_or_zero(self) -> Self {
        if Real::abs(self) > Real::EPSILON {
            self.signum()
        } else {
            0.0
        }
    }
}

/// Marker trait for serializable, thread-safe plain values.
pub trait Value: Copy + Debug + PartialEq + Send + Sync + 'static + Serialize + DeserializeOwned {}

impl<T> Value for T where T: Copy + Debug + PartialEq + Send + Sync + 'static + Serialize + DeserializeOwned {}

/// Compile-time selection of the simulation dimension.
pub trait Dim: Copy + Debug + Default + PartialEq + Eq + Send + Sync + 'static {
    /// Number of linear degrees of freedom.
    const DIM: usize;
    /// Number of angular degrees of freedom.
    const ANG_DIM: usize;
    /// Number of friction directions orthogonal to a contact normal.
    const TANGENTS: usize;
    /// Dimension tag written into snapshots.
    const TAG: u8;
    /// Maximum number of points kept in one contact manifold.
    const MAX_MANIFOLD_POINTS: usize;

    type Vector: Vector;
    type Angular: Vector;
    type Rotation: Value;
    type AngularInertia: Value;
    /// Vertex indices of one mesh element (segment in 2D, triangle in 3D).
    type Element: Value + AsRef<[u32]> + AsMut<[u32]>;

    fn basis(index: usize) -> Self::Vector;
    fn angular_basis(index: usize) -> Self::Angular;
    /// Unit directions orthogonal to `normal`; only the first `TANGENTS` are meaningful.
    fn tangents(normal: Self::Vector) -> [Self::Vector; 2];
    /// `a × b`, the angular quantity produced by a lever arm and a force.
    fn cross(a: Self::Vector, b: Self::Vector) -> Self::Angular;
    /// `ω × r`, the linear velocity induced at lever arm `r`.
    fn angular_cross(w: Self::Angular, r: Self::Vector) -> Self::Vector;

    fn identity_rotation() -> Self::Rotation;
    fn rotate(rot: &Self::Rotation, v: Self::Vector) -> Self::Vector;
    fn inverse_rotate(rot: &Self::Rotation, v: Self::Vector) -> Self::Vector;
    fn rotate_angular(rot: &Self::Rotation, w: Self::Angular) -> Self::Angular;
    fn inverse_rotate_angular(rot: &Self::Rotation, w: Self::Angular) -> Self::Angular;
    fn compose(a: &Self::Rotation, b: &Self::Rotation) -> Self::Rotation;
    fn inverse_rotation(rot: &Self::Rotation) -> Self::Rotation;
    /// Exponential map of `w * dt` applied on the left of `rot`.
    fn integrate_rotation(rot: &Self::Rotation, w: Self::Angular, dt: Real) -> Self::Rotation;
    /// Logarithm map: the shortest rotation vector (axis * angle) of `rot`.
    fn rotation_vector(rot: &Self::Rotation) -> Self::Angular;
    fn from_rotation_vector(w: Self::Angular) -> Self::Rotation;
    fn slerp(a: &Self::Rotation, b: &Self::Rotation, t: Real) -> Self::Rotation;
    fn rotation_is_finite(rot: &Self::Rotation) -> bool;
    /// Shortest rotation taking unit vector `from` onto unit vector `to`.
    fn rotation_between(from: Self::Vector, to: Self::Vector) -> Self::Rotation;

    /// Angular direction of a hinge whose axis is `axis`.
    fn hinge_axis(axis: Self::Vector) -> Self::Angular;
    /// Angular directions a hinge about `axis` keeps locked.
    fn hinge_locked_axes(axis: Self::Vector) -> Vec<Self::Angular>;

    fn inertia_zero() -> Self::AngularInertia;
    fn inertia_add(a: Self::AngularInertia, b: Self::AngularInertia) -> Self::AngularInertia;
    fn inertia_scale(a: Self::AngularInertia, s: Real) -> Self::AngularInertia;
    fn inertia_inverse(a: Self::AngularInertia) -> Self::AngularInertia;
    fn inertia_mul(a: Self::AngularInertia, w: Self::Angular) -> Self::Angular;
    /// `R · I · Rᵀ`.
    fn inertia_rotate(a: Self::AngularInertia, rot: &Self::Rotation) -> Self::AngularInertia;
    /// Parallel-axis term for a point mass at `offset`.
    fn inertia_shift(mass: Real, offset: Self::Vector) -> Self::AngularInertia;

    fn ball_volume(radius: Real) -> Real;
    fn ball_inertia(radius: Real, mass: Real) -> Self::AngularInertia;
    fn cuboid_inertia(half_extents: Self::Vector, mass: Real) -> Self::AngularInertia;
    fn capsule_volume(half_height: Real, radius: Real) -> Real;
    fn capsule_inertia(half_height: Real, radius: Real, mass: Real) -> Self::AngularInertia;

    /// Penetration normal and depth of a Minkowski difference whose simplex encloses the origin.
    fn epa<F>(simplex: &[SupportPoint<Self>], support: F) -> Option<(Self::Vector, Real)>
    where
        F: Fn(Self::Vector) -> SupportPoint<Self>;

    /// Clips the incident feature against the side planes of the reference feature.
    /// Returned points lie on the incident feature and carry a stable feature id.
    fn clip_features(
        reference: &[Self::Vector],
        incident: &[Self::Vector],
        normal: Self::Vector,
    ) -> Vec<(Self::Vector, u32)>;

    /// Tessellates a height grid into mesh vertices and elements.
    fn heightfield_mesh(
        heights: &[Real],
        nrows: usize,
        ncols: usize,
        scale: Self::Vector,
    ) -> (Vec<Self::Vector>, Vec<Self::Element>);

    /// Integer grid cell containing `point`; unused trailing coordinates stay zero.
    fn grid_cell(point: Self::Vector, cell_size: Real) -> [i32; 3] {
        let mut cell = [0; 3];
        for (axis, slot) in cell.iter_mut().enumerate().take(Self::DIM) {
            *slot = (point.component(axis) / cell_size).floor() as i32;
        }
        cell
    }
}

