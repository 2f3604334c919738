use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::ops::Mul;

use super::{Dim, Real, Vector};
use crate::collision::{clipping, epa, gjk::SupportPoint};

impl Vector for Vec2 {
    const ZERO: Self = Vec2::ZERO;
    const DIM: usize = 2;

    fn splat(value: Real) -> Self {
        Vec2::splat(value)
    }

    fn dot(self, other: Self) -> Real {
        Vec2::dot(self, other)
    }

    fn component(self, index: usize) -> Real {
        self[index]
    }

    fn set_component(&mut self, index: usize, value: Real) {
        self[index] = value;
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
        Vec2::abs(self)
    }

    fn is_finite(self) -> bool {
        Vec2::is_finite(self)
    }
}

/// Unit complex number representing a planar rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot2 {
    pub cos: Real,
    pub sin: Real,
}

impl Default for Rot2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot2 {
    pub const IDENTITY: Self = Self { cos: 1.0, sin: 0.0 };

    pub fn from_angle(angle: Real) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self { cos, sin }
    }

    /// Angle in `(-π, π]`.
    pub fn angle(&self) -> Real {
        self.sin.atan2(self.cos)
    }

    pub fn inverse(&self) -> Self {
        Self {
            cos: self.cos,
            sin: -self.sin,
        }
    }

    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x - self.sin * v.y, self.sin * v.x + self.cos * v.y)
    }

    pub fn inverse_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x + self.sin * v.y, -self.sin * v.x + self.cos * v.y)
    }

    pub fn normalize(&self) -> Self {
        let length = (self.cos * self.cos + self.sin * self.sin).sqrt();
        if length > Real::EPSILON {
            Self {
                cos: self.cos / length,
                sin: self.sin / length,
            }
        } else {
            Self::IDENTITY
        }
    }
}

impl Mul for Rot2 {
    type Output = Rot2;

    fn mul(self, rhs: Rot2) -> Rot2 {
        Rot2 {
            cos: self.cos * rhs.cos - self.sin * rhs.sin,
            sin: self.sin * rhs.cos + self.cos * rhs.sin,
        }
    }
}

fn wrap_angle(angle: Real) -> Real {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped <= -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}

/// Planar instantiation: `Vec2` positions, scalar angular quantities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim2;

impl Dim for Dim2 {
    const DIM: usize = 2;
    const ANG_DIM: usize = 1;
    const TANGENTS: usize = 1;
    const TAG: u8 = 2;
    const MAX_MANIFOLD_POINTS: usize = 2;

    type Vector = Vec2;
    type Angular = Real;
    type Rotation = Rot2;
    type AngularInertia = Real;
    type Element = [u32; 2];

    fn basis(index: usize) -> Vec2 {
        if index == 0 {
            Vec2::X
        } else {
            Vec2::Y
        }
    }

    fn angular_basis(_index: usize) -> Real {
        1.0
    }

    fn tangents(normal: Vec2) -> [Vec2; 2] {
        [normal.perp(), Vec2::ZERO]
    }

    fn cross(a: Vec2, b: Vec2) -> Real {
        a.perp_dot(b)
    }

    fn angular_cross(w: Real, r: Vec2) -> Vec2 {
        Vec2::new(-w * r.y, w * r.x)
    }

    fn identity_rotation() -> Rot2 {
        Rot2::IDENTITY
    }

    fn rotate(rot: &Rot2, v: Vec2) -> Vec2 {
        rot.rotate(v)
    }

    fn inverse_rotate(rot: &Rot2, v: Vec2) -> Vec2 {
        rot.inverse_rotate(v)
    }

    fn rotate_angular(_rot: &Rot2, w: Real) -> Real {
        w
    }

    fn inverse_rotate_angular(_rot: &Rot2, w: Real) -> Real {
        w
    }

    fn compose(a: &Rot2, b: &Rot2) -> Rot2 {
        (*a * *b).normalize()
    }

    fn inverse_rotation(rot: &Rot2) -> Rot2 {
        rot.inverse()
    }

    fn integrate_rotation(rot: &Rot2, w: Real, dt: Real) -> Rot2 {
        (Rot2::from_angle(w * dt) * *rot).normalize()
    }

    fn rotation_vector(rot: &Rot2) -> Real {
        rot.angle()
    }

    fn from_rotation_vector(w: Real) -> Rot2 {
        Rot2::from_angle(w)
    }

    fn slerp(a: &Rot2, b: &Rot2, t: Real) -> Rot2 {
        let start = a.angle();
        let delta = wrap_angle(b.angle() - start);
        Rot2::from_angle(start + delta * t)
    }

    fn rotation_is_finite(rot: &Rot2) -> bool {
        rot.cos.is_finite() && rot.sin.is_finite()
    }

    fn rotation_between(from: Vec2, to: Vec2) -> Rot2 {
        Rot2::from_angle(from.perp_dot(to).atan2(from.dot(to)))
    }

    fn hinge_axis(_axis: Vec2) -> Real {
        1.0
    }

    fn hinge_locked_axes(_axis: Vec2) -> Vec<Real> {
        Vec::new()
    }

    fn inertia_zero() -> Real {
        0.0
    }

    fn inertia_add(a: Real, b: Real) -> Real {
        a + b
    }

    fn inertia_scale(a: Real, s: Real) -> Real {
        a * s
    }

    fn inertia_inverse(a: Real) -> Real {
        if a > Real::EPSILON {
            1.0 / a
        } else {
            0.0
        }
    }

    fn inertia_mul(a: Real, w: Real) -> Real {
        a * w
    }

    fn inertia_rotate(a: Real, _rot: &Rot2) -> Real {
        a
    }

    fn inertia_shift(mass: Real, offset: Vec2) -> Real {
        mass * offset.length_squared()
    }

    fn ball_volume(radius: Real) -> Real {
        PI * radius * radius
    }

    fn ball_inertia(radius: Real, mass: Real) -> Real {
        0.5 * mass * radius * radius
    }

    fn cuboid_inertia(half_extents: Vec2, mass: Real) -> Real {
        mass * (half_extents.x * half_extents.x + half_extents.y * half_extents.y) / 3.0
    }

    fn capsule_volume(half_height: Real, radius: Real) -> Real {
        4.0 * half_height * radius + PI * radius * radius
    }

    fn capsule_inertia(half_height: Real, radius: Real, mass: Real) -> Real {
        let rect_volume = 4.0 * half_height * radius;
        let disc_volume = PI * radius * radius;
        let total = rect_volume + disc_volume;
        if total <= Real::EPSILON {
            return 0.0;
        }
        let rect_mass = mass * rect_volume / total;
        let disc_mass = mass * disc_volume / total;
        let rect = rect_mass * (radius * radius + half_height * half_height) / 3.0;
        let caps = disc_mass * (0.5 * radius * radius + half_height * half_height);
        rect + caps
    }

    fn epa<F>(simplex: &[SupportPoint<Self>], support: F) -> Option<(Vec2, Real)>
    where
        F: Fn(Vec2) -> SupportPoint<Self>,
    {
        epa::epa_2d(simplex, support)
    }

    fn clip_features(reference: &[Vec2], incident: &[Vec2], normal: Vec2) -> Vec<(Vec2, u32)> {
        clipping::clip_segment(reference, incident, normal)
    }

    fn heightfield_mesh(
        heights: &[Real],
        _nrows: usize,
        ncols: usize,
        scale: Vec2,
    ) -> (Vec<Vec2>, Vec<[u32; 2]>) {
        let samples = (ncols + 1).min(heights.len());
        let vertices: Vec<Vec2> = heights
            .iter()
            .take(samples)
            .enumerate()
            .map(|(i, height)| {
                let x = (i as Real / ncols.max(1) as Real - 0.5) * scale.x;
                Vec2::new(x, height * scale.y)
            })
            .collect();
        let segments = (1..vertices.len())
            .map(|i| [i as u32 - 1, i as u32])
            .collect();
        (vertices, segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_round_trips_through_angle() {
        let rot = Rot2::from_angle(0.75);
        assert_relative_eq!(rot.angle(), 0.75, epsilon = 1e-6);
        let v = Vec2::new(1.0, 2.0);
        let back = rot.inverse_rotate(rot.rotate(v));
        assert_relative_eq!(back.x, v.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, v.y, epsilon = 1e-5);
    }

    #[test]
    fn slerp_takes_the_short_way_around() {
        let a = Rot2::from_angle(3.0);
        let b = Rot2::from_angle(-3.0);
        let mid = Dim2::slerp(&a, &b, 0.5);
        assert_relative_eq!(mid.angle().abs(), PI, epsilon = 1e-4);
    }

    #[test]
    fn angular_cross_matches_perpendicular_velocity() {
        let v = Dim2::angular_cross(2.0, Vec2::new(1.0, 0.0));
        assert_relative_eq!(v.x, 0.0);
        assert_relative_eq!(v.y, 2.0);
        assert_relative_eq!(Dim2::cross(Vec2::X, Vec2::Y), 1.0);
    }

    #[test]
    fn heightfield_produces_connected_segments() {
        let (vertices, segments) = Dim2::heightfield_mesh(&[0.0, 1.0, 0.0], 0, 2, Vec2::new(4.0, 1.0));
        assert_eq!(vertices.len(), 3);
        assert_eq!(segments, vec![[0, 1], [1, 2]]);
        assert_relative_eq!(vertices[0].x, -2.0);
        assert_relative_eq!(vertices[2].x, 2.0);
    }
}
