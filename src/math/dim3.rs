use glam::{Mat3, Quat, Vec3};
use std::f32::consts::PI;

use super::{Dim, Real, Vector};
use crate::collision::{clipping, epa, gjk::SupportPoint};

impl Vector for Vec3 {
    const ZERO: Self = Vec3::ZERO;
    const DIM: usize = 3;

    fn splat(value: Real) -> Self {
        Vec3::splat(value)
    }

    fn dot(self, other: Self) -> Real {
        Vec3::dot(self, other)
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
        Vec3::abs(self)
    }

    fn is_finite(self) -> bool {
        Vec3::is_finite(self)
    }
}

fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Spatial instantiation: `Vec3` positions, quaternion rotations, 3x3 inertia tensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim3;

impl Dim for Dim3 {
    const DIM: usize = 3;
    const ANG_DIM: usize = 3;
    const TANGENTS: usize = 2;
    const TAG: u8 = 3;
    const MAX_MANIFOLD_POINTS: usize = 4;

    type Vector = Vec3;
    type Angular = Vec3;
    type Rotation = Quat;
    type AngularInertia = Mat3;
    type Element = [u32; 3];

    fn basis(index: usize) -> Vec3 {
        match index {
            0 => Vec3::X,
            1 => Vec3::Y,
            _ => Vec3::Z,
        }
    }

    fn angular_basis(index: usize) -> Vec3 {
        Self::basis(index)
    }

    fn tangents(normal: Vec3) -> [Vec3; 2] {
        let n = normal.normalize_or(Vec3::Y);
        let (t1, t2) = n.any_orthonormal_pair();
        [t1, t2]
    }

    fn cross(a: Vec3, b: Vec3) -> Vec3 {
        a.cross(b)
    }

    fn angular_cross(w: Vec3, r: Vec3) -> Vec3 {
        w.cross(r)
    }

    fn identity_rotation() -> Quat {
        Quat::IDENTITY
    }

    fn rotate(rot: &Quat, v: Vec3) -> Vec3 {
        *rot * v
    }

    fn inverse_rotate(rot: &Quat, v: Vec3) -> Vec3 {
        rot.inverse() * v
    }

    fn rotate_angular(rot: &Quat, w: Vec3) -> Vec3 {
        *rot * w
    }

    fn inverse_rotate_angular(rot: &Quat, w: Vec3) -> Vec3 {
        rot.inverse() * w
    }

    fn compose(a: &Quat, b: &Quat) -> Quat {
        (*a * *b).normalize()
    }

    fn inverse_rotation(rot: &Quat) -> Quat {
        rot.inverse()
    }

    fn integrate_rotation(rot: &Quat, w: Vec3, dt: Real) -> Quat {
        (Quat::from_scaled_axis(w * dt) * *rot).normalize()
    }

    fn rotation_vector(rot: &Quat) -> Vec3 {
        let shortest = if rot.w < 0.0 { -*rot } else { *rot };
        shortest.to_scaled_axis()
    }

    fn from_rotation_vector(w: Vec3) -> Quat {
        Quat::from_scaled_axis(w)
    }

    fn slerp(a: &Quat, b: &Quat, t: Real) -> Quat {
        a.slerp(*b, t).normalize()
    }

    fn rotation_is_finite(rot: &Quat) -> bool {
        rot.is_finite()
    }

    fn rotation_between(from: Vec3, to: Vec3) -> Quat {
        Quat::from_rotation_arc(from.normalize_or(Vec3::X), to.normalize_or(Vec3::X))
    }

    fn hinge_axis(axis: Vec3) -> Vec3 {
        axis.normalize_or(Vec3::X)
    }

    fn hinge_locked_axes(axis: Vec3) -> Vec<Vec3> {
        Self::tangents(axis).to_vec()
    }

    fn inertia_zero() -> Mat3 {
        Mat3::ZERO
    }

    fn inertia_add(a: Mat3, b: Mat3) -> Mat3 {
        a + b
    }

    fn inertia_scale(a: Mat3, s: Real) -> Mat3 {
        a * s
    }

    fn inertia_inverse(a: Mat3) -> Mat3 {
        let det = a.determinant();
        if det.abs() > Real::EPSILON {
            a.inverse()
        } else {
            // Only diagonal entries can be inverted independently.
            let diag = Vec3::new(a.x_axis.x, a.y_axis.y, a.z_axis.z);
            let inv = Vec3::new(
                Self::inertia_inverse_scalar(diag.x),
                Self::inertia_inverse_scalar(diag.y),
                Self::inertia_inverse_scalar(diag.z),
            );
            Mat3::from_diagonal(inv)
        }
    }

    fn inertia_mul(a: Mat3, w: Vec3) -> Vec3 {
        a * w
    }

    fn inertia_rotate(a: Mat3, rot: &Quat) -> Mat3 {
        let r = Mat3::from_quat(*rot);
        r * a * r.transpose()
    }

    fn inertia_shift(mass: Real, offset: Vec3) -> Mat3 {
        (Mat3::from_diagonal(Vec3::splat(offset.length_squared())) - outer(offset, offset)) * mass
    }

    fn ball_volume(radius: Real) -> Real {
        4.0 / 3.0 * PI * radius * radius * radius
    }

    fn ball_inertia(radius: Real, mass: Real) -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius))
    }

    fn cuboid_inertia(half_extents: Vec3, mass: Real) -> Mat3 {
        let size = half_extents * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (size.y * size.y + size.z * size.z),
            factor * (size.x * size.x + size.z * size.z),
            factor * (size.x * size.x + size.y * size.y),
        ))
    }

    fn capsule_volume(half_height: Real, radius: Real) -> Real {
        PI * radius * radius * 2.0 * half_height + Self::ball_volume(radius)
    }

    fn capsule_inertia(half_height: Real, radius: Real, mass: Real) -> Mat3 {
        let cylinder_volume = PI * radius * radius * 2.0 * half_height;
        let sphere_volume = Self::ball_volume(radius);
        let total = cylinder_volume + sphere_volume;
        if total <= Real::EPSILON {
            return Mat3::ZERO;
        }
        let cylinder_mass = mass * cylinder_volume / total;
        let sphere_mass = mass * sphere_volume / total;
        let height = 2.0 * half_height;
        let r2 = radius * radius;

        let axial = 0.5 * cylinder_mass * r2 + 0.4 * sphere_mass * r2;
        let transverse = cylinder_mass * (3.0 * r2 + height * height) / 12.0
            + sphere_mass * (0.4 * r2 + half_height * half_height + 0.375 * half_height * radius);
        Mat3::from_diagonal(Vec3::new(transverse, axial, transverse))
    }

    fn epa<F>(simplex: &[SupportPoint<Self>], support: F) -> Option<(Vec3, Real)>
    where
        F: Fn(Vec3) -> SupportPoint<Self>,
    {
        epa::epa_3d(simplex, support)
    }

    fn clip_features(reference: &[Vec3], incident: &[Vec3], normal: Vec3) -> Vec<(Vec3, u32)> {
        clipping::clip_face(reference, incident, normal)
    }

    fn heightfield_mesh(
        heights: &[Real],
        nrows: usize,
        ncols: usize,
        scale: Vec3,
    ) -> (Vec<Vec3>, Vec<[u32; 3]>) {
        let rows = nrows + 1;
        let cols = ncols + 1;
        let mut vertices = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let height = heights.get(row * cols + col).copied().unwrap_or(0.0);
                vertices.push(Vec3::new(
                    (col as Real / ncols.max(1) as Real - 0.5) * scale.x,
                    height * scale.y,
                    (row as Real / nrows.max(1) as Real - 0.5) * scale.z,
                ));
            }
        }

        let mut triangles = Vec::with_capacity(nrows * ncols * 2);
        for row in 0..nrows {
            for col in 0..ncols {
                let a = (row * cols + col) as u32;
                let b = a + 1;
                let c = a + cols as u32;
                let d = c + 1;
                triangles.push([a, c, b]);
                triangles.push([b, c, d]);
            }
        }
        (vertices, triangles)
    }
}

impl Dim3 {
    fn inertia_inverse_scalar(value: Real) -> Real {
        if value > Real::EPSILON {
            1.0 / value
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_vector_is_shortest() {
        let q = Quat::from_rotation_y(0.5);
        let w = Dim3::rotation_vector(&-q);
        assert_relative_eq!(w.y, 0.5, epsilon = 1e-5);
        assert_relative_eq!(w.x, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn parallel_axis_shift_adds_transverse_terms() {
        let shifted = Dim3::inertia_shift(2.0, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(shifted.x_axis.x, 0.0);
        assert_relative_eq!(shifted.y_axis.y, 2.0);
        assert_relative_eq!(shifted.z_axis.z, 2.0);
    }

    #[test]
    fn tangents_are_orthonormal() {
        let n = Vec3::new(0.3, 0.8, -0.2).normalize();
        let [t1, t2] = Dim3::tangents(n);
        assert_relative_eq!(t1.dot(n), 0.0, epsilon = 1e-5);
        assert_relative_eq!(t2.dot(n), 0.0, epsilon = 1e-5);
        assert_relative_eq!(t1.dot(t2), 0.0, epsilon = 1e-5);
        assert_relative_eq!(t1.length(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn singular_inertia_inverts_per_axis() {
        let inv = Dim3::inertia_inverse(Mat3::from_diagonal(Vec3::new(2.0, 0.0, 4.0)));
        assert_relative_eq!(inv.x_axis.x, 0.5);
        assert_relative_eq!(inv.y_axis.y, 0.0);
        assert_relative_eq!(inv.z_axis.z, 0.25);
    }

    #[test]
    fn heightfield_triangle_count() {
        let heights = vec![0.0; 9];
        let (vertices, triangles) = Dim3::heightfield_mesh(&heights, 2, 2, Vec3::ONE);
        assert_eq!(vertices.len(), 9);
        assert_eq!(triangles.len(), 8);
    }
}
