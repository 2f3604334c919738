use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{Dim, Real, Vector};

use super::types::Transform;

/// Axis-aligned bounding box used for proxies, BVH nodes and mesh bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Aabb<D: Dim> {
    pub min: D::Vector,
    pub max: D::Vector,
}

impl<D: Dim> Aabb<D> {
    pub fn new(min: D::Vector, max: D::Vector) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: D::Vector::splat(Real::INFINITY),
            max: D::Vector::splat(Real::NEG_INFINITY),
        }
    }

    pub fn from_half_extents(center: D::Vector, half_extents: D::Vector) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn extend(&mut self, point: D::Vector) {
        self.min = self.min.component_min(point);
        self.max = self.max.component_max(point);
    }

    pub fn from_points(points: &[D::Vector]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        (0..D::DIM).any(|axis| self.min.component(axis) > self.max.component(axis))
    }

    pub fn center(&self) -> D::Vector {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> D::Vector {
        (self.max - self.min) * 0.5
    }

    pub fn radius(&self) -> Real {
        self.half_extents().length()
    }

    /// Sum of the edge lengths, used as the BVH split heuristic.
    pub fn perimeter(&self) -> Real {
        let size = self.max - self.min;
        (0..D::DIM).map(|axis| size.component(axis)).sum()
    }

    pub fn merged(&self, other: &Self) -> Self {
        Self {
            min: self.min.component_min(other.min),
            max: self.max.component_max(other.max),
        }
    }

    pub fn loosened(&self, margin: Real) -> Self {
        let margin = D::Vector::splat(margin.max(0.0));
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    /// Bounds of this box swept along `displacement`.
    pub fn swept(&self, displacement: D::Vector) -> Self {
        let moved = Self::new(self.min + displacement, self.max + displacement);
        self.merged(&moved)
    }

    pub fn intersects(&self, other: &Self) -> bool {
        (0..D::DIM).all(|axis| {
            self.min.component(axis) <= other.max.component(axis)
                && self.max.component(axis) >= other.min.component(axis)
        })
    }

    pub fn contains_point(&self, point: D::Vector) -> bool {
        (0..D::DIM).all(|axis| {
            let value = point.component(axis);
            value >= self.min.component(axis) && value <= self.max.component(axis)
        })
    }

    pub fn contains(&self, other: &Self) -> bool {
        (0..D::DIM).all(|axis| {
            self.min.component(axis) <= other.min.component(axis)
                && self.max.component(axis) >= other.max.component(axis)
        })
    }

    /// Bounds of this local box once moved by `pose`.
    pub fn transformed(&self, pose: &Transform<D>) -> Self {
        let center = pose.transform_point(self.center());
        let half = self.half_extents();
        let mut world_half = D::Vector::ZERO;
        for axis in 0..D::DIM {
            let rotated = pose.transform_vector(D::basis(axis) * half.component(axis));
            world_half += rotated.abs();
        }
        Self::from_half_extents(center, world_half)
    }

    /// Slab test, returning the entry parameter along `dir` in `[0, max_toi]`.
    pub fn cast_ray(&self, origin: D::Vector, dir: D::Vector, max_toi: Real) -> Option<Real> {
        let mut t_min: Real = 0.0;
        let mut t_max = max_toi;
        for axis in 0..D::DIM {
            let o = origin.component(axis);
            let d = dir.component(axis);
            let lo = self.min.component(axis);
            let hi = self.max.component(axis);
            if d.abs() < Real::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Polyline (2D) or triangle soup (3D) used as static collision geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TriMesh<D: Dim> {
    vertices: Vec<D::Vector>,
    elements: Vec<D::Element>,
    element_aabbs: Vec<Aabb<D>>,
    aabb: Aabb<D>,
}

impl<D: Dim> TriMesh<D> {
    pub fn new(vertices: Vec<D::Vector>, elements: Vec<D::Element>) -> PhysicsResult<Self> {
        MeshBuilder::new(vertices, elements).build()
    }

    pub fn builder(vertices: Vec<D::Vector>, elements: Vec<D::Element>) -> MeshBuilder<D> {
        MeshBuilder::new(vertices, elements)
    }

    pub fn vertices(&self) -> &[D::Vector] {
        &self.vertices
    }

    pub fn elements(&self) -> &[D::Element] {
        &self.elements
    }

    pub fn aabb(&self) -> Aabb<D> {
        self.aabb
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Vertices of element `index` in mesh-local coordinates.
    pub fn element_points(&self, index: usize) -> Vec<D::Vector> {
        self.elements
            .get(index)
            .map(|element| {
                element
                    .as_ref()
                    .iter()
                    .map(|&vertex| self.vertices[vertex as usize])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Indices of elements whose bounds overlap `aabb` (mesh-local coordinates).
    pub fn elements_intersecting(&self, aabb: &Aabb<D>) -> Vec<usize> {
        if !self.aabb.intersects(aabb) {
            return Vec::new();
        }
        self.element_aabbs
            .iter()
            .enumerate()
            .filter(|(_, bounds)| bounds.intersects(aabb))
            .map(|(index, _)| index)
            .collect()
    }
}

/// Helper used to cook meshes from raw vertex/index buffers.
#[derive(Debug, Clone)]
pub struct MeshBuilder<D: Dim> {
    vertices: Vec<D::Vector>,
    elements: Vec<D::Element>,
}

impl<D: Dim> MeshBuilder<D> {
    pub fn new(vertices: Vec<D::Vector>, elements: Vec<D::Element>) -> Self {
        Self { vertices, elements }
    }

    /// Deduplicates vertices using a quantized grid.
    pub fn weld_vertices(mut self, epsilon: Real) -> Self {
        if epsilon <= 0.0 || self.vertices.is_empty() {
            return self;
        }

        let half_cell = D::Vector::splat(0.5 * epsilon);
        let mut map: HashMap<[i32; 3], u32> = HashMap::new();
        let mut new_vertices: Vec<D::Vector> = Vec::new();
        let mut remap: Vec<u32> = Vec::with_capacity(self.vertices.len());

        for v in &self.vertices {
            let key = D::grid_cell(*v + half_cell, epsilon);
            let index = *map.entry(key).or_insert_with(|| {
                let idx = new_vertices.len() as u32;
                new_vertices.push(*v);
                idx
            });
            remap.push(index);
        }

        for element in &mut self.elements {
            for index in element.as_mut() {
                *index = remap.get(*index as usize).copied().unwrap_or(*index);
            }
        }

        self.vertices = new_vertices;
        self
    }

    /// Recenters vertices around their centroid.
    pub fn recenter(mut self) -> Self {
        if self.vertices.is_empty() {
            return self;
        }
        let mut centroid = D::Vector::ZERO;
        for v in &self.vertices {
            centroid += *v;
        }
        centroid = centroid / self.vertices.len() as Real;
        for vertex in &mut self.vertices {
            *vertex -= centroid;
        }
        self
    }

    pub fn build(self) -> PhysicsResult<TriMesh<D>> {
        if self.vertices.is_empty() || self.elements.is_empty() {
            return Err(PhysicsError::DegenerateInput(
                "mesh needs at least one vertex and one element".into(),
            ));
        }
        if self.vertices.iter().any(|v| !v.is_finite()) {
            return Err(PhysicsError::DegenerateInput(
                "mesh vertex is not finite".into(),
            ));
        }
        let vertex_count = self.vertices.len();
        if let Some(bad) = self
            .elements
            .iter()
            .flat_map(|element| element.as_ref().iter().copied())
            .find(|&index| index as usize >= vertex_count)
        {
            return Err(PhysicsError::DegenerateInput(format!(
                "mesh index {bad} out of range for {vertex_count} vertices"
            )));
        }

        let element_aabbs: Vec<Aabb<D>> = self
            .elements
            .iter()
            .map(|element| {
                let mut bounds = Aabb::empty();
                for &index in element.as_ref() {
                    bounds.extend(self.vertices[index as usize]);
                }
                bounds
            })
            .collect();
        let aabb = Aabb::from_points(&self.vertices);

        Ok(TriMesh {
            vertices: self.vertices,
            elements: self.elements,
            element_aabbs,
            aabb,
        })
    }
}

/// Regular grid of heights, tessellated into a mesh on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct HeightField<D: Dim> {
    heights: Vec<Real>,
    nrows: usize,
    ncols: usize,
    scale: D::Vector,
    mesh: TriMesh<D>,
}

impl<D: Dim> HeightField<D> {
    /// In 2D `heights` holds `ncols + 1` samples and `nrows` is ignored; in 3D it
    /// holds `(nrows + 1) * (ncols + 1)` samples in row-major order.
    pub fn new(
        heights: Vec<Real>,
        nrows: usize,
        ncols: usize,
        scale: D::Vector,
    ) -> PhysicsResult<Self> {
        let expected = if D::DIM == 2 {
            ncols + 1
        } else {
            (nrows + 1) * (ncols + 1)
        };
        if ncols == 0 || (D::DIM == 3 && nrows == 0) || heights.len() != expected {
            return Err(PhysicsError::DegenerateInput(format!(
                "heightfield expects {expected} samples, got {}",
                heights.len()
            )));
        }
        if heights.iter().any(|h| !h.is_finite()) || !scale.is_finite() || scale.min_element() <= 0.0 {
            return Err(PhysicsError::DegenerateInput(
                "heightfield heights and scale must be finite and positive".into(),
            ));
        }
        let (vertices, elements) = D::heightfield_mesh(&heights, nrows, ncols, scale);
        let mesh = TriMesh::new(vertices, elements)?;
        Ok(Self {
            heights,
            nrows,
            ncols,
            scale,
            mesh,
        })
    }

    pub fn heights(&self) -> &[Real] {
        &self.heights
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn scale(&self) -> D::Vector {
        self.scale
    }

    pub fn mesh(&self) -> &TriMesh<D> {
        &self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Dim2, Dim3, Rot2};
    use approx::assert_relative_eq;
    use glam::{Vec2, Vec3};

    #[test]
    fn aabb_transform_contains_rotated_corners() {
        let local = Aabb::<Dim2>::new(Vec2::new(-1.0, -0.5), Vec2::new(1.0, 0.5));
        let pose = Transform::<Dim2>::new(Vec2::new(2.0, 0.0), Rot2::from_angle(std::f32::consts::FRAC_PI_2));
        let world = local.transformed(&pose);
        assert_relative_eq!(world.min.x, 1.5, epsilon = 1e-5);
        assert_relative_eq!(world.max.x, 2.5, epsilon = 1e-5);
        assert_relative_eq!(world.min.y, -1.0, epsilon = 1e-5);
        assert_relative_eq!(world.max.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn aabb_ray_slab() {
        let aabb = Aabb::<Dim3>::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let toi = aabb.cast_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::X, 100.0);
        assert_relative_eq!(toi.unwrap(), 4.0);
        assert!(aabb.cast_ray(Vec3::new(-5.0, 3.0, 0.0), Vec3::X, 100.0).is_none());
        assert_eq!(aabb.cast_ray(Vec3::ZERO, Vec3::X, 100.0), Some(0.0));
    }

    #[test]
    fn mesh_rejects_out_of_range_indices() {
        let result = TriMesh::<Dim3>::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 3]]);
        assert!(matches!(result, Err(PhysicsError::DegenerateInput(_))));
    }

    #[test]
    fn welding_merges_duplicate_vertices() {
        let mesh = TriMesh::<Dim3>::builder(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::X, Vec3::ONE],
            vec![[0, 1, 2], [3, 4, 2]],
        )
        .weld_vertices(1e-3)
        .build()
        .unwrap();
        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.elements()[1], [1, 3, 2]);
    }

    #[test]
    fn heightfield_validates_sample_count() {
        assert!(HeightField::<Dim2>::new(vec![0.0, 1.0], 0, 3, Vec2::ONE).is_err());
        let field = HeightField::<Dim2>::new(vec![0.0, 1.0, 0.0, 1.0], 0, 3, Vec2::ONE).unwrap();
        assert_eq!(field.mesh().element_count(), 3);
    }
}
