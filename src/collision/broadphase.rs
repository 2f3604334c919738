use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{
    IntegrationParameters, DEFAULT_BROADPHASE_CELL_SIZE, DEFAULT_PROXY_MARGIN, MAX_CELLS_PER_PROXY,
};
use crate::core::collider::ColliderSet;
use crate::core::mesh::Aabb;
use crate::core::rigidbody::{RigidBody, RigidBodySet};
use crate::math::{Dim, Real, Vector};
use crate::utils::allocator::ColliderHandle;

type Cell = [i32; 3];

/// Uniform grid spatial hash. Each proxy is registered in every cell its fat AABB touches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialGrid {
    cell_size: Real,
    cells: BTreeMap<Cell, Vec<ColliderHandle>>,
}

impl SpatialGrid {
    pub fn new(cell_size: Real) -> Self {
        Self {
            cell_size,
            cells: BTreeMap::new(),
        }
    }

    pub fn cell_size(&self) -> Real {
        self.cell_size
    }

    fn cell_range<D: Dim>(&self, aabb: &Aabb<D>) -> (Cell, Cell) {
        (
            D::grid_cell(aabb.min, self.cell_size),
            D::grid_cell(aabb.max, self.cell_size),
        )
    }

    fn cell_count((lo, hi): (Cell, Cell)) -> usize {
        (0..3)
            .map(|axis| (hi[axis] as i64 - lo[axis] as i64 + 1).max(1) as usize)
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }

    fn for_each_cell(range: (Cell, Cell), mut f: impl FnMut(Cell)) {
        let (lo, hi) = range;
        for x in lo[0]..=hi[0] {
            for y in lo[1]..=hi[1] {
                for z in lo[2]..=hi[2] {
                    f([x, y, z]);
                }
            }
        }
    }

    fn insert(&mut self, handle: ColliderHandle, range: (Cell, Cell)) {
        Self::for_each_cell(range, |cell| self.cells.entry(cell).or_default().push(handle));
    }

    fn remove(&mut self, handle: ColliderHandle, range: (Cell, Cell)) {
        Self::for_each_cell(range, |cell| {
            if let Some(entries) = self.cells.get_mut(&cell) {
                entries.retain(|h| *h != handle);
                if entries.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        });
    }

    fn query(&self, range: (Cell, Cell), out: &mut BTreeSet<ColliderHandle>) {
        Self::for_each_cell(range, |cell| {
            if let Some(entries) = self.cells.get(&cell) {
                out.extend(entries.iter().copied());
            }
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
struct Proxy<D: Dim> {
    fat_aabb: Aabb<D>,
    /// Grid cells covered, or `None` for oversized proxies.
    cells: Option<(Cell, Cell)>,
}

/// Incremental broad phase returning candidate collider pairs whose fat AABBs overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BroadPhase<D: Dim> {
    grid: SpatialGrid,
    proxies: BTreeMap<ColliderHandle, Proxy<D>>,
    oversized: BTreeSet<ColliderHandle>,
    /// Extra room given to a proxy each time it is reinserted.
    pub proxy_margin: Real,
}

impl<D: Dim> Default for BroadPhase<D> {
    fn default() -> Self {
        Self::new(DEFAULT_BROADPHASE_CELL_SIZE)
    }
}

impl<D: Dim> BroadPhase<D> {
    pub fn new(cell_size: Real) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size.max(Real::EPSILON)),
            proxies: BTreeMap::new(),
            oversized: BTreeSet::new(),
            proxy_margin: DEFAULT_PROXY_MARGIN,
        }
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Fat AABB currently stored for `handle`.
    pub fn proxy_aabb(&self, handle: ColliderHandle) -> Option<&Aabb<D>> {
        self.proxies.get(&handle).map(|proxy| &proxy.fat_aabb)
    }

    /// Refreshes every proxy from the current collider poses and returns the sorted,
    /// deduplicated candidate pairs.
    pub fn update(
        &mut self,
        params: &IntegrationParameters,
        bodies: &RigidBodySet<D>,
        colliders: &ColliderSet<D>,
    ) -> Vec<(ColliderHandle, ColliderHandle)> {
        let stale: Vec<ColliderHandle> = self
            .proxies
            .keys()
            .copied()
            .filter(|handle| !colliders.contains(*handle))
            .collect();
        for handle in stale {
            self.remove(handle);
        }

        for (handle, collider) in colliders.iter() {
            let Some(body) = bodies.get(collider.parent()) else {
                continue;
            };
            let predicted = predicted_aabb(collider.compute_aabb(), body, params);
            let escaped = self
                .proxies
                .get(&handle)
                .map_or(true, |proxy| !proxy.fat_aabb.contains(&predicted));
            if escaped {
                self.reinsert(handle, predicted.loosened(self.proxy_margin));
            }
        }

        self.candidate_pairs()
    }

    fn reinsert(&mut self, handle: ColliderHandle, fat_aabb: Aabb<D>) {
        self.remove(handle);
        let range = self.grid.cell_range(&fat_aabb);
        let cells = if SpatialGrid::cell_count(range) > MAX_CELLS_PER_PROXY {
            self.oversized.insert(handle);
            None
        } else {
            self.grid.insert(handle, range);
            Some(range)
        };
        self.proxies.insert(handle, Proxy { fat_aabb, cells });
    }

    /// Drops the proxy of a collider. Unknown handles are ignored.
    pub fn remove(&mut self, handle: ColliderHandle) {
        if let Some(proxy) = self.proxies.remove(&handle) {
            match proxy.cells {
                Some(range) => self.grid.remove(handle, range),
                None => {
                    self.oversized.remove(&handle);
                }
            }
        }
    }

    fn candidate_pairs(&self) -> Vec<(ColliderHandle, ColliderHandle)> {
        let mut pairs = BTreeSet::new();
        let mut push = |a: ColliderHandle, b: ColliderHandle| {
            if a != b {
                pairs.insert(if a < b { (a, b) } else { (b, a) });
            }
        };

        for entries in self.grid.cells.values() {
            for (i, a) in entries.iter().enumerate() {
                for b in &entries[i + 1..] {
                    if self.overlap(*a, *b) {
                        push(*a, *b);
                    }
                }
            }
        }

        for big in &self.oversized {
            for other in self.proxies.keys() {
                if self.overlap(*big, *other) {
                    push(*big, *other);
                }
            }
        }

        pairs.into_iter().collect()
    }

    fn overlap(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        match (self.proxies.get(&a), self.proxies.get(&b)) {
            (Some(pa), Some(pb)) => pa.fat_aabb.intersects(&pb.fat_aabb),
            _ => false,
        }
    }

    /// Colliders whose fat AABB intersects `aabb`, in handle order.
    pub fn query_aabb(&self, aabb: &Aabb<D>) -> Vec<ColliderHandle> {
        let mut found = BTreeSet::new();
        let range = self.grid.cell_range(aabb);
        if SpatialGrid::cell_count(range) > MAX_CELLS_PER_PROXY {
            found.extend(self.proxies.keys().copied());
        } else {
            self.grid.query(range, &mut found);
            found.extend(self.oversized.iter().copied());
        }
        found
            .into_iter()
            .filter(|handle| {
                self.proxies
                    .get(handle)
                    .is_some_and(|proxy| proxy.fat_aabb.intersects(aabb))
            })
            .collect()
    }
}

/// Tight AABB extended by the motion expected over the next step.
fn predicted_aabb<D: Dim>(
    aabb: Aabb<D>,
    body: &RigidBody<D>,
    params: &IntegrationParameters,
) -> Aabb<D> {
    if !body.is_moving() {
        return aabb.loosened(params.prediction_distance);
    }
    let velocity = body.velocity();
    let angular_reach = velocity.angular.length() * params.dt * aabb.radius();
    aabb.swept(velocity.linear * params.dt)
        .loosened(params.prediction_distance + angular_reach)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::ColliderBuilder;
    use crate::core::rigidbody::RigidBodyBuilder;
    use crate::math::{Dim2, Dim3};
    use glam::{Vec2, Vec3};

    fn world_with<D: Dim>(
        items: &[(D::Vector, Real)],
    ) -> (RigidBodySet<D>, ColliderSet<D>, Vec<ColliderHandle>) {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let mut handles = Vec::new();
        for (translation, radius) in items {
            let body = bodies.insert(RigidBodyBuilder::dynamic().translation(*translation).build().unwrap());
            let collider = ColliderBuilder::ball(*radius).build().unwrap();
            handles.push(colliders.insert(collider, body, &mut bodies).unwrap());
        }
        (bodies, colliders, handles)
    }

    #[test]
    fn overlapping_proxies_pair_once() {
        let (bodies, colliders, handles) = world_with::<Dim3>(&[
            (Vec3::ZERO, 1.0),
            (Vec3::new(1.5, 0.0, 0.0), 1.0),
            (Vec3::new(30.0, 0.0, 0.0), 1.0),
        ]);
        let mut broad = BroadPhase::new(2.0);
        let pairs = broad.update(&IntegrationParameters::default(), &bodies, &colliders);
        assert_eq!(pairs, vec![(handles[0], handles[1])]);
    }

    #[test]
    fn small_motion_keeps_fat_aabb() {
        let (mut bodies, mut colliders, handles) = world_with::<Dim2>(&[(Vec2::ZERO, 0.5)]);
        let mut broad = BroadPhase::new(DEFAULT_BROADPHASE_CELL_SIZE);
        let params = IntegrationParameters::default();
        broad.update(&params, &bodies, &colliders);
        let before = *broad.proxy_aabb(handles[0]).unwrap();

        let body = colliders.get(handles[0]).unwrap().parent();
        bodies.get_mut(body).unwrap().set_translation(Vec2::new(0.01, 0.0), true);
        colliders.update_all_positions(&bodies);
        broad.update(&params, &bodies, &colliders);
        assert_eq!(*broad.proxy_aabb(handles[0]).unwrap(), before);

        bodies.get_mut(body).unwrap().set_translation(Vec2::new(3.0, 0.0), true);
        colliders.update_all_positions(&bodies);
        broad.update(&params, &bodies, &colliders);
        assert_ne!(*broad.proxy_aabb(handles[0]).unwrap(), before);
    }

    #[test]
    fn oversized_proxies_meet_everything() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let mut colliders = ColliderSet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build().unwrap());
        let floor = colliders
            .insert(ColliderBuilder::cuboid(Vec2::new(500.0, 0.5)).build().unwrap(), ground, &mut bodies)
            .unwrap();
        let body = bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(Vec2::new(120.0, 1.0))
                .build()
                .unwrap(),
        );
        let ball = colliders
            .insert(ColliderBuilder::ball(0.6).build().unwrap(), body, &mut bodies)
            .unwrap();

        let mut broad = BroadPhase::new(1.0);
        let pairs = broad.update(&IntegrationParameters::default(), &bodies, &colliders);
        assert_eq!(pairs, vec![(floor, ball)]);
        assert_eq!(broad.query_aabb(&Aabb::new(Vec2::new(119.0, 0.0), Vec2::new(121.0, 2.0))), vec![floor, ball]);
    }

    #[test]
    fn removed_colliders_leave_the_grid() {
        let (mut bodies, mut colliders, handles) =
            world_with::<Dim3>(&[(Vec3::ZERO, 1.0), (Vec3::new(0.5, 0.0, 0.0), 1.0)]);
        let mut broad = BroadPhase::new(2.0);
        let params = IntegrationParameters::default();
        assert_eq!(broad.update(&params, &bodies, &colliders).len(), 1);
        colliders.remove(handles[1], &mut bodies, true);
        assert!(broad.update(&params, &bodies, &colliders).is_empty());
        assert_eq!(broad.proxy_count(), 1);
    }
}
