use std::collections::HashMap;

use crate::collision::narrowphase::{NarrowPhase, PairKey};
use crate::config::IntegrationParameters;
use crate::core::collider::ColliderSet;
use crate::core::joint::JointSet;
use crate::core::rigidbody::{RigidBody, RigidBodySet};
use crate::math::{Dim, Vector};
use crate::utils::allocator::{JointHandle, RigidBodyHandle};

/// Awake bodies solved together, with the contact pairs and joints acting on them.
/// After batching one island may hold several independent components.
#[derive(Debug, Clone, Default)]
pub struct Island {
    pub bodies: Vec<RigidBodyHandle>,
    pub contact_pairs: Vec<PairKey>,
    pub joints: Vec<JointHandle>,
}

impl Island {
    fn absorb(&mut self, other: Island) {
        self.bodies.extend(other.bodies);
        self.contact_pairs.extend(other.contact_pairs);
        self.joints.extend(other.joints);
    }
}

/// Union-find over body indices, with path halving.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins so components are labelled by their first body.
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }
}

/// Builds the islands of each step and manages sleeping state.
#[derive(Debug, Clone, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
    active_component_count: usize,
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solver batches computed by the last update.
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Number of awake connected components found by the last update.
    pub fn active_island_count(&self) -> usize {
        self.active_component_count
    }

    /// Wakes bodies touched by moving kinematic bodies, groups dynamic bodies into
    /// connected components, wakes or puts to sleep whole components, and batches the
    /// awake ones for the solver.
    pub fn update<D: Dim>(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut RigidBodySet<D>,
        colliders: &ColliderSet<D>,
        narrow_phase: &NarrowPhase<D>,
        joints: &JointSet<D>,
    ) {
        self.islands.clear();
        self.active_component_count = 0;

        let parent_of = |collider| colliders.get(collider).map(|c| c.parent());
        let touching: Vec<(PairKey, RigidBodyHandle, RigidBodyHandle)> = narrow_phase
            .contact_pairs()
            .filter(|pair| pair.has_active_contact())
            .filter_map(|pair| {
                let b1 = parent_of(pair.collider1)?;
                let b2 = parent_of(pair.collider2)?;
                Some(((pair.collider1, pair.collider2), b1, b2))
            })
            .collect();

        wake_from_kinematic(bodies, &touching);

        let dynamic: Vec<RigidBodyHandle> = bodies
            .iter()
            .filter(|(_, body)| body.is_dynamic())
            .map(|(handle, _)| handle)
            .collect();
        let index_of: HashMap<RigidBodyHandle, usize> =
            dynamic.iter().enumerate().map(|(i, h)| (*h, i)).collect();
        let mut sets = DisjointSets::new(dynamic.len());

        for (_, b1, b2) in &touching {
            if let (Some(i), Some(j)) = (index_of.get(b1), index_of.get(b2)) {
                sets.union(*i, *j);
            }
        }
        let joint_links: Vec<(JointHandle, RigidBodyHandle, RigidBodyHandle)> = joints
            .iter()
            .map(|(handle, joint)| (handle, joint.body1, joint.body2))
            .collect();
        for (_, b1, b2) in &joint_links {
            if let (Some(i), Some(j)) = (index_of.get(b1), index_of.get(b2)) {
                sets.union(*i, *j);
            }
        }

        // Components in order of their first body.
        let mut component_of_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Island> = Vec::new();
        let mut component_of_body = vec![0usize; dynamic.len()];
        for (i, handle) in dynamic.iter().enumerate() {
            let root = sets.find(i);
            let component = *component_of_root.entry(root).or_insert_with(|| {
                components.push(Island::default());
                components.len() - 1
            });
            component_of_body[i] = component;
            components[component].bodies.push(*handle);
        }

        let component_for = |b1: &RigidBodyHandle, b2: &RigidBodyHandle| {
            index_of
                .get(b1)
                .or_else(|| index_of.get(b2))
                .map(|i| component_of_body[*i])
        };
        for (key, b1, b2) in &touching {
            if let Some(component) = component_for(b1, b2) {
                components[component].contact_pairs.push(*key);
            }
        }
        for (handle, b1, b2) in &joint_links {
            if let Some(component) = component_for(b1, b2) {
                components[component].joints.push(*handle);
            }
        }

        let mut batch = Island::default();
        for component in components {
            if !update_activation(params, bodies, &component.bodies) {
                continue;
            }
            self.active_component_count += 1;
            batch.absorb(component);
            if batch.bodies.len() >= params.min_island_size {
                self.islands.push(std::mem::take(&mut batch));
            }
        }
        if !batch.bodies.is_empty() {
            self.islands.push(batch);
        }
    }
}

fn wake_from_kinematic<D: Dim>(
    bodies: &mut RigidBodySet<D>,
    touching: &[(PairKey, RigidBodyHandle, RigidBodyHandle)],
) {
    let moving_kinematic = |body: &RigidBody<D>| body.is_kinematic() && body.is_moving();
    for (_, b1, b2) in touching {
        for (driver, driven) in [(b1, b2), (b2, b1)] {
            let pushes = bodies.get(*driver).is_some_and(moving_kinematic);
            if pushes {
                if let Some(body) = bodies.get_mut(*driven) {
                    if body.is_dynamic() && body.is_sleeping() {
                        body.wake_up();
                    }
                }
            }
        }
    }
}

/// Propagates wake state through a component and advances its sleep timers.
/// Returns whether the component stays awake this step.
fn update_activation<D: Dim>(
    params: &IntegrationParameters,
    bodies: &mut RigidBodySet<D>,
    members: &[RigidBodyHandle],
) -> bool {
    let any_awake = members
        .iter()
        .any(|h| bodies.get(*h).is_some_and(|body| !body.is_sleeping()));
    if !any_awake {
        return false;
    }

    let mut all_ready = true;
    for handle in members {
        let Some(body) = bodies.get_mut(*handle) else {
            continue;
        };
        if body.is_sleeping() {
            body.wake_up();
        }
        let activation = &mut body.activation;
        let slow = body.velocity.linear.length() < activation.linear_threshold
            && body.velocity.angular.length() < activation.angular_threshold;
        if activation.can_sleep && slow {
            activation.time_since_can_sleep += params.dt;
        } else {
            activation.time_since_can_sleep = 0.0;
        }
        if activation.time_since_can_sleep < params.time_until_sleep {
            all_ready = false;
        }
    }

    if all_ready {
        for handle in members {
            if let Some(body) = bodies.get_mut(*handle) {
                body.sleep();
            }
        }
        log::debug!("island of {} bodies fell asleep", members.len());
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::joint::JointBuilder;
    use crate::core::rigidbody::RigidBodyBuilder;
    use crate::math::Dim2;
    use glam::Vec2;

    #[test]
    fn joints_link_dynamic_bodies_only() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let colliders = ColliderSet::new();
        let mut joints = JointSet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build().unwrap());
        let a = bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        let b = bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        let c = bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        joints.insert(JointBuilder::ball().build(ground, a), &mut bodies).unwrap();
        joints.insert(JointBuilder::ball().build(ground, c), &mut bodies).unwrap();
        joints.insert(JointBuilder::ball().build(a, b), &mut bodies).unwrap();

        let params = IntegrationParameters {
            min_island_size: 1,
            ..Default::default()
        };
        let mut manager = IslandManager::new();
        manager.update(&params, &mut bodies, &colliders, &NarrowPhase::new(), &joints);
        assert_eq!(manager.islands().len(), 2);
        assert_eq!(manager.islands()[0].bodies, vec![a, b]);
        assert_eq!(manager.islands()[0].joints.len(), 2);
        assert_eq!(manager.islands()[1].bodies, vec![c]);
    }

    #[test]
    fn resting_island_falls_asleep() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let body = bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        let params = IntegrationParameters::default();
        let mut manager = IslandManager::new();
        let steps = (params.time_until_sleep / params.dt).ceil() as usize + 1;
        for _ in 0..steps {
            manager.update(&params, &mut bodies, &ColliderSet::new(), &NarrowPhase::new(), &JointSet::new());
        }
        assert!(bodies.get(body).unwrap().is_sleeping());
        assert!(manager.islands().is_empty());
    }

    #[test]
    fn moving_body_keeps_island_awake() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        let body = bodies.insert(
            RigidBodyBuilder::dynamic()
                .linvel(Vec2::new(3.0, 0.0))
                .build()
                .unwrap(),
        );
        let params = IntegrationParameters::default();
        let mut manager = IslandManager::new();
        for _ in 0..300 {
            manager.update(&params, &mut bodies, &ColliderSet::new(), &NarrowPhase::new(), &JointSet::new());
        }
        assert!(!bodies.get(body).unwrap().is_sleeping());
        assert_eq!(manager.active_island_count(), 1);
    }

    #[test]
    fn small_islands_are_batched() {
        let mut bodies = RigidBodySet::<Dim2>::new();
        for _ in 0..5 {
            bodies.insert(RigidBodyBuilder::dynamic().build().unwrap());
        }
        let params = IntegrationParameters {
            min_island_size: 2,
            ..Default::default()
        };
        let mut manager = IslandManager::new();
        manager.update(&params, &mut bodies, &ColliderSet::new(), &NarrowPhase::new(), &JointSet::new());
        assert_eq!(manager.active_island_count(), 5);
        let sizes: Vec<usize> = manager.islands().iter().map(|i| i.bodies.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }
}
