use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::IntegrationParameters;
use crate::core::collider::{Collider, ColliderSet};
use crate::core::rigidbody::{RigidBody, RigidBodySet};
use crate::dynamics::parallel;
use crate::math::{Dim, Real};
use crate::pipeline::events::{ContactEvent, EventQueue, ProximityEvent};
use crate::utils::allocator::ColliderHandle;

use super::contact::{generate_manifolds, ContactManifold};
use super::queries;

/// Pair key, always ordered so that the first handle is the smaller one.
pub type PairKey = (ColliderHandle, ColliderHandle);

/// Sensor overlap state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Proximity {
    Intersecting,
    /// Closer than the prediction distance without overlapping.
    WithinMargin,
    Disjoint,
}

/// Contact state of two non-sensor colliders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ContactPair<D: Dim> {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    pub manifolds: Vec<ContactManifold<D>>,
}

impl<D: Dim> ContactPair<D> {
    fn new(collider1: ColliderHandle, collider2: ColliderHandle) -> Self {
        Self {
            collider1,
            collider2,
            manifolds: Vec::new(),
        }
    }

    /// A pair is in contact when any manifold holds a point, speculative ones included.
    pub fn has_active_contact(&self) -> bool {
        self.manifolds.iter().any(|manifold| !manifold.points.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairKind {
    Contact,
    Proximity,
}

enum PairResult<D: Dim> {
    Contact(Vec<ContactManifold<D>>),
    Proximity(Proximity),
}

/// Exact contact and proximity state for every candidate pair kept by the broad phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct NarrowPhase<D: Dim> {
    contact_pairs: BTreeMap<PairKey, ContactPair<D>>,
    proximity_pairs: BTreeMap<PairKey, Proximity>,
}

impl<D: Dim> Default for NarrowPhase<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dim> NarrowPhase<D> {
    pub fn new() -> Self {
        Self {
            contact_pairs: BTreeMap::new(),
            proximity_pairs: BTreeMap::new(),
        }
    }

    fn key(a: ColliderHandle, b: ColliderHandle) -> PairKey {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn contact_pair(&self, a: ColliderHandle, b: ColliderHandle) -> Option<&ContactPair<D>> {
        self.contact_pairs.get(&Self::key(a, b))
    }

    pub(crate) fn contact_pair_mut(&mut self, key: &PairKey) -> Option<&mut ContactPair<D>> {
        self.contact_pairs.get_mut(key)
    }

    /// Contact pairs in key order.
    pub fn contact_pairs(&self) -> impl Iterator<Item = &ContactPair<D>> + '_ {
        self.contact_pairs.values()
    }

    /// Pairs involving `collider`.
    pub fn contacts_with(&self, collider: ColliderHandle) -> impl Iterator<Item = &ContactPair<D>> + '_ {
        self.contact_pairs
            .values()
            .filter(move |pair| pair.collider1 == collider || pair.collider2 == collider)
    }

    pub fn proximity(&self, a: ColliderHandle, b: ColliderHandle) -> Option<Proximity> {
        self.proximity_pairs.get(&Self::key(a, b)).copied()
    }

    pub fn proximity_pairs(&self) -> impl Iterator<Item = (ColliderHandle, ColliderHandle, Proximity)> + '_ {
        self.proximity_pairs.iter().map(|((a, b), p)| (*a, *b, *p))
    }

    /// Number of pairs with at least one contact point.
    pub fn active_contact_count(&self) -> usize {
        self.contact_pairs
            .values()
            .filter(|pair| pair.has_active_contact())
            .count()
    }

    /// Drops every pair involving `collider`, emitting the matching stop events.
    pub fn remove_collider(&mut self, collider: ColliderHandle, events: &mut EventQueue) {
        let contact_keys: Vec<PairKey> = self
            .contact_pairs
            .keys()
            .copied()
            .filter(|(a, b)| *a == collider || *b == collider)
            .collect();
        for key in contact_keys {
            self.remove_contact_pair(&key, events);
        }

        let proximity_keys: Vec<PairKey> = self
            .proximity_pairs
            .keys()
            .copied()
            .filter(|(a, b)| *a == collider || *b == collider)
            .collect();
        for key in proximity_keys {
            self.remove_proximity_pair(&key, events);
        }
    }

    fn remove_contact_pair(&mut self, key: &PairKey, events: &mut EventQueue) {
        if let Some(pair) = self.contact_pairs.remove(key) {
            if pair.has_active_contact() {
                events.push_contact(ContactEvent::Stopped(key.0, key.1));
            }
        }
    }

    fn remove_proximity_pair(&mut self, key: &PairKey, events: &mut EventQueue) {
        if let Some(prev_status) = self.proximity_pairs.remove(key) {
            if prev_status != Proximity::Disjoint {
                events.push_proximity(ProximityEvent {
                    collider1: key.0,
                    collider2: key.1,
                    prev_status,
                    new_status: Proximity::Disjoint,
                });
            }
        }
    }

    /// Recomputes manifolds and proximities for the candidate pairs found by the broad phase.
    pub fn update(
        &mut self,
        params: &IntegrationParameters,
        candidates: &[PairKey],
        bodies: &RigidBodySet<D>,
        colliders: &ColliderSet<D>,
        parallel_enabled: bool,
        events: &mut EventQueue,
    ) {
        let mut accepted: BTreeMap<PairKey, PairKind> = BTreeMap::new();
        for &(a, b) in candidates {
            let key = Self::key(a, b);
            if let Some(kind) = classify(key, bodies, colliders) {
                accepted.insert(key, kind);
            }
        }

        let lost_contacts: Vec<PairKey> = self
            .contact_pairs
            .keys()
            .copied()
            .filter(|key| accepted.get(key) != Some(&PairKind::Contact))
            .collect();
        for key in lost_contacts {
            self.remove_contact_pair(&key, events);
        }
        let lost_proximities: Vec<PairKey> = self
            .proximity_pairs
            .keys()
            .copied()
            .filter(|key| accepted.get(key) != Some(&PairKind::Proximity))
            .collect();
        for key in lost_proximities {
            self.remove_proximity_pair(&key, events);
        }

        let jobs: Vec<(PairKey, PairKind)> = accepted
            .into_iter()
            .filter(|(key, kind)| {
                let known = match kind {
                    PairKind::Contact => self.contact_pairs.contains_key(key),
                    PairKind::Proximity => self.proximity_pairs.contains_key(key),
                };
                !known || pair_needs_update(key, bodies, colliders)
            })
            .collect();

        let prediction = params.prediction_distance;
        let results = parallel::map_jobs(&jobs, parallel_enabled, |(key, kind)| {
            let (Some(c1), Some(c2)) = (colliders.get(key.0), colliders.get(key.1)) else {
                return None;
            };
            Some(match kind {
                PairKind::Contact => PairResult::Contact(generate_manifolds(c1, c2, prediction)),
                PairKind::Proximity => PairResult::Proximity(proximity(c1, c2, prediction)),
            })
        });

        for ((key, _), result) in jobs.into_iter().zip(results) {
            match result {
                Some(PairResult::Contact(manifolds)) => self.merge_contacts(key, manifolds, events),
                Some(PairResult::Proximity(status)) => self.merge_proximity(key, status, events),
                None => {}
            }
        }
    }

    fn merge_contacts(&mut self, key: PairKey, mut manifolds: Vec<ContactManifold<D>>, events: &mut EventQueue) {
        let pair = self
            .contact_pairs
            .entry(key)
            .or_insert_with(|| ContactPair::new(key.0, key.1));
        let was_active = pair.has_active_contact();
        for manifold in &mut manifolds {
            if let Some(previous) = pair
                .manifolds
                .iter()
                .find(|old| old.subshape1 == manifold.subshape1 && old.subshape2 == manifold.subshape2)
            {
                manifold.warm_start_from(previous);
            }
        }
        pair.manifolds = manifolds;
        let is_active = pair.has_active_contact();
        match (was_active, is_active) {
            (false, true) => events.push_contact(ContactEvent::Started(key.0, key.1)),
            (true, false) => events.push_contact(ContactEvent::Stopped(key.0, key.1)),
            _ => {}
        }
    }

    fn merge_proximity(&mut self, key: PairKey, status: Proximity, events: &mut EventQueue) {
        let prev_status = self
            .proximity_pairs
            .insert(key, status)
            .unwrap_or(Proximity::Disjoint);
        if prev_status != status {
            events.push_proximity(ProximityEvent {
                collider1: key.0,
                collider2: key.1,
                prev_status,
                new_status: status,
            });
        }
    }
}

/// Decides whether a candidate pair interacts, and how.
fn classify<D: Dim>(key: PairKey, bodies: &RigidBodySet<D>, colliders: &ColliderSet<D>) -> Option<PairKind> {
    let c1 = colliders.get(key.0)?;
    let c2 = colliders.get(key.1)?;
    if c1.parent() == c2.parent() || !c1.collision_groups.test(&c2.collision_groups) {
        return None;
    }
    let b1 = bodies.get(c1.parent())?;
    let b2 = bodies.get(c2.parent())?;

    if c1.is_sensor() || c2.is_sensor() {
        if b1.is_static() && b2.is_static() {
            return None;
        }
        return Some(PairKind::Proximity);
    }
    if b1.is_dynamic() || b2.is_dynamic() {
        Some(PairKind::Contact)
    } else {
        None
    }
}

fn is_active_body<D: Dim>(body: &RigidBody<D>) -> bool {
    (body.is_dynamic() && !body.is_sleeping()) || (body.is_kinematic() && body.is_moving())
}

/// Known pairs whose bodies are all asleep or at rest keep their previous state.
fn pair_needs_update<D: Dim>(key: &PairKey, bodies: &RigidBodySet<D>, colliders: &ColliderSet<D>) -> bool {
    [key.0, key.1].iter().any(|handle| {
        colliders
            .get(*handle)
            .and_then(|collider| bodies.get(collider.parent()))
            .is_some_and(is_active_body)
    })
}

fn proximity<D: Dim>(c1: &Collider<D>, c2: &Collider<D>, prediction: Real) -> Proximity {
    match queries::closest_distance(c1.shape(), c1.position(), c2.shape(), c2.position(), prediction) {
        Some(distance) if distance <= 0.0 => Proximity::Intersecting,
        Some(distance) if distance <= prediction => Proximity::WithinMargin,
        _ => Proximity::Disjoint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::ColliderBuilder;
    use crate::core::rigidbody::RigidBodyBuilder;
    use crate::math::{Dim2, Dim3};
    use crate::utils::allocator::RigidBodyHandle;
    use glam::{Vec2, Vec3};

    struct Scene<D: Dim> {
        bodies: RigidBodySet<D>,
        colliders: ColliderSet<D>,
    }

    impl<D: Dim> Scene<D> {
        fn new() -> Self {
            Self {
                bodies: RigidBodySet::new(),
                colliders: ColliderSet::new(),
            }
        }

        fn add(&mut self, body: RigidBodyBuilder<D>, collider: ColliderBuilder<D>) -> (RigidBodyHandle, ColliderHandle) {
            let body = self.bodies.insert(body.build().unwrap());
            let collider = self
                .colliders
                .insert(collider.build().unwrap(), body, &mut self.bodies)
                .unwrap();
            (body, collider)
        }

        fn all_pairs(&self) -> Vec<PairKey> {
            let handles: Vec<ColliderHandle> = self.colliders.iter().map(|(h, _)| h).collect();
            let mut pairs = Vec::new();
            for (i, a) in handles.iter().enumerate() {
                for b in &handles[i + 1..] {
                    pairs.push((*a, *b));
                }
            }
            pairs
        }
    }

    #[test]
    fn touching_balls_start_then_stop() {
        let mut scene = Scene::<Dim3>::new();
        let (_, a) = scene.add(RigidBodyBuilder::dynamic(), ColliderBuilder::ball(0.5));
        let (body_b, b) = scene.add(
            RigidBodyBuilder::dynamic().translation(Vec3::new(0.9, 0.0, 0.0)),
            ColliderBuilder::ball(0.5),
        );
        let params = IntegrationParameters::default();
        let mut narrow = NarrowPhase::new();
        let mut events = EventQueue::new();

        narrow.update(&params, &scene.all_pairs(), &scene.bodies, &scene.colliders, false, &mut events);
        let started: Vec<ContactEvent> = events.drain_contact_events().collect();
        assert_eq!(started, vec![ContactEvent::Started(a, b)]);

        scene.bodies.get_mut(body_b).unwrap().set_translation(Vec3::new(3.0, 0.0, 0.0), true);
        scene.colliders.update_all_positions(&scene.bodies);
        narrow.update(&params, &scene.all_pairs(), &scene.bodies, &scene.colliders, false, &mut events);
        let stopped: Vec<ContactEvent> = events.drain_contact_events().collect();
        assert_eq!(stopped, vec![ContactEvent::Stopped(a, b)]);
    }

    #[test]
    fn static_pairs_are_ignored() {
        let mut scene = Scene::<Dim2>::new();
        scene.add(RigidBodyBuilder::fixed(), ColliderBuilder::ball(1.0));
        scene.add(RigidBodyBuilder::fixed(), ColliderBuilder::ball(1.0));
        let mut narrow = NarrowPhase::new();
        let mut events = EventQueue::new();
        narrow.update(
            &IntegrationParameters::default(),
            &scene.all_pairs(),
            &scene.bodies,
            &scene.colliders,
            false,
            &mut events,
        );
        assert_eq!(narrow.contact_pairs().count(), 0);
        assert!(events.is_empty());
    }

    #[test]
    fn sensors_report_proximity_transitions() {
        let mut scene = Scene::<Dim2>::new();
        let (_, sensor) = scene.add(RigidBodyBuilder::fixed(), ColliderBuilder::cuboid(Vec2::splat(1.0)).sensor(true));
        let (body, ball) = scene.add(
            RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 5.0)),
            ColliderBuilder::ball(0.5),
        );
        let params = IntegrationParameters::default();
        let mut narrow = NarrowPhase::new();
        let mut events = EventQueue::new();

        narrow.update(&params, &scene.all_pairs(), &scene.bodies, &scene.colliders, false, &mut events);
        assert_eq!(narrow.proximity(sensor, ball), Some(Proximity::Disjoint));
        assert_eq!(events.proximity_event_count(), 0);

        scene.bodies.get_mut(body).unwrap().set_translation(Vec2::new(0.0, 1.2), true);
        scene.colliders.update_all_positions(&scene.bodies);
        narrow.update(&params, &scene.all_pairs(), &scene.bodies, &scene.colliders, false, &mut events);
        let changes: Vec<ProximityEvent> = events.drain_proximity_events().collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].prev_status, Proximity::Disjoint);
        assert_eq!(changes[0].new_status, Proximity::Intersecting);
        assert!(narrow.contact_pairs().next().is_none());
    }

    #[test]
    fn removing_a_collider_stops_its_contacts() {
        let mut scene = Scene::<Dim2>::new();
        let (_, ground) = scene.add(RigidBodyBuilder::fixed(), ColliderBuilder::cuboid(Vec2::new(5.0, 0.5)));
        let (_, ball) = scene.add(
            RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 0.95)),
            ColliderBuilder::ball(0.5),
        );
        let mut narrow = NarrowPhase::new();
        let mut events = EventQueue::new();
        narrow.update(
            &IntegrationParameters::default(),
            &scene.all_pairs(),
            &scene.bodies,
            &scene.colliders,
            true,
            &mut events,
        );
        events.clear();
        narrow.remove_collider(ball, &mut events);
        let stopped: Vec<ContactEvent> = events.drain_contact_events().collect();
        assert_eq!(stopped, vec![ContactEvent::Stopped(ground, ball)]);
        assert!(narrow.contact_pair(ground, ball).is_none());
    }

    #[test]
    fn groups_filter_pairs() {
        use crate::core::collider::CollisionGroups;
        let mut scene = Scene::<Dim3>::new();
        scene.add(
            RigidBodyBuilder::dynamic(),
            ColliderBuilder::ball(1.0).collision_groups(CollisionGroups::new(0b01, 0b01)),
        );
        scene.add(
            RigidBodyBuilder::dynamic(),
            ColliderBuilder::ball(1.0).collision_groups(CollisionGroups::new(0b10, 0b10)),
        );
        let mut narrow = NarrowPhase::new();
        let mut events = EventQueue::new();
        narrow.update(
            &IntegrationParameters::default(),
            &scene.all_pairs(),
            &scene.bodies,
            &scene.colliders,
            false,
            &mut events,
        );
        assert_eq!(narrow.contact_pairs().count(), 0);
    }
}
