use std::vec::Drain;

use serde::{Deserialize, Serialize};

use crate::collision::narrowphase::Proximity;
use crate::utils::allocator::ColliderHandle;

/// Start or end of contact between two non-sensor colliders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactEvent {
    Started(ColliderHandle, ColliderHandle),
    Stopped(ColliderHandle, ColliderHandle),
}

/// Proximity status change of a pair involving at least one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProximityEvent {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    pub prev_status: Proximity,
    pub new_status: Proximity,
}

/// Caller-owned buffer of events produced by `PhysicsPipeline::step`.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    contact_events: Vec<ContactEvent>,
    proximity_events: Vec<ProximityEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_contact(&mut self, event: ContactEvent) {
        self.contact_events.push(event);
    }

    pub(crate) fn push_proximity(&mut self, event: ProximityEvent) {
        self.proximity_events.push(event);
    }

    /// Moves every buffered event of `other` to the back of this queue.
    pub(crate) fn append(&mut self, other: &mut EventQueue) {
        self.contact_events.append(&mut other.contact_events);
        self.proximity_events.append(&mut other.proximity_events);
    }

    pub fn drain_contact_events(&mut self) -> Drain<'_, ContactEvent> {
        self.contact_events.drain(..)
    }

    pub fn drain_proximity_events(&mut self) -> Drain<'_, ProximityEvent> {
        self.proximity_events.drain(..)
    }

    pub fn contact_event_count(&self) -> usize {
        self.contact_events.len()
    }

    pub fn proximity_event_count(&self) -> usize {
        self.proximity_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contact_events.is_empty() && self.proximity_events.is_empty()
    }

    pub fn clear(&mut self) {
        self.contact_events.clear();
        self.proximity_events.clear();
    }
}
