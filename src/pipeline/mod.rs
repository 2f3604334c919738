//! Step orchestration, spatial queries, events and world snapshots.

pub mod events;
pub mod physics;
pub mod query;
pub mod serialization;

pub use events::{ContactEvent, EventQueue, ProximityEvent};
pub use physics::PhysicsPipeline;
pub use query::{QueryFilter, QueryPipeline};
pub use serialization::{SerializationPipeline, SnapshotHeader, WorldSnapshot};
