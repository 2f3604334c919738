//! Utility helpers: generational allocation, logging and profiling.

pub mod allocator;
pub mod logging;
pub mod profiling;

pub use allocator::{Arena, ColliderHandle, EntityId, GenerationalId, JointHandle, RigidBodyHandle};
pub use profiling::PhysicsProfiler;
