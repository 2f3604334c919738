//! Rigid Physics – a 2D/3D rigid-body simulation engine for Rust.
//!
//! Every simulation type is generic over a [`math::Dim`] implementation, so the same
//! broad phase, narrow phase, island builder and constraint solver drive both
//! [`PhysicsWorld2D`] and [`PhysicsWorld3D`]. The low-level pieces stay public for
//! callers that want to run [`PhysicsPipeline::step`] on their own sets.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod utils;
pub mod world;

pub use glam::{Quat, Vec2, Vec3};

pub use collision::{
    broadphase::BroadPhase,
    narrowphase::{NarrowPhase, Proximity},
    queries::{Ray, RayIntersection},
    shapes::Shape,
};
pub use config::IntegrationParameters;
pub use core::{
    collider::{Collider, ColliderBuilder, ColliderSet, CollisionGroups},
    joint::{Joint, JointBuilder, JointKind, JointLimits, JointMotor, JointSet},
    rigidbody::{BodyStatus, RigidBody, RigidBodyBuilder, RigidBodySet},
    types::{CombineRule, MassProperties, Material, Transform, Velocity},
};
pub use dynamics::forces::{DragForce, ForceGenerator, ForceRegistry, SpringForce};
pub use error::{PhysicsError, PhysicsResult, SnapshotError};
pub use math::{Dim, Dim2, Dim3, Real};
pub use pipeline::{
    events::{ContactEvent, EventQueue, ProximityEvent},
    physics::PhysicsPipeline,
    query::{QueryFilter, QueryPipeline},
    serialization::SerializationPipeline,
};
pub use utils::allocator::{ColliderHandle, JointHandle, RigidBodyHandle};
pub use utils::profiling::PhysicsProfiler;
pub use world::{PhysicsWorld, PhysicsWorld2D, PhysicsWorld3D};
