//! Core types describing bodies, colliders, joints and shared data.

pub mod types;
pub mod mesh;
pub mod rigidbody;
pub mod collider;
pub mod joint;

pub use types::{CombineRule, MassProperties, Material, Transform, Velocity};
pub use mesh::{Aabb, HeightField, MeshBuilder, TriMesh};
pub use rigidbody::{Activation, BodyStatus, RigidBody, RigidBodyBuilder, RigidBodySet};
pub use collider::{Collider, ColliderBuilder, ColliderSet, CollisionGroups};
pub use joint::{Joint, JointBuilder, JointKind, JointLimits, JointMotor, JointSet};
