//! Collision detection modules: shapes, GJK/EPA, broad-phase, narrow-phase, contact manifolds, queries, CCD.

pub mod shapes;
pub mod gjk;
pub mod epa;
pub mod clipping;
pub mod queries;
pub mod contact;
pub mod broadphase;
pub mod narrowphase;
pub mod ccd;

pub use broadphase::{BroadPhase, SpatialGrid};
pub use ccd::{CCDSolver, Impact};
pub use contact::{ContactManifold, ContactPoint};
pub use narrowphase::{ContactPair, NarrowPhase, PairKey, Proximity};
pub use queries::{Motion, Ray, RayIntersection};
pub use shapes::{Shape, ShapeKind};
