//! Versioned binary snapshots of a whole simulation.
//!
//! Layout: the 4 magic bytes `RBSN`, a little-endian `u32` format version, one byte
//! holding the dimension, then a MessagePack payload with named fields.

use serde::{Deserialize, Serialize};

use crate::collision::broadphase::BroadPhase;
use crate::collision::narrowphase::NarrowPhase;
use crate::config::IntegrationParameters;
use crate::core::collider::ColliderSet;
use crate::core::joint::JointSet;
use crate::core::rigidbody::RigidBodySet;
use crate::error::SnapshotError;
use crate::math::Dim;

use super::query::QueryPipeline;

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RBSN";
pub const SNAPSHOT_VERSION: u32 = 1;
const HEADER_LEN: usize = 9;

/// Owned world state decoded from a snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "")]
pub struct WorldSnapshot<D: Dim> {
    pub gravity: D::Vector,
    pub params: IntegrationParameters,
    pub broad_phase: BroadPhase<D>,
    pub narrow_phase: NarrowPhase<D>,
    pub bodies: RigidBodySet<D>,
    pub colliders: ColliderSet<D>,
    pub joints: JointSet<D>,
    pub query_pipeline: QueryPipeline<D>,
}

impl<D: Dim> WorldSnapshot<D> {
    /// Cross-set references must all resolve: collider parents and body collider lists
    /// agree, joints and narrow-phase pairs point at live objects.
    fn check_links(&self) -> Result<(), SnapshotError> {
        let broken = |what: String| Err(SnapshotError::Inconsistent(what));
        for (handle, collider) in self.colliders.iter() {
            let parent = collider.parent();
            match self.bodies.get(parent) {
                None => return broken(format!("collider {handle:?} has dead parent {parent:?}")),
                Some(body) if !body.colliders().contains(&handle) => {
                    return broken(format!("body {parent:?} does not list its collider {handle:?}"))
                }
                Some(_) => {}
            }
        }
        for (handle, body) in self.bodies.iter() {
            for collider in body.colliders() {
                if self.colliders.get(*collider).map(|c| c.parent()) != Some(handle) {
                    return broken(format!("body {handle:?} lists foreign collider {collider:?}"));
                }
            }
        }
        for (handle, joint) in self.joints.iter() {
            if !self.bodies.contains(joint.body1) || !self.bodies.contains(joint.body2) {
                return broken(format!("joint {handle:?} attaches a dead body"));
            }
        }
        let pairs = self
            .narrow_phase
            .contact_pairs()
            .map(|pair| (pair.collider1, pair.collider2))
            .chain(self.narrow_phase.proximity_pairs().map(|(a, b, _)| (a, b)));
        for (a, b) in pairs {
            if !self.colliders.contains(a) || !self.colliders.contains(b) {
                return broken(format!("narrow-phase pair ({a:?}, {b:?}) refers to a dead collider"));
            }
        }
        Ok(())
    }
}

/// Borrowed view with the same field names as [`WorldSnapshot`].
#[derive(Serialize)]
#[serde(bound = "")]
struct WorldSnapshotRef<'a, D: Dim> {
    gravity: D::Vector,
    params: &'a IntegrationParameters,
    broad_phase: &'a BroadPhase<D>,
    narrow_phase: &'a NarrowPhase<D>,
    bodies: &'a RigidBodySet<D>,
    colliders: &'a ColliderSet<D>,
    joints: &'a JointSet<D>,
    query_pipeline: &'a QueryPipeline<D>,
}

/// Header fields of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub version: u32,
    pub dimension: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerializationPipeline;

impl SerializationPipeline {
    pub fn new() -> Self {
        Self
    }

    /// Encodes every part of a world into one snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn serialize_all<D: Dim>(
        &self,
        gravity: D::Vector,
        params: &IntegrationParameters,
        broad_phase: &BroadPhase<D>,
        narrow_phase: &NarrowPhase<D>,
        bodies: &RigidBodySet<D>,
        colliders: &ColliderSet<D>,
        joints: &JointSet<D>,
        query_pipeline: &QueryPipeline<D>,
    ) -> Result<Vec<u8>, SnapshotError> {
        let snapshot = WorldSnapshotRef {
            gravity,
            params,
            broad_phase,
            narrow_phase,
            bodies,
            colliders,
            joints,
            query_pipeline,
        };
        let payload = rmp_serde::to_vec_named(&snapshot)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        bytes.push(D::TAG);
        bytes.extend_from_slice(&payload);
        log::debug!(
            "encoded {}D snapshot: {} bodies, {} colliders, {} bytes",
            D::TAG,
            bodies.len(),
            colliders.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Validates the header without decoding the payload.
    pub fn read_header(&self, bytes: &[u8]) -> Result<SnapshotHeader, SnapshotError> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::Truncated {
                len: bytes.len(),
                needed: HEADER_LEN,
            });
        }
        if bytes[..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(SnapshotHeader {
            version,
            dimension: bytes[8],
        })
    }

    /// Decodes a snapshot written by [`serialize_all`](Self::serialize_all) for the same dimension.
    pub fn deserialize_all<D: Dim>(&self, bytes: &[u8]) -> Result<WorldSnapshot<D>, SnapshotError> {
        let header = self.read_header(bytes)?;
        if header.dimension != D::TAG {
            return Err(SnapshotError::DimensionMismatch {
                found: header.dimension,
                expected: D::TAG,
            });
        }
        let snapshot: WorldSnapshot<D> = rmp_serde::from_slice(&bytes[HEADER_LEN..])?;
        snapshot.check_links()?;
        log::debug!(
            "decoded {}D snapshot: {} bodies, {} colliders",
            D::TAG,
            snapshot.bodies.len(),
            snapshot.colliders.len()
        );
        Ok(snapshot)
    }
}
