use thiserror::Error;

/// Errors raised while validating descriptors or inserting into the sets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("handle does not refer to a live object")]
    InvalidHandle,
}

/// Errors raised while encoding or decoding a world snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot truncated: {len} bytes, header needs {needed}")]
    Truncated { len: usize, needed: usize },
    #[error("snapshot does not start with the expected magic bytes")]
    BadMagic,
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("snapshot stores a {found}D world but a {expected}D world was requested")]
    DimensionMismatch { found: u8, expected: u8 },
    #[error("snapshot payload could not be decoded: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("snapshot payload is inconsistent: {0}")]
    Inconsistent(String),
    #[error("snapshot payload could not be encoded: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
