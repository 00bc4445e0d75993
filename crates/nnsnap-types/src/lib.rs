#![forbid(unsafe_code)]
//! Identifier and descriptor types shared across nnsnap crates.
//!
//! Every identifier is a unit-carrying newtype so block ids, file ids and
//! snapshot ids cannot be mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of one storage block, assigned by the block map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u64);

/// Namespace-assigned file identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub u64);

/// Snapshot identifier, totally ordered by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub u64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Block replication factor.
///
/// `Replication(0)` only appears as the reconciled requirement of a file
/// whose live copy is deleted and whose snapshots record no attributes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Replication(pub u16);

impl Replication {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Replication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of one storage block: identity and byte length.
///
/// Owned by the block map; nnsnap only reads `len` and passes the
/// descriptor back on collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub id: BlockId,
    pub len: u64,
}

impl BlockDescriptor {
    #[must_use]
    pub fn new(id: BlockId, len: u64) -> Self {
        Self { id, len }
    }
}

/// Total byte length of a block sequence.
///
/// Saturates instead of wrapping; a block list whose length overflows
/// `u64` cannot be produced by the namespace.
#[must_use]
pub fn total_len(blocks: &[BlockDescriptor]) -> u64 {
    blocks
        .iter()
        .fold(0_u64, |acc, block| acc.saturating_add(block.len))
}

/// Materialized view of a file, live or as of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileView {
    pub size: u64,
    pub replication: Replication,
}
