use crate::replication::ReplicationSource;
use nnsnap_types::SnapshotId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An entity whose history can be recorded in a diff list.
///
/// `Copy` is the detached attribute copy stored in a diff when an
/// attribute changes after a snapshot; it must not reference content.
pub trait DiffSubject {
    type Copy: Clone + fmt::Debug;

    fn current_size(&self) -> u64;

    /// Detached copy of the entity's attributes with content cleared.
    fn snapshot_copy(&self) -> Self::Copy;
}

/// What must be restored to recover the entity as of `snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff<C> {
    snapshot: SnapshotId,
    size_at_snapshot: u64,
    metadata_snapshot: Option<C>,
}

impl<C> SnapshotDiff<C> {
    /// Rebuild a diff from persisted fields.
    #[must_use]
    pub fn new(snapshot: SnapshotId, size_at_snapshot: u64, metadata_snapshot: Option<C>) -> Self {
        Self {
            snapshot,
            size_at_snapshot,
            metadata_snapshot,
        }
    }

    /// Cheap diff for the first content change after `snapshot`: records the
    /// size only, attributes are inherited from the successor.
    #[must_use]
    pub fn create<E>(snapshot: SnapshotId, subject: &E) -> Self
    where
        E: DiffSubject<Copy = C>,
    {
        Self {
            snapshot,
            size_at_snapshot: subject.current_size(),
            metadata_snapshot: None,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SnapshotId {
        self.snapshot
    }

    #[must_use]
    pub fn size_at_snapshot(&self) -> u64 {
        self.size_at_snapshot
    }

    #[must_use]
    pub fn metadata_snapshot(&self) -> Option<&C> {
        self.metadata_snapshot.as_ref()
    }

    pub(crate) fn retag(&mut self, snapshot: SnapshotId) {
        self.snapshot = snapshot;
    }

    pub(crate) fn metadata_slot(&mut self) -> &mut Option<C> {
        &mut self.metadata_snapshot
    }
}

impl<C: ReplicationSource> fmt::Display for SnapshotDiff<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} size={}, rep=", self.snapshot, self.size_at_snapshot)?;
        match &self.metadata_snapshot {
            Some(copy) => write!(f, "{}", copy.replication()),
            None => f.write_str("?"),
        }
    }
}
