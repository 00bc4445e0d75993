//! Replication required by the union of all views of a file.

use crate::diff_list::DiffList;
use crate::file_node::FileAttributes;
use nnsnap_types::Replication;

/// Anything that records a replication factor.
pub trait ReplicationSource {
    fn replication(&self) -> Replication;
}

impl ReplicationSource for FileAttributes {
    fn replication(&self) -> Replication {
        self.replication
    }
}

/// Max of the live replication (if the live file exists) and every
/// replication recorded in a diff's attribute copy.
#[must_use]
pub fn required_replication<C>(live: Option<Replication>, diffs: &DiffList<C>) -> Replication
where
    C: ReplicationSource + Clone,
{
    diffs
        .iter()
        .filter_map(|diff| diff.metadata_snapshot().map(ReplicationSource::replication))
        .fold(live.unwrap_or(Replication::NONE), Replication::max)
}

/// Remembers the last replication reported to the pipeline so that only
/// changes, upward or downward, are forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationReconciler {
    reported: Option<Replication>,
}

impl ReplicationReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value to send when `required` differs from what was last
    /// reported.
    pub fn reconcile(&mut self, required: Replication) -> Option<Replication> {
        if self.reported == Some(required) {
            return None;
        }
        self.reported = Some(required);
        Some(required)
    }

    #[must_use]
    pub fn reported(&self) -> Option<Replication> {
        self.reported
    }
}
