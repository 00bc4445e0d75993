//! Chronologically ordered diff list.
//!
//! Diffs are kept in one owned `Vec` sorted by ascending snapshot id. Index
//! 0 is the oldest boundary; walking forward ends at the live entity. Point
//! lookups are binary searches over that order.

use crate::diff::{DiffSubject, SnapshotDiff};
use nnsnap_error::{Result, SnapError};
use nnsnap_types::SnapshotId;
use serde::{Deserialize, Serialize};
use tracing::debug;

enum Removal {
    Absent,
    Retag(usize, SnapshotId),
    Remove(usize),
}

/// Structural effect of removing a snapshot from a diff list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRemoval<C> {
    /// No diff recorded for the snapshot; the entity was untouched since.
    Absent,
    /// The diff now stands for `to`, an older surviving snapshot that had no
    /// diff of its own and therefore shares the same state.
    Retagged { to: SnapshotId },
    /// The diff was discarded and the list relinked.
    Removed(SnapshotDiff<C>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffList<C> {
    diffs: Vec<SnapshotDiff<C>>,
}

impl<C> Default for DiffList<C> {
    fn default() -> Self {
        Self { diffs: Vec::new() }
    }
}

impl<C: Clone> DiffList<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted list, rejecting records that are not strictly
    /// ascending by snapshot id.
    pub fn from_records(records: Vec<SnapshotDiff<C>>) -> Result<Self> {
        let list = Self { diffs: records };
        list.verify_order()?;
        Ok(list)
    }

    /// Check the ascending-order invariant.
    pub fn verify_order(&self) -> Result<()> {
        for pair in self.diffs.windows(2) {
            let (previous, next) = (pair[0].snapshot(), pair[1].snapshot());
            if previous == next {
                return Err(SnapError::DuplicateSnapshot {
                    snapshot: next.0,
                });
            }
            if previous > next {
                return Err(SnapError::InconsistentDiffOrder {
                    previous: previous.0,
                    next: next.0,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotDiff<C>> {
        self.diffs.iter()
    }

    /// Read-only view of the ordered records, for persistence.
    #[must_use]
    pub fn records(&self) -> &[SnapshotDiff<C>] {
        &self.diffs
    }

    #[must_use]
    pub fn last(&self) -> Option<&SnapshotDiff<C>> {
        self.diffs.last()
    }

    #[must_use]
    pub fn last_snapshot(&self) -> Option<SnapshotId> {
        self.diffs.last().map(SnapshotDiff::snapshot)
    }

    fn search(&self, snapshot: SnapshotId) -> std::result::Result<usize, usize> {
        self.diffs.binary_search_by_key(&snapshot, SnapshotDiff::snapshot)
    }

    fn first_at_or_after(&self, snapshot: SnapshotId) -> usize {
        self.diffs.partition_point(|diff| diff.snapshot() < snapshot)
    }

    /// The diff recorded for exactly `snapshot`.
    #[must_use]
    pub fn get(&self, snapshot: SnapshotId) -> Option<&SnapshotDiff<C>> {
        self.search(snapshot).ok().map(|idx| &self.diffs[idx])
    }

    /// The diff with the smallest snapshot id `>= snapshot`.
    ///
    /// `None` means the live state applies to `snapshot`.
    #[must_use]
    pub fn diff_at(&self, snapshot: SnapshotId) -> Option<&SnapshotDiff<C>> {
        self.diffs.get(self.first_at_or_after(snapshot))
    }

    /// Attribute copy in effect at `snapshot`: the first recorded copy at or
    /// after it. `None` means the live attributes apply.
    #[must_use]
    pub fn metadata_at(&self, snapshot: SnapshotId) -> Option<&C> {
        let start = self.first_at_or_after(snapshot);
        self.diffs[start..]
            .iter()
            .find_map(SnapshotDiff::metadata_snapshot)
    }

    /// Largest `size_at_snapshot` across all diffs.
    #[must_use]
    pub fn max_recorded_size(&self) -> Option<u64> {
        self.diffs.iter().map(SnapshotDiff::size_at_snapshot).max()
    }

    /// Insert a fresh diff for `snapshot` capturing `subject`'s current size.
    pub fn insert<E>(&mut self, snapshot: SnapshotId, subject: &E) -> Result<&mut SnapshotDiff<C>>
    where
        E: DiffSubject<Copy = C>,
    {
        match self.search(snapshot) {
            Ok(_) => Err(SnapError::DuplicateSnapshot {
                snapshot: snapshot.0,
            }),
            Err(idx) => {
                let diff = SnapshotDiff::create(snapshot, subject);
                debug!(
                    target: "nnsnap::diff",
                    event = "diff_create",
                    snapshot = snapshot.0,
                    size = diff.size_at_snapshot(),
                    index = idx
                );
                self.diffs.insert(idx, diff);
                Ok(&mut self.diffs[idx])
            }
        }
    }

    /// Make sure the newest diff is for `latest`, creating it if the entity
    /// has not changed since that snapshot was taken.
    ///
    /// Returns `true` when a diff was created. A newest diff younger than
    /// `latest` means the caller handed in a stale snapshot.
    pub fn ensure_latest<E>(&mut self, latest: SnapshotId, subject: &E) -> Result<bool>
    where
        E: DiffSubject<Copy = C>,
    {
        match self.last_snapshot() {
            Some(last) if last == latest => Ok(false),
            Some(last) if last > latest => Err(SnapError::InconsistentDiffOrder {
                previous: last.0,
                next: latest.0,
            }),
            _ => {
                self.insert(latest, subject)?;
                Ok(true)
            }
        }
    }

    /// Record `subject`'s attributes in the diff for `latest` before an
    /// attribute change. The first copy wins: later changes inside the same
    /// snapshot interval do not overwrite it.
    ///
    /// The copy is taken from `subject` as it is now, so every change that
    /// touches an attribute (including content writes that move the
    /// modification time) must call this before mutating.
    pub fn save_metadata<E>(&mut self, latest: SnapshotId, subject: &E) -> Result<bool>
    where
        E: DiffSubject<Copy = C>,
    {
        self.ensure_latest(latest, subject)?;
        let Some(diff) = self.diffs.last_mut() else {
            return Ok(false);
        };
        let slot = diff.metadata_slot();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(subject.snapshot_copy());
        debug!(
            target: "nnsnap::diff",
            event = "diff_save_metadata",
            snapshot = latest.0
        );
        Ok(true)
    }

    /// Decide what removing `snapshot` does, without touching the list.
    fn plan_removal(&self, snapshot: SnapshotId, prior: Option<SnapshotId>) -> Result<Removal> {
        let Ok(idx) = self.search(snapshot) else {
            return Ok(Removal::Absent);
        };
        let Some(prior) = prior else {
            return Ok(Removal::Remove(idx));
        };
        if prior >= snapshot {
            return Err(SnapError::InconsistentDiffOrder {
                previous: prior.0,
                next: snapshot.0,
            });
        }
        match idx.checked_sub(1).map(|i| self.diffs[i].snapshot()) {
            Some(pred) if pred == prior => Ok(Removal::Remove(idx)),
            Some(pred) if pred > prior => Err(SnapError::InconsistentDiffOrder {
                previous: pred.0,
                next: prior.0,
            }),
            _ => Ok(Removal::Retag(idx, prior)),
        }
    }

    /// Validate order and the removal of `snapshot` without applying it.
    pub fn check_remove(&self, snapshot: SnapshotId, prior: Option<SnapshotId>) -> Result<()> {
        self.verify_order()?;
        self.plan_removal(snapshot, prior).map(|_| ())
    }

    /// Structural half of snapshot deletion.
    ///
    /// `prior` is the newest surviving snapshot older than `snapshot` in
    /// which the entity exists, if any. When `prior` has no diff of its own
    /// the removed snapshot's diff describes prior's state too, so it is
    /// re-tagged instead of dropped. Otherwise the diff is discarded and the
    /// predecessor inherits its attribute copy if it has none.
    pub fn remove(
        &mut self,
        snapshot: SnapshotId,
        prior: Option<SnapshotId>,
    ) -> Result<DiffRemoval<C>> {
        let idx = match self.plan_removal(snapshot, prior)? {
            Removal::Absent => return Ok(DiffRemoval::Absent),
            Removal::Retag(idx, prior) => {
                self.diffs[idx].retag(prior);
                debug!(
                    target: "nnsnap::diff",
                    event = "diff_retag",
                    from = snapshot.0,
                    to = prior.0
                );
                return Ok(DiffRemoval::Retagged { to: prior });
            }
            Removal::Remove(idx) => idx,
        };

        let removed = self.diffs.remove(idx);
        if let Some(pred_idx) = idx.checked_sub(1) {
            let slot = self.diffs[pred_idx].metadata_slot();
            if slot.is_none() {
                *slot = removed.metadata_snapshot().cloned();
            }
        }
        debug!(
            target: "nnsnap::diff",
            event = "diff_remove",
            snapshot = snapshot.0,
            size = removed.size_at_snapshot(),
            remaining = self.diffs.len()
        );
        Ok(DiffRemoval::Removed(removed))
    }
}
