//! A file together with its snapshot diff list.
//!
//! All structural changes driven by deletion go through
//! [`VersionedFile::remove_and_combine`] and [`VersionedFile::delete_current`],
//! which are the only paths that release blocks, and through
//! [`VersionedFile::truncate`], which collects a cut tail at once when no
//! snapshot can reach it.

use crate::collect::{BlockCollector, collect_all, collect_blocks_beyond, hand_off};
use crate::diff::SnapshotDiff;
use crate::diff_list::{DiffList, DiffRemoval};
use crate::file_node::{FileAttributes, FileNode};
use crate::replication::required_replication;
use nnsnap_error::Result;
use nnsnap_types::{BlockDescriptor, FileView, Replication, SnapshotId, total_len};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a snapshot deletion changed the diff list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffChange {
    Unchanged,
    Retagged { to: SnapshotId },
    Removed,
}

/// Block-level decision produced by a combination pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineOutcome {
    pub change: DiffChange,
    /// Largest size any surviving view needs.
    pub max_size: u64,
    pub kept_blocks: usize,
    pub collected_blocks: usize,
    /// Truncated-away blocks released because no snapshot reaches them now.
    pub released_blocks: usize,
    /// The file node and its diff list are gone; the owner drops them.
    pub destroyed: bool,
}

/// A block cut off the live file while a snapshot still covered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedBlock {
    /// Newest snapshot taken before the cut. Only views at or before it
    /// can reach the block.
    pub bound: SnapshotId,
    /// Byte offset of the block in the file when it was cut.
    pub offset: u64,
    pub block: BlockDescriptor,
}

/// Persistable state of a versioned file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub attributes: FileAttributes,
    pub blocks: Vec<BlockDescriptor>,
    pub deleted: bool,
    pub diffs: Vec<SnapshotDiff<FileAttributes>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retained: Vec<RetainedBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedFile {
    node: FileNode,
    diffs: DiffList<FileAttributes>,
    retained: Vec<RetainedBlock>,
}

impl VersionedFile {
    #[must_use]
    pub fn new(node: FileNode) -> Self {
        Self {
            node,
            diffs: DiffList::new(),
            retained: Vec::new(),
        }
    }

    /// Rebuild from persisted state, validating diff order.
    pub fn restore(state: FileState) -> Result<Self> {
        let diffs = DiffList::from_records(state.diffs)?;
        let mut node = FileNode::with_blocks(state.attributes, state.blocks);
        node.restore_deleted(state.deleted);
        Ok(Self {
            node,
            diffs,
            retained: state.retained,
        })
    }

    #[must_use]
    pub fn state(&self) -> FileState {
        FileState {
            attributes: *self.node.attributes(),
            blocks: self.node.blocks().to_vec(),
            deleted: self.node.is_deleted(),
            diffs: self.diffs.records().to_vec(),
            retained: self.retained.clone(),
        }
    }

    #[must_use]
    pub fn node(&self) -> &FileNode {
        &self.node
    }

    /// Mutable access for live writes. Call [`Self::record_content_change`]
    /// or [`Self::record_attribute_change`] first when a snapshot exists.
    pub fn node_mut(&mut self) -> &mut FileNode {
        &mut self.node
    }

    #[must_use]
    pub fn diffs(&self) -> &DiffList<FileAttributes> {
        &self.diffs
    }

    /// Truncated-away blocks still reachable from some snapshot.
    #[must_use]
    pub fn retained(&self) -> &[RetainedBlock] {
        &self.retained
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.node.is_deleted()
    }

    /// Copy-on-write hook before content changes: record the size as of
    /// `latest` if no diff exists for it yet.
    pub fn record_content_change(&mut self, latest: SnapshotId) -> Result<bool> {
        self.diffs.ensure_latest(latest, &self.node)
    }

    /// Hook before an attribute change: record the attributes as of
    /// `latest` as well as the size.
    pub fn record_attribute_change(&mut self, latest: SnapshotId) -> Result<bool> {
        self.diffs.save_metadata(latest, &self.node)
    }

    /// Cut the live block list down to `keep` blocks and return the tail.
    ///
    /// `latest` is the newest snapshot containing the file, if any. Its
    /// diff is recorded first and the tail is retained until no view at or
    /// before it covers the blocks. Without a snapshot the tail is
    /// collected immediately.
    pub fn truncate(
        &mut self,
        keep: usize,
        latest: Option<SnapshotId>,
        collector: &mut dyn BlockCollector,
    ) -> Result<Vec<BlockDescriptor>> {
        if let Some(latest) = latest {
            self.record_content_change(latest)?;
        }
        let kept = keep.min(self.node.blocks().len());
        let mut offset = total_len(&self.node.blocks()[..kept]);
        let displaced = self.node.truncate_blocks(keep);
        match latest {
            Some(bound) => {
                for block in &displaced {
                    self.retained.push(RetainedBlock {
                        bound,
                        offset,
                        block: *block,
                    });
                    offset = offset.saturating_add(block.len);
                }
            }
            None => {
                hand_off(displaced.clone(), collector);
            }
        }
        debug!(
            target: "nnsnap::combine",
            event = "file_truncate",
            keep,
            displaced = displaced.len(),
            retained = self.retained.len()
        );
        Ok(displaced)
    }

    /// Size of the file as of `snapshot`.
    #[must_use]
    pub fn size_at(&self, snapshot: SnapshotId) -> u64 {
        self.diffs
            .diff_at(snapshot)
            .map_or_else(|| self.node.current_size(), SnapshotDiff::size_at_snapshot)
    }

    /// Size and replication as of `snapshot`.
    #[must_use]
    pub fn view_at(&self, snapshot: SnapshotId) -> FileView {
        let replication = self
            .diffs
            .metadata_at(snapshot)
            .map_or_else(|| self.node.replication(), |copy| copy.replication);
        FileView {
            size: self.size_at(snapshot),
            replication,
        }
    }

    /// Live view, `None` once the current file is deleted.
    #[must_use]
    pub fn current_view(&self) -> Option<FileView> {
        (!self.node.is_deleted()).then(|| FileView {
            size: self.node.current_size(),
            replication: self.node.replication(),
        })
    }

    /// Smallest size that still satisfies every surviving view.
    #[must_use]
    pub fn max_reachable_size(&self) -> u64 {
        let recorded = self.diffs.max_recorded_size().unwrap_or(0);
        if self.node.is_deleted() {
            recorded
        } else {
            recorded.max(self.node.current_size())
        }
    }

    #[must_use]
    pub fn required_replication(&self) -> Replication {
        let live = (!self.node.is_deleted()).then(|| self.node.replication());
        required_replication(live, &self.diffs)
    }

    /// Check that [`Self::remove_and_combine`] would succeed, without
    /// changing anything.
    pub fn check_combine(&self, snapshot: SnapshotId, prior: Option<SnapshotId>) -> Result<()> {
        self.diffs.check_remove(snapshot, prior)
    }

    /// Delete `snapshot` from this file's history and reclaim what no
    /// surviving view reaches.
    ///
    /// `prior` is the newest surviving snapshot older than `snapshot` that
    /// contains this file. A snapshot without a diff leaves the diff list
    /// alone; the collection pass still runs and is a no-op for a live file.
    pub fn remove_and_combine(
        &mut self,
        snapshot: SnapshotId,
        prior: Option<SnapshotId>,
        collector: &mut dyn BlockCollector,
    ) -> Result<CombineOutcome> {
        self.diffs.verify_order()?;
        let change = match self.diffs.remove(snapshot, prior)? {
            DiffRemoval::Absent => DiffChange::Unchanged,
            DiffRemoval::Retagged { to } => DiffChange::Retagged { to },
            DiffRemoval::Removed(_) => DiffChange::Removed,
        };
        let outcome = self.collect_blocks_and_clear(change, collector);
        debug!(
            target: "nnsnap::combine",
            event = "snapshot_combine",
            snapshot = snapshot.0,
            prior = ?prior,
            change = ?outcome.change,
            max_size = outcome.max_size,
            kept = outcome.kept_blocks,
            collected = outcome.collected_blocks,
            released = outcome.released_blocks,
            destroyed = outcome.destroyed
        );
        Ok(outcome)
    }

    /// Delete the live file. Blocks still reachable from a snapshot stay.
    pub fn delete_current(&mut self, collector: &mut dyn BlockCollector) -> CombineOutcome {
        self.node.mark_deleted();
        let outcome = self.collect_blocks_and_clear(DiffChange::Unchanged, collector);
        debug!(
            target: "nnsnap::combine",
            event = "file_delete",
            remaining_diffs = self.diffs.len(),
            max_size = outcome.max_size,
            collected = outcome.collected_blocks,
            released = outcome.released_blocks,
            destroyed = outcome.destroyed
        );
        outcome
    }

    fn collect_blocks_and_clear(
        &mut self,
        change: DiffChange,
        collector: &mut dyn BlockCollector,
    ) -> CombineOutcome {
        if self.node.is_deleted() && self.diffs.is_empty() {
            let collected_blocks = collect_all(&mut self.node, collector);
            let released_blocks = self.release_retained(collector);
            return CombineOutcome {
                change,
                max_size: 0,
                kept_blocks: 0,
                collected_blocks,
                released_blocks,
                destroyed: true,
            };
        }

        let max_size = self.max_reachable_size();
        let collected_blocks = collect_blocks_beyond(&mut self.node, max_size, collector);
        let released_blocks = self.release_retained(collector);
        CombineOutcome {
            change,
            max_size,
            kept_blocks: self.node.blocks().len(),
            collected_blocks,
            released_blocks,
            destroyed: false,
        }
    }

    /// Collect retained blocks that no remaining view covers: a view at or
    /// before the block's bound reaches it only if its size passes the
    /// block's offset.
    fn release_retained(&mut self, collector: &mut dyn BlockCollector) -> usize {
        if self.retained.is_empty() {
            return 0;
        }
        let diffs = &self.diffs;
        let (kept, released): (Vec<RetainedBlock>, Vec<RetainedBlock>) =
            self.retained.drain(..).partition(|retained| {
                diffs
                    .iter()
                    .take_while(|diff| diff.snapshot() <= retained.bound)
                    .map(SnapshotDiff::size_at_snapshot)
                    .max()
                    .is_some_and(|size| size > retained.offset)
            });
        self.retained = kept;
        hand_off(released.into_iter().map(|r| r.block).collect(), collector)
    }
}
