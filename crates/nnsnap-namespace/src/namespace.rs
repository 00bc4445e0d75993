//! Reference namespace service.
//!
//! Owns the snapshot registry and every file's [`VersionedFile`], and drives
//! the diff core through its hooks:
//!
//! | Namespace operation | Core hook |
//! |---------------------|-----------|
//! | [`Namespace::create_snapshot`] | snapshot registration, no per-file work |
//! | `append` | [`VersionedFile::record_attribute_change`] (content writes move the modification time) |
//! | `truncate` | [`VersionedFile::record_attribute_change`], then [`VersionedFile::truncate`] |
//! | `set_replication` | [`VersionedFile::record_attribute_change`] |
//! | [`Namespace::delete_snapshot`] | [`VersionedFile::remove_and_combine`] |
//! | [`Namespace::delete_file`] | [`VersionedFile::record_attribute_change`], then [`VersionedFile::delete_current`] |
//! | [`Namespace::reconstruct_view`] | [`VersionedFile::view_at`] |
//!
//! # Concurrency
//!
//! All state sits behind one `parking_lot::RwLock`. Mutations take the
//! write lock for their whole duration; view reconstruction and state
//! export share the read lock. The pipeline mutex is only taken while the
//! state write lock is held, never the other way round; readers get at the
//! pipeline through [`Namespace::with_pipeline`], which never hands out the
//! guard.

use crate::block_map::MemoryBlockMap;
use crate::config::NamespaceConfig;
use crate::pipeline::ReplicationPipeline;
use nnsnap_diff::{
    CombineOutcome, FileAttributes, FileNode, FileState, ReplicationReconciler, VersionedFile,
};
use nnsnap_error::{Result, SnapError};
use nnsnap_types::{BlockDescriptor, FileId, FileView, Replication, SnapshotId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct FileEntry {
    file: VersionedFile,
    /// Newest snapshot taken before the file was created.
    born_after: Option<SnapshotId>,
    /// Newest snapshot taken before the live file was deleted.
    deleted_after: Option<Option<SnapshotId>>,
    reconciler: ReplicationReconciler,
}

impl FileEntry {
    fn in_snapshot(&self, snapshot: SnapshotId) -> bool {
        let born = self.born_after.is_none_or(|born| snapshot > born);
        let alive = self
            .deleted_after
            .is_none_or(|last| last.is_some_and(|last| snapshot <= last));
        born && alive
    }
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<FileId, FileEntry>,
    snapshots: BTreeSet<SnapshotId>,
    next_file: u64,
    next_snapshot: u64,
    clock: u64,
    block_map: MemoryBlockMap,
}

impl State {
    fn latest_snapshot(&self) -> Option<SnapshotId> {
        self.snapshots.last().copied()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Newest registered snapshot older than `snapshot` that contains `entry`.
    fn prior_of(&self, entry: &FileEntry, snapshot: SnapshotId) -> Option<SnapshotId> {
        self.snapshots
            .range(..snapshot)
            .rev()
            .copied()
            .find(|candidate| entry.in_snapshot(*candidate))
    }
}

/// Live file entry, for operations that modify current content.
fn live_entry(files: &mut BTreeMap<FileId, FileEntry>, file: FileId) -> Result<&mut FileEntry> {
    let entry = files
        .get_mut(&file)
        .ok_or(SnapError::FileNotFound(file.0))?;
    if entry.file.is_deleted() {
        return Err(SnapError::FileDeleted(file.0));
    }
    Ok(entry)
}

/// Per-file result of a snapshot deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileCombine {
    pub file: FileId,
    pub outcome: CombineOutcome,
}

/// Result of [`Namespace::delete_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotDeletion {
    pub snapshot: SnapshotId,
    pub files: Vec<FileCombine>,
    pub collected_blocks: usize,
    /// Truncated-away blocks released by this deletion.
    pub released_blocks: usize,
    pub destroyed_files: Vec<FileId>,
}

pub struct Namespace<P> {
    config: NamespaceConfig,
    state: RwLock<State>,
    pipeline: Mutex<P>,
}

impl<P: ReplicationPipeline> Namespace<P> {
    pub fn new(config: NamespaceConfig, pipeline: P) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: RwLock::new(State::default()),
            pipeline: Mutex::new(pipeline),
        })
    }

    #[must_use]
    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Run `read` against the pipeline. Calling back into the namespace
    /// from `read` deadlocks.
    pub fn with_pipeline<R>(&self, read: impl FnOnce(&P) -> R) -> R {
        read(&self.pipeline.lock())
    }

    fn reconcile(&self, file: FileId, entry: &mut FileEntry) {
        let required = entry.file.required_replication();
        if let Some(factor) = entry.reconciler.reconcile(required) {
            debug!(
                target: "nnsnap::namespace",
                event = "replication_target",
                file = file.0,
                factor = factor.0
            );
            self.pipeline.lock().set_target_replication(file, factor);
        }
    }

    /// Create an empty file. `None` uses the configured default replication.
    pub fn create_file(&self, replication: Option<u16>) -> Result<FileId> {
        let replication = self
            .config
            .check_replication(replication.unwrap_or(self.config.default_replication))?;
        let mut state = self.state.write();
        state.next_file += 1;
        let id = FileId(state.next_file);
        let mut node = FileNode::new(FileAttributes::new(replication, self.config.block_size));
        node.set_modification_time(state.tick());
        let mut entry = FileEntry {
            file: VersionedFile::new(node),
            born_after: state.latest_snapshot(),
            deleted_after: None,
            reconciler: ReplicationReconciler::new(),
        };
        self.reconcile(id, &mut entry);
        state.files.insert(id, entry);
        debug!(
            target: "nnsnap::namespace",
            event = "file_create",
            file = id.0,
            replication = replication.0
        );
        Ok(id)
    }

    /// Append `bytes` as new blocks of at most `block_size` each.
    pub fn append(&self, file: FileId, bytes: u64) -> Result<Vec<BlockDescriptor>> {
        let block_size = self.config.block_size;
        let mut guard = self.state.write();
        let state = &mut *guard;
        let latest = state.latest_snapshot();
        let mtime = state.tick();
        let entry = live_entry(&mut state.files, file)?;
        if let Some(latest) = latest.filter(|s| entry.in_snapshot(*s)) {
            entry.file.record_attribute_change(latest)?;
        }

        let mut appended = Vec::new();
        let mut remaining = bytes;
        while remaining > 0 {
            let len = remaining.min(block_size);
            let block = state.block_map.allocate(len);
            entry.file.node_mut().push_block(block);
            appended.push(block);
            remaining -= len;
        }
        entry.file.node_mut().set_modification_time(mtime);
        debug!(
            target: "nnsnap::namespace",
            event = "file_append",
            file = file.0,
            bytes,
            blocks = appended.len()
        );
        Ok(appended)
    }

    /// Keep only the first `keep_blocks` blocks and return the cut tail.
    ///
    /// If the latest snapshot contains the file, the tail stays allocated
    /// until deleting snapshots leaves no view that covers it. Otherwise it
    /// goes to the block map at once.
    pub fn truncate(&self, file: FileId, keep_blocks: usize) -> Result<Vec<BlockDescriptor>> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let latest = state.latest_snapshot();
        let mtime = state.tick();
        let entry = live_entry(&mut state.files, file)?;
        let blocks = entry.file.node().blocks().len();
        if keep_blocks > blocks {
            warn!(
                target: "nnsnap::namespace",
                event = "truncate_rejected",
                file = file.0,
                blocks,
                keep_blocks
            );
            return Err(SnapError::InvalidTruncate {
                blocks,
                keep: keep_blocks,
            });
        }
        let latest = latest.filter(|s| entry.in_snapshot(*s));
        if let Some(latest) = latest {
            entry.file.record_attribute_change(latest)?;
        }
        let displaced = entry
            .file
            .truncate(keep_blocks, latest, &mut state.block_map)?;
        entry.file.node_mut().set_modification_time(mtime);
        debug!(
            target: "nnsnap::namespace",
            event = "file_truncate",
            file = file.0,
            keep_blocks,
            displaced = displaced.len()
        );
        Ok(displaced)
    }

    pub fn set_replication(&self, file: FileId, replication: u16) -> Result<()> {
        let replication = self.config.check_replication(replication)?;
        let mut guard = self.state.write();
        let state = &mut *guard;
        let latest = state.latest_snapshot();
        let entry = live_entry(&mut state.files, file)?;
        if let Some(latest) = latest.filter(|s| entry.in_snapshot(*s)) {
            entry.file.record_attribute_change(latest)?;
        }
        entry.file.node_mut().set_replication(replication);
        self.reconcile(file, entry);
        Ok(())
    }

    /// Register a new snapshot of the whole namespace.
    ///
    /// No per-file work happens here; diffs are created lazily on the first
    /// modification after the snapshot.
    pub fn create_snapshot(&self) -> Result<SnapshotId> {
        let mut state = self.state.write();
        if state.snapshots.len() >= self.config.max_snapshots {
            warn!(
                target: "nnsnap::namespace",
                event = "snapshot_limit",
                limit = self.config.max_snapshots
            );
            return Err(SnapError::SnapshotLimit {
                limit: self.config.max_snapshots,
            });
        }
        state.next_snapshot += 1;
        let id = SnapshotId(state.next_snapshot);
        state.snapshots.insert(id);
        info!(
            target: "nnsnap::namespace",
            event = "snapshot_create",
            snapshot = id.0,
            retained = state.snapshots.len()
        );
        Ok(id)
    }

    /// Delete a snapshot from every file that it contains, reclaiming blocks
    /// no surviving view reaches and destroying files that only it kept.
    pub fn delete_snapshot(&self, snapshot: SnapshotId) -> Result<SnapshotDeletion> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if !state.snapshots.contains(&snapshot) {
            return Err(SnapError::UnknownSnapshot(snapshot.0));
        }

        let affected: Vec<(FileId, Option<SnapshotId>)> = state
            .files
            .iter()
            .filter(|(_, entry)| entry.in_snapshot(snapshot))
            .map(|(id, entry)| (*id, state.prior_of(entry, snapshot)))
            .collect();
        // Nothing may change unless every file can combine.
        for (id, prior) in &affected {
            if let Some(entry) = state.files.get(id) {
                if let Err(err) = entry.file.check_combine(snapshot, *prior) {
                    warn!(
                        target: "nnsnap::namespace",
                        event = "snapshot_delete_rejected",
                        snapshot = snapshot.0,
                        file = id.0,
                        error = %err
                    );
                    return Err(err);
                }
            }
        }
        state.snapshots.remove(&snapshot);

        let mut report = SnapshotDeletion {
            snapshot,
            files: Vec::with_capacity(affected.len()),
            collected_blocks: 0,
            released_blocks: 0,
            destroyed_files: Vec::new(),
        };
        for (id, prior) in affected {
            let Some(entry) = state.files.get_mut(&id) else {
                continue;
            };
            let outcome = entry
                .file
                .remove_and_combine(snapshot, prior, &mut state.block_map)?;
            report.collected_blocks += outcome.collected_blocks;
            report.released_blocks += outcome.released_blocks;
            if outcome.destroyed {
                state.files.remove(&id);
                report.destroyed_files.push(id);
            } else {
                self.reconcile(id, entry);
            }
            report.files.push(FileCombine { file: id, outcome });
        }

        info!(
            target: "nnsnap::namespace",
            event = "snapshot_delete",
            snapshot = snapshot.0,
            files = report.files.len(),
            collected = report.collected_blocks,
            released = report.released_blocks,
            destroyed = report.destroyed_files.len()
        );
        Ok(report)
    }

    /// Delete the live file. Snapshots that contain it keep their views; the
    /// file is destroyed once none does.
    ///
    /// The latest snapshot's diff gets an attribute copy, so replication
    /// required by the remaining views no longer depends on the live file.
    pub fn delete_file(&self, file: FileId) -> Result<CombineOutcome> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let latest = state.latest_snapshot();
        let entry = live_entry(&mut state.files, file)?;
        if let Some(latest) = latest.filter(|s| entry.in_snapshot(*s)) {
            entry.file.record_attribute_change(latest)?;
        }
        entry.deleted_after = Some(latest);
        let outcome = entry.file.delete_current(&mut state.block_map);
        if outcome.destroyed {
            state.files.remove(&file);
        } else {
            self.reconcile(file, entry);
        }
        info!(
            target: "nnsnap::namespace",
            event = "file_delete",
            file = file.0,
            collected = outcome.collected_blocks,
            released = outcome.released_blocks,
            destroyed = outcome.destroyed
        );
        Ok(outcome)
    }

    /// Size and replication of `file` as of `snapshot`.
    pub fn reconstruct_view(&self, file: FileId, snapshot: SnapshotId) -> Result<FileView> {
        let state = self.state.read();
        if !state.snapshots.contains(&snapshot) {
            return Err(SnapError::UnknownSnapshot(snapshot.0));
        }
        let entry = state
            .files
            .get(&file)
            .filter(|entry| entry.in_snapshot(snapshot))
            .ok_or(SnapError::FileNotFound(file.0))?;
        Ok(entry.file.view_at(snapshot))
    }

    pub fn current_view(&self, file: FileId) -> Result<FileView> {
        let state = self.state.read();
        let entry = state
            .files
            .get(&file)
            .ok_or(SnapError::FileNotFound(file.0))?;
        entry
            .file
            .current_view()
            .ok_or(SnapError::FileDeleted(file.0))
    }

    pub fn required_replication(&self, file: FileId) -> Result<Replication> {
        let state = self.state.read();
        state
            .files
            .get(&file)
            .map(|entry| entry.file.required_replication())
            .ok_or(SnapError::FileNotFound(file.0))
    }

    /// Read-only state of `file` for the persistence layer.
    pub fn export_state(&self, file: FileId) -> Result<FileState> {
        let state = self.state.read();
        state
            .files
            .get(&file)
            .map(|entry| entry.file.state())
            .ok_or(SnapError::FileNotFound(file.0))
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<SnapshotId> {
        self.state.read().snapshots.iter().copied().collect()
    }

    #[must_use]
    pub fn files(&self) -> Vec<FileId> {
        self.state.read().files.keys().copied().collect()
    }

    #[must_use]
    pub fn contains_file(&self, file: FileId) -> bool {
        self.state.read().files.contains_key(&file)
    }

    /// Blocks handed to the block map so far, in collection order.
    #[must_use]
    pub fn collected_blocks(&self) -> Vec<BlockDescriptor> {
        self.state.read().block_map.collected().to_vec()
    }

    #[must_use]
    pub fn live_block_count(&self) -> usize {
        self.state.read().block_map.live_count()
    }
}
