#![forbid(unsafe_code)]
//! Snapshot diff lists and block reclamation for a single file.
//!
//! A file is its live [`FileNode`] plus a [`DiffList`] holding one
//! [`SnapshotDiff`] per snapshot after which the file changed. A diff
//! records the size at its snapshot and, only when an attribute changed,
//! a detached attribute copy. Views at older snapshots are rebuilt from
//! the first diff at or after them.
//!
//! ## Deletion
//!
//! Deleting a snapshot or the live file runs one combination pass:
//!
//! 1. Drop (or re-tag) the snapshot's diff.
//! 2. Compute the largest size any surviving view needs: the live size, if
//!    the file is not deleted, and every remaining diff's size.
//! 3. Keep the leading blocks that cover it and hand the rest to the
//!    [`BlockCollector`].
//!
//! A deleted file with no remaining diffs is destroyed and all of its blocks
//! are collected.
//!
//! ## Concurrency
//!
//! Nothing here locks. Callers serialize mutations of a file externally;
//! view reconstruction only needs shared access.

pub mod collect;
pub mod diff;
pub mod diff_list;
pub mod file_node;
pub mod replication;
pub mod versioned;

pub use collect::{BlockCollector, blocks_to_cover};
pub use diff::{DiffSubject, SnapshotDiff};
pub use diff_list::{DiffList, DiffRemoval};
pub use file_node::{FileAttributes, FileNode};
pub use replication::{ReplicationReconciler, ReplicationSource, required_replication};
pub use versioned::{CombineOutcome, DiffChange, FileState, RetainedBlock, VersionedFile};
