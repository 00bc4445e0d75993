#![forbid(unsafe_code)]
//! Error types for nnsnap.
//!
//! # Error Taxonomy
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | `DuplicateSnapshot` | `nnsnap-diff` | A diff for this snapshot id already exists |
//! | `InconsistentDiffOrder` | `nnsnap-diff` | Diffs observed out of ascending snapshot order |
//! | `UnknownSnapshot` | `nnsnap-namespace` | Snapshot id was never registered (or already deleted) |
//! | `FileNotFound` | `nnsnap-namespace` | No such file, or the file did not exist at the snapshot |
//! | `FileDeleted` | `nnsnap-namespace` | Live operation on a file kept alive only by snapshots |
//! | `InvalidReplication` | `nnsnap-namespace` | Replication outside the configured bounds |
//! | `InvalidTruncate` | `nnsnap-namespace` | Truncation that would grow the block list |
//! | `SnapshotLimit` | `nnsnap-namespace` | Configured snapshot count reached |
//! | `Config` | `nnsnap-namespace` | Configuration failed to load or validate |
//! | `Io` | any | Operating system I/O error |
//!
//! The diff core never raises `UnknownSnapshot`: deleting a snapshot for
//! which a file has no diff means the file was untouched since, which is a
//! valid no-op.
//!
//! ## Ordering Errors Are Fatal
//!
//! `DuplicateSnapshot` and `InconsistentDiffOrder` indicate that the caller
//! broke the single-writer contract or replayed operations out of order.
//! They are surfaced unchanged and never repaired in place.
//!
//! ## errno Mapping
//!
//! Every variant maps to exactly one POSIX errno via [`SnapError::to_errno`]
//! for RPC-layer replies. The match is exhaustive so a new variant does not
//! compile until its errno is assigned.
//!
//! | Variant | errno |
//! |---------|-------|
//! | `DuplicateSnapshot` | `EEXIST` |
//! | `InconsistentDiffOrder` | `EIO` |
//! | `UnknownSnapshot` | `ENOENT` |
//! | `FileNotFound` | `ENOENT` |
//! | `FileDeleted` | `ESTALE` |
//! | `InvalidReplication` | `EINVAL` |
//! | `InvalidTruncate` | `EINVAL` |
//! | `SnapshotLimit` | `ENOSPC` |
//! | `Config` | `EINVAL` |
//! | `Io` | raw OS error, else `EIO` |

use thiserror::Error;

/// Unified error type for all nnsnap operations.
#[derive(Debug, Error)]
pub enum SnapError {
    /// A diff for `snapshot` is already present in the file's diff list.
    #[error("duplicate diff for snapshot {snapshot}")]
    DuplicateSnapshot { snapshot: u64 },

    /// Two adjacent diffs were observed out of ascending snapshot order.
    #[error("diff order violated: snapshot {previous} precedes snapshot {next}")]
    InconsistentDiffOrder { previous: u64, next: u64 },

    /// The snapshot id is not registered with the namespace.
    #[error("unknown snapshot {0}")]
    UnknownSnapshot(u64),

    /// The file does not exist (now, or at the requested snapshot).
    #[error("file {0} not found")]
    FileNotFound(u64),

    /// The live file was deleted; only snapshot views remain.
    #[error("file {0} is deleted")]
    FileDeleted(u64),

    /// Replication factor outside the configured bounds.
    #[error("replication {requested} outside {min}..={max}")]
    InvalidReplication { requested: u16, min: u16, max: u16 },

    /// Truncation target exceeds the current block count.
    #[error("cannot truncate {blocks} blocks to {keep}")]
    InvalidTruncate { blocks: usize, keep: usize },

    /// The namespace already retains the configured number of snapshots.
    #[error("snapshot limit of {limit} reached")]
    SnapshotLimit { limit: usize },

    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operating system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapError {
    /// Convert this error into a POSIX errno.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::DuplicateSnapshot { .. } => libc::EEXIST,
            Self::InconsistentDiffOrder { .. } => libc::EIO,
            Self::UnknownSnapshot(_) | Self::FileNotFound(_) => libc::ENOENT,
            Self::FileDeleted(_) => libc::ESTALE,
            Self::InvalidReplication { .. } | Self::InvalidTruncate { .. } | Self::Config(_) => {
                libc::EINVAL
            }
            Self::SnapshotLimit { .. } => libc::ENOSPC,
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Whether this error reports a broken ordering invariant.
    #[must_use]
    pub fn is_ordering_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSnapshot { .. } | Self::InconsistentDiffOrder { .. }
        )
    }
}

/// Result alias using `SnapError`.
pub type Result<T> = std::result::Result<T, SnapError>;
