#![forbid(unsafe_code)]
//! nnsnap: snapshot-aware file metadata.
//!
//! Umbrella crate re-exporting the workspace:
//!
//! - [`types`]: identifiers, block descriptors and views.
//! - [`error`]: the shared error type.
//! - [`diff`]: per-file diff lists, combination and block reclamation.
//! - [`namespace`]: the reference namespace service and scenario replay.

pub use nnsnap_diff as diff;
pub use nnsnap_error as error;
pub use nnsnap_namespace as namespace;
pub use nnsnap_types as types;

pub use nnsnap_diff::{BlockCollector, CombineOutcome, DiffList, SnapshotDiff, VersionedFile};
pub use nnsnap_error::{Result, SnapError};
pub use nnsnap_namespace::{Namespace, NamespaceConfig, RecordingPipeline, ReplicationPipeline};
pub use nnsnap_types::{BlockDescriptor, FileId, FileView, Replication, SnapshotId};
