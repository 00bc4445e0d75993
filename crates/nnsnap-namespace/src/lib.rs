#![forbid(unsafe_code)]
//! Reference namespace service for the nnsnap diff core.
//!
//! [`Namespace`] keeps the snapshot registry, decides which snapshots
//! contain which files, allocates blocks through [`MemoryBlockMap`] and
//! forwards replication targets to a [`ReplicationPipeline`]. Scenarios in
//! JSON can be replayed against a fresh namespace with [`run_scenario`].

pub mod block_map;
pub mod config;
pub mod demo;
pub mod namespace;
pub mod pipeline;
pub mod scenario;

pub use block_map::MemoryBlockMap;
pub use config::NamespaceConfig;
pub use demo::{LifecycleDemoResult, run_lifecycle_demo};
pub use namespace::{FileCombine, Namespace, SnapshotDeletion};
pub use pipeline::{RecordingPipeline, ReplicationPipeline};
pub use scenario::{
    Scenario, ScenarioError, ScenarioOp, ScenarioReport, StepEvent, run_scenario,
};
