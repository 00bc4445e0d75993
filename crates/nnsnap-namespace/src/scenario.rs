//! JSON-described operation sequences replayed against a fresh namespace.
//!
//! Files and snapshots are referred to by caller-chosen names so scripts do
//! not depend on the ids the namespace hands out.

use crate::config::NamespaceConfig;
use crate::namespace::{Namespace, SnapshotDeletion};
use crate::pipeline::RecordingPipeline;
use nnsnap_diff::CombineOutcome;
use nnsnap_error::SnapError;
use nnsnap_types::{BlockDescriptor, FileId, FileView, Replication, SnapshotId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScenarioOp {
    CreateFile {
        file: String,
        #[serde(default)]
        replication: Option<u16>,
    },
    Append {
        file: String,
        bytes: u64,
    },
    Truncate {
        file: String,
        keep_blocks: usize,
    },
    SetReplication {
        file: String,
        replication: u16,
    },
    Snapshot {
        snapshot: String,
    },
    DeleteSnapshot {
        snapshot: String,
    },
    DeleteFile {
        file: String,
    },
    View {
        file: String,
        #[serde(default)]
        snapshot: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: NamespaceConfig,
    pub ops: Vec<ScenarioOp>,
}

impl Scenario {
    pub fn from_json_str(text: &str) -> Result<Self, ScenarioError> {
        let scenario: Self =
            serde_json::from_str(text).map_err(|err| ScenarioError::Parse(err.to_string()))?;
        scenario.config.validate()?;
        Ok(scenario)
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario parse error: {0}")]
    Parse(String),
    #[error("step {step}: unknown name {name:?}")]
    UnknownName { step: usize, name: String },
    #[error("step {step}: name {name:?} already bound")]
    NameTaken { step: usize, name: String },
    #[error("step {step}: {source}")]
    Step {
        step: usize,
        #[source]
        source: SnapError,
    },
    #[error(transparent)]
    Snap(#[from] SnapError),
}

/// What one replayed step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    FileCreated { file: FileId },
    Appended { blocks: Vec<BlockDescriptor> },
    Truncated { displaced: Vec<BlockDescriptor> },
    ReplicationSet { required: Replication },
    SnapshotCreated { snapshot: SnapshotId },
    SnapshotDeleted { deletion: SnapshotDeletion },
    FileDeleted { outcome: CombineOutcome },
    View { view: FileView },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepEvent>,
    pub collected_blocks: Vec<BlockDescriptor>,
    pub live_blocks: usize,
    pub replication_requests: Vec<(FileId, Replication)>,
}

fn lookup<T: Copy>(
    names: &HashMap<String, T>,
    step: usize,
    name: &str,
) -> Result<T, ScenarioError> {
    names
        .get(name)
        .copied()
        .ok_or_else(|| ScenarioError::UnknownName {
            step,
            name: name.to_owned(),
        })
}

fn bind<T>(
    names: &mut HashMap<String, T>,
    step: usize,
    name: &str,
    value: T,
) -> Result<(), ScenarioError> {
    if names.contains_key(name) {
        return Err(ScenarioError::NameTaken {
            step,
            name: name.to_owned(),
        });
    }
    names.insert(name.to_owned(), value);
    Ok(())
}

/// Replay `scenario` and report every step. Stops at the first failure.
pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    let ns = Namespace::new(scenario.config.clone(), RecordingPipeline::new())?;
    let mut files: HashMap<String, FileId> = HashMap::new();
    let mut snapshots: HashMap<String, SnapshotId> = HashMap::new();
    let mut steps = Vec::with_capacity(scenario.ops.len());

    for (step, op) in scenario.ops.iter().enumerate() {
        let at = |source: SnapError| ScenarioError::Step { step, source };
        let event = match op {
            ScenarioOp::CreateFile { file, replication } => {
                let id = ns.create_file(*replication).map_err(at)?;
                bind(&mut files, step, file, id)?;
                StepEvent::FileCreated { file: id }
            }
            ScenarioOp::Append { file, bytes } => {
                let id = lookup(&files, step, file)?;
                StepEvent::Appended {
                    blocks: ns.append(id, *bytes).map_err(at)?,
                }
            }
            ScenarioOp::Truncate { file, keep_blocks } => {
                let id = lookup(&files, step, file)?;
                StepEvent::Truncated {
                    displaced: ns.truncate(id, *keep_blocks).map_err(at)?,
                }
            }
            ScenarioOp::SetReplication { file, replication } => {
                let id = lookup(&files, step, file)?;
                ns.set_replication(id, *replication).map_err(at)?;
                StepEvent::ReplicationSet {
                    required: ns.required_replication(id).map_err(at)?,
                }
            }
            ScenarioOp::Snapshot { snapshot } => {
                let id = ns.create_snapshot().map_err(at)?;
                bind(&mut snapshots, step, snapshot, id)?;
                StepEvent::SnapshotCreated { snapshot: id }
            }
            ScenarioOp::DeleteSnapshot { snapshot } => {
                let id = lookup(&snapshots, step, snapshot)?;
                snapshots.remove(snapshot);
                StepEvent::SnapshotDeleted {
                    deletion: ns.delete_snapshot(id).map_err(at)?,
                }
            }
            ScenarioOp::DeleteFile { file } => {
                let id = lookup(&files, step, file)?;
                StepEvent::FileDeleted {
                    outcome: ns.delete_file(id).map_err(at)?,
                }
            }
            ScenarioOp::View { file, snapshot } => {
                let id = lookup(&files, step, file)?;
                let view = match snapshot {
                    Some(name) => {
                        let snap = lookup(&snapshots, step, name)?;
                        ns.reconstruct_view(id, snap)
                    }
                    None => ns.current_view(id),
                }
                .map_err(at)?;
                StepEvent::View { view }
            }
        };
        steps.push(event);
    }

    let replication_requests = ns.with_pipeline(|pipeline| pipeline.requests().to_vec());
    Ok(ScenarioReport {
        steps,
        collected_blocks: ns.collected_blocks(),
        live_blocks: ns.live_block_count(),
        replication_requests,
    })
}
