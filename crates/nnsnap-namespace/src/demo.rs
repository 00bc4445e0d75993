//! Walk-through of the snapshot lifecycle on one file:
//! 192 KiB written, snapshot, 32 KiB appended, snapshot, truncated to
//! 128 KiB, then both snapshots and finally the file are deleted.

use crate::config::NamespaceConfig;
use crate::namespace::Namespace;
use crate::pipeline::RecordingPipeline;
use nnsnap_error::SnapError;
use serde::Serialize;
use tracing::info;

const KIB: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleDemoResult {
    pub s1_size: u64,
    pub s2_size: u64,
    pub current_size: u64,
    pub displaced_by_truncate: usize,
    pub collected_after_s1: usize,
    pub collected_after_s2: usize,
    /// Truncated-away blocks freed once the s2 view is gone.
    pub released_after_s2: usize,
    pub collected_on_file_delete: usize,
    pub file_destroyed: bool,
    pub live_blocks_left: usize,
}

impl LifecycleDemoResult {
    #[must_use]
    pub fn output_lines(&self) -> [String; 6] {
        [
            format!("view at s1: {} KiB", self.s1_size / KIB),
            format!("view at s2: {} KiB", self.s2_size / KIB),
            format!(
                "current: {} KiB ({} blocks displaced by truncate)",
                self.current_size / KIB,
                self.displaced_by_truncate
            ),
            format!("delete s1: {} blocks collected", self.collected_after_s1),
            format!(
                "delete s2: {} blocks collected, {} truncated blocks released",
                self.collected_after_s2, self.released_after_s2
            ),
            format!(
                "delete file: {} blocks collected, destroyed={}, live blocks left={}",
                self.collected_on_file_delete, self.file_destroyed, self.live_blocks_left
            ),
        ]
    }
}

pub fn run_lifecycle_demo() -> Result<LifecycleDemoResult, SnapError> {
    let config = NamespaceConfig {
        block_size: 64 * KIB,
        ..NamespaceConfig::default()
    };
    let ns = Namespace::new(config, RecordingPipeline::new())?;

    let file = ns.create_file(None)?;
    ns.append(file, 192 * KIB)?;
    let s1 = ns.create_snapshot()?;
    ns.append(file, 32 * KIB)?;
    let s2 = ns.create_snapshot()?;
    let displaced = ns.truncate(file, 2)?;

    let s1_size = ns.reconstruct_view(file, s1)?.size;
    let s2_size = ns.reconstruct_view(file, s2)?.size;
    let current_size = ns.current_view(file)?.size;
    info!(
        target: "nnsnap::demo",
        event = "views",
        s1_size,
        s2_size,
        current_size
    );

    let after_s1 = ns.delete_snapshot(s1)?;
    let after_s2 = ns.delete_snapshot(s2)?;
    let on_delete = ns.delete_file(file)?;

    Ok(LifecycleDemoResult {
        s1_size,
        s2_size,
        current_size,
        displaced_by_truncate: displaced.len(),
        collected_after_s1: after_s1.collected_blocks,
        collected_after_s2: after_s2.collected_blocks,
        released_after_s2: after_s2.released_blocks,
        collected_on_file_delete: on_delete.collected_blocks,
        file_destroyed: on_delete.destroyed,
        live_blocks_left: ns.live_block_count(),
    })
}
