use crate::diff::DiffSubject;
use nnsnap_types::{BlockDescriptor, Replication, total_len};
use serde::{Deserialize, Serialize};

/// Scalar attributes of a file: everything except its block list.
///
/// This is also the shape of a metadata snapshot copy, so a copy can never
/// carry blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub replication: Replication,
    pub preferred_block_size: u64,
    pub modification_time: u64,
}

impl FileAttributes {
    #[must_use]
    pub fn new(replication: Replication, preferred_block_size: u64) -> Self {
        Self {
            replication,
            preferred_block_size,
            modification_time: 0,
        }
    }
}

/// Live state of one file.
///
/// `deleted` marks a file whose current existence is gone but which is
/// still referenced by snapshot diffs. Validation of replication values and
/// block lists belongs to the namespace; nothing here fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    attributes: FileAttributes,
    blocks: Vec<BlockDescriptor>,
    deleted: bool,
}

impl FileNode {
    #[must_use]
    pub fn new(attributes: FileAttributes) -> Self {
        Self {
            attributes,
            blocks: Vec::new(),
            deleted: false,
        }
    }

    #[must_use]
    pub fn with_blocks(attributes: FileAttributes, blocks: Vec<BlockDescriptor>) -> Self {
        Self {
            attributes,
            blocks,
            deleted: false,
        }
    }

    /// Sum of the lengths of the current blocks.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        total_len(&self.blocks)
    }

    #[must_use]
    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.blocks
    }

    /// Replace the whole block list. An empty list clears the file.
    pub fn set_blocks(&mut self, blocks: Vec<BlockDescriptor>) {
        self.blocks = blocks;
    }

    pub fn push_block(&mut self, block: BlockDescriptor) {
        self.blocks.push(block);
    }

    /// Keep the first `keep` blocks and return the rest in order.
    pub fn truncate_blocks(&mut self, keep: usize) -> Vec<BlockDescriptor> {
        if keep >= self.blocks.len() {
            return Vec::new();
        }
        let tail = self.blocks.split_off(keep);
        if keep == 0 {
            self.blocks = Vec::new();
        }
        tail
    }

    /// Remove and return every block.
    pub fn take_blocks(&mut self) -> Vec<BlockDescriptor> {
        std::mem::take(&mut self.blocks)
    }

    #[must_use]
    pub fn replication(&self) -> Replication {
        self.attributes.replication
    }

    pub fn set_replication(&mut self, replication: Replication) {
        self.attributes.replication = replication;
    }

    #[must_use]
    pub fn attributes(&self) -> &FileAttributes {
        &self.attributes
    }

    pub fn set_modification_time(&mut self, mtime: u64) {
        self.attributes.modification_time = mtime;
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub(crate) fn restore_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}

impl DiffSubject for FileNode {
    type Copy = FileAttributes;

    fn current_size(&self) -> u64 {
        FileNode::current_size(self)
    }

    fn snapshot_copy(&self) -> FileAttributes {
        self.attributes
    }
}
