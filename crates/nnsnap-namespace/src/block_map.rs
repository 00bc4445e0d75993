//! In-memory block map: allocates block ids and receives collected blocks.

use nnsnap_diff::BlockCollector;
use nnsnap_types::{BlockDescriptor, BlockId};
use std::collections::HashSet;
use tracing::warn;

/// Reference block map. Collection is idempotent: a block collected twice
/// is recorded once and counted as a duplicate.
#[derive(Debug, Default)]
pub struct MemoryBlockMap {
    next_id: u64,
    allocated: HashSet<BlockId>,
    collected: Vec<BlockDescriptor>,
    duplicate_collects: u64,
}

impl MemoryBlockMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, len: u64) -> BlockDescriptor {
        self.next_id += 1;
        let id = BlockId(self.next_id);
        self.allocated.insert(id);
        BlockDescriptor::new(id, len)
    }

    /// Blocks handed over for deletion, in collection order.
    #[must_use]
    pub fn collected(&self) -> &[BlockDescriptor] {
        &self.collected
    }

    #[must_use]
    pub fn is_live(&self, id: BlockId) -> bool {
        self.allocated.contains(&id)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.allocated.len()
    }

    #[must_use]
    pub fn duplicate_collects(&self) -> u64 {
        self.duplicate_collects
    }
}

impl BlockCollector for MemoryBlockMap {
    fn collect(&mut self, block: BlockDescriptor) {
        if self.allocated.remove(&block.id) {
            self.collected.push(block);
        } else {
            self.duplicate_collects += 1;
            warn!(
                target: "nnsnap::block_map",
                event = "duplicate_collect",
                block = block.id.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_assigns_fresh_ids() {
        let mut map = MemoryBlockMap::new();
        let a = map.allocate(10);
        let b = map.allocate(20);
        assert_ne!(a.id, b.id);
        assert_eq!(map.live_count(), 2);
        assert!(map.is_live(a.id));
    }

    #[test]
    fn duplicate_collect_is_absorbed() {
        let mut map = MemoryBlockMap::new();
        let a = map.allocate(10);
        map.collect(a);
        map.collect(a);
        assert_eq!(map.collected(), &[a]);
        assert_eq!(map.duplicate_collects(), 1);
        assert!(!map.is_live(a.id));
        assert_eq!(map.live_count(), 0);
    }
}
