//! Block collection: the hand-off of unreachable blocks to the block map.

use crate::file_node::FileNode;
use nnsnap_types::BlockDescriptor;
use tracing::trace;

/// Receiver of blocks that no view references any more.
///
/// Implementations must tolerate duplicate collects of the same block.
pub trait BlockCollector {
    fn collect(&mut self, block: BlockDescriptor);
}

impl BlockCollector for Vec<BlockDescriptor> {
    fn collect(&mut self, block: BlockDescriptor) {
        self.push(block);
    }
}

impl<T: BlockCollector + ?Sized> BlockCollector for &mut T {
    fn collect(&mut self, block: BlockDescriptor) {
        (**self).collect(block);
    }
}

/// Smallest `n` such that the first `n` blocks cover `max` bytes, capped
/// at the block count.
#[must_use]
pub fn blocks_to_cover(blocks: &[BlockDescriptor], max: u64) -> usize {
    let mut n = 0;
    let mut covered = 0_u64;
    while n < blocks.len() && max > covered {
        covered = covered.saturating_add(blocks[n].len);
        n += 1;
    }
    n
}

/// Cut `node`'s block list down to what `max` bytes need and collect the
/// rest. Returns the number of collected blocks.
pub(crate) fn collect_blocks_beyond(
    node: &mut FileNode,
    max: u64,
    collector: &mut dyn BlockCollector,
) -> usize {
    let keep = blocks_to_cover(node.blocks(), max);
    let garbage = node.truncate_blocks(keep);
    hand_off(garbage, collector)
}

/// Collect every block of `node`.
pub(crate) fn collect_all(node: &mut FileNode, collector: &mut dyn BlockCollector) -> usize {
    let garbage = node.take_blocks();
    hand_off(garbage, collector)
}

/// Collect `garbage` in order. Returns how many blocks were handed over.
pub(crate) fn hand_off(garbage: Vec<BlockDescriptor>, collector: &mut dyn BlockCollector) -> usize {
    let count = garbage.len();
    for block in garbage {
        trace!(
            target: "nnsnap::collect",
            event = "block_collect",
            block = block.id.0,
            len = block.len
        );
        collector.collect(block);
    }
    count
}
