use crate::sync::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// One block of a pass: `[offset, offset + length)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub index: u64,
    pub offset: u64,
    pub length: u64,
}

impl BlockRange {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Partition of `[0, total_len)` into fixed-size blocks.
///
/// Every block has `block_size` bytes except a shorter final one. Boundaries
/// depend only on the offset and the block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    total_len: u64,
    block_size: u64,
}

impl BlockPlan {
    pub fn new(total_len: u64, block_size: u64) -> SyncResult<Self> {
        if block_size == 0 {
            return Err(SyncError::InvalidConfig(
                "block size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            total_len,
            block_size,
        })
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn block_count(&self) -> u64 {
        self.total_len.div_ceil(self.block_size)
    }

    pub fn block(&self, index: u64) -> Option<BlockRange> {
        let offset = index.checked_mul(self.block_size)?;
        if offset >= self.total_len {
            return None;
        }
        Some(BlockRange {
            index,
            offset,
            length: self.block_size.min(self.total_len - offset),
        })
    }

    /// Blocks in strictly increasing offset order
    pub fn iter(&self) -> impl Iterator<Item = BlockRange> + '_ {
        (0..self.block_count()).filter_map(move |index| self.block(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1 << 20;

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            BlockPlan::new(100, 0),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_source() {
        let plan = BlockPlan::new(0, MIB).unwrap();
        assert_eq!(plan.block_count(), 0);
        assert_eq!(plan.iter().count(), 0);
    }

    #[test]
    fn test_exact_multiple() {
        let plan = BlockPlan::new(3 * MIB, MIB).unwrap();
        let blocks: Vec<_> = plan.iter().collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.length == MIB));
        assert_eq!(blocks[2].offset, 2 * MIB);
    }

    #[test]
    fn test_short_final_block() {
        let plan = BlockPlan::new(2_500_000, MIB).unwrap();
        let blocks: Vec<_> = plan.iter().collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].offset, 2_097_152);
        assert_eq!(blocks[2].length, 402_848);
    }

    #[test]
    fn test_blocks_partition_source() {
        for (total, size) in [(1u64, 1u64), (999, 7), (4096, 4096), (10_000, 333)] {
            let plan = BlockPlan::new(total, size).unwrap();
            let mut expected_offset = 0;
            for block in plan.iter() {
                assert_eq!(block.offset, expected_offset);
                assert!(block.length > 0 && block.length <= size);
                expected_offset = block.end();
            }
            assert_eq!(expected_offset, total);
        }
    }

    #[test]
    fn test_block_out_of_range() {
        let plan = BlockPlan::new(10, 4).unwrap();
        assert_eq!(plan.block(2).map(|b| b.length), Some(2));
        assert!(plan.block(3).is_none());
        assert!(plan.block(u64::MAX).is_none());
    }
}
