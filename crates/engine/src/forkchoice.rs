//! Forkchoice pointers sent to the execution node.

use alloy_primitives::B256;
use beacon_types::HeadBlock;

/// Forkchoice state for one `engine_forkchoiceUpdatedV1` call.
///
/// Maps to Ethereum's forkchoice rule:
/// - `head`: block to build on or adopt
/// - `safe`: same as head for single-signer PoA
/// - `finalized`: chosen by the scheduler, never moved by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForkchoiceState {
    /// Head block hash.
    pub head: B256,

    /// Safe block hash.
    pub safe: B256,

    /// Finalized block hash.
    pub finalized: B256,
}

impl ForkchoiceState {
    /// State for building on `head`.
    #[must_use]
    pub fn new(head: B256, finalized: B256) -> Self {
        Self { head, safe: head, finalized }
    }

    /// Move head and safe to a newly executed block.
    ///
    /// Keeps finalized unchanged.
    #[must_use]
    pub fn with_soft(self, block_hash: B256) -> Self {
        Self { head: block_hash, safe: block_hash, finalized: self.finalized }
    }
}

impl From<ForkchoiceState> for alloy_rpc_types_engine::ForkchoiceState {
    fn from(state: ForkchoiceState) -> Self {
        Self {
            head_block_hash: state.head,
            safe_block_hash: state.safe,
            finalized_block_hash: state.finalized,
        }
    }
}

/// Last finalized block communicated to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizedPointer {
    /// Block number.
    pub number: u64,

    /// Block hash.
    pub hash: B256,
}

impl FinalizedPointer {
    /// Pointer for the observed head.
    #[must_use]
    pub fn at(head: &HeadBlock) -> Self {
        Self { number: head.number, hash: head.hash }
    }

    /// Advance to `head` unless that would move finalization backwards.
    #[must_use]
    pub fn advance(self, head: &HeadBlock) -> Self {
        if head.number >= self.number {
            Self::at(head)
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(number: u64, byte: u8) -> HeadBlock {
        HeadBlock { hash: B256::repeat_byte(byte), number, timestamp: number * 5 }
    }

    #[test]
    fn test_forkchoice_updates() {
        let parent = B256::repeat_byte(0x01);
        let child = B256::repeat_byte(0x02);

        let build = ForkchoiceState::new(parent, parent);
        assert_eq!(build.head, parent);
        assert_eq!(build.safe, parent);
        assert_eq!(build.finalized, parent);

        // Adopting the built block keeps finalized where it was
        let adopt = build.with_soft(child);
        assert_eq!(adopt.head, child);
        assert_eq!(adopt.safe, child);
        assert_eq!(adopt.finalized, parent);
    }

    #[test]
    fn test_engine_conversion() {
        let state = ForkchoiceState::new(B256::repeat_byte(0xaa), B256::repeat_byte(0xbb));
        let engine: alloy_rpc_types_engine::ForkchoiceState = state.into();
        assert_eq!(engine.head_block_hash, B256::repeat_byte(0xaa));
        assert_eq!(engine.safe_block_hash, B256::repeat_byte(0xaa));
        assert_eq!(engine.finalized_block_hash, B256::repeat_byte(0xbb));
    }

    #[test]
    fn test_finalized_never_regresses() {
        let pointer = FinalizedPointer::at(&head(10, 0x0a));

        let forward = pointer.advance(&head(11, 0x0b));
        assert_eq!(forward, FinalizedPointer { number: 11, hash: B256::repeat_byte(0x0b) });

        // Node reports an older head: keep the previous pointer
        let backward = forward.advance(&head(9, 0x09));
        assert_eq!(backward, forward);

        // Same height, different hash: follow the node
        let replaced = forward.advance(&head(11, 0xcc));
        assert_eq!(replaced.hash, B256::repeat_byte(0xcc));
    }
}
