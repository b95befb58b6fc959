//! Payload build attributes and production results.

use alloy_primitives::{Address, B256};
use beacon_types::serde_helpers::quantity;
use serde::{Deserialize, Serialize};

/// Attributes for `engine_forkchoiceUpdatedV1` asking the node to build.
///
/// Only the V1 fields; withdrawals and beacon roots do not exist on this chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadBuildAttributes {
    /// Block timestamp.
    #[serde(with = "quantity")]
    pub timestamp: u64,

    /// Previous RANDAO value (always zero for single-signer Clique).
    pub prev_randao: B256,

    /// Fee recipient.
    pub suggested_fee_recipient: Address,
}

impl PayloadBuildAttributes {
    /// Attributes for a block at `timestamp` paying `fee_recipient`.
    #[must_use]
    pub fn new(timestamp: u64, fee_recipient: Address) -> Self {
        Self { timestamp, prev_randao: B256::ZERO, suggested_fee_recipient: fee_recipient }
    }
}

/// A block that was built, executed and handed to forkchoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Hash of the new block.
    pub block_hash: B256,

    /// Number of the new block.
    pub block_number: u64,

    /// Status `engine_newPayloadV1` reported.
    pub status: ExecutionStatus,

    /// Whether the adopting `forkchoiceUpdated` succeeded.
    ///
    /// Not required for the block to count as committed.
    pub finalize_acknowledged: bool,
}

/// Status of payload execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Block was executed successfully.
    Valid,

    /// Node accepted the block without fully validating it yet.
    Syncing,
}

impl Committed {
    /// Check if execution was fully validated.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self.status, ExecutionStatus::Valid)
    }
}
