//! Chain head snapshots as reported by the execution node.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::serde_helpers::quantity;

/// The latest block header fields the scheduler cares about.
///
/// Decoded directly from an `eth_getBlockByNumber("latest", false)` result;
/// every other header field is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadBlock {
    /// Block hash.
    pub hash: B256,

    /// Block number.
    #[serde(with = "quantity")]
    pub number: u64,

    /// Block timestamp (unix seconds).
    #[serde(with = "quantity")]
    pub timestamp: u64,
}

impl HeadBlock {
    /// Timestamp for the next block: one period after this block, but never
    /// in the past relative to `now`.
    #[must_use]
    pub fn next_timestamp(&self, period_secs: u64, now: u64) -> u64 {
        self.timestamp.saturating_add(period_secs).max(now)
    }
}

/// Transaction pool counters from `txpool_status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStatus {
    /// Executable transactions.
    #[serde(with = "quantity")]
    pub pending: u64,

    /// Transactions waiting on a nonce gap.
    #[serde(with = "quantity", default)]
    pub queued: u64,
}
