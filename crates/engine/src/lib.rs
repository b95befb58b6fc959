//! Engine API block production for a single-signer post-merge Clique chain.
//!
//! This crate plays the consensus-client side of the Engine API: it observes
//! the execution node's head, authenticates with short-lived JWTs, and drives
//! the `forkchoiceUpdated` / `getPayload` / `newPayload` handshake that
//! produces one block.

#![warn(missing_docs)]

mod client;
mod driver;
mod error;
mod forkchoice;
mod jwt;
mod observer;
mod outcome;
mod payload;
mod retry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::EngineClient;
pub use driver::{BuildRequest, FinalizeWait, PayloadDriver, Stage};
pub use error::{DriveError, EngineError};
pub use forkchoice::{FinalizedPointer, ForkchoiceState};
pub use jwt::{unix_now, AuthToken, Secret, TokenManager};
pub use observer::RpcObserver;
pub use outcome::EngineCallOutcome;
pub use payload::{Committed, ExecutionStatus, PayloadBuildAttributes};
pub use retry::poll_until;

use alloy_primitives::B256;
use alloy_rpc_types_engine::{ExecutionPayloadV1, PayloadId};
use beacon_types::HeadBlock;

/// Result type for engine setup operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Authenticated Engine API calls used for block production.
///
/// Every call takes the bearer token explicitly; implementations never cache
/// or refresh tokens on their own.
#[async_trait::async_trait]
pub trait EngineApi: Send + Sync {
    /// `engine_forkchoiceUpdatedV1`, optionally asking the node to build.
    async fn forkchoice_updated(
        &self,
        token: &AuthToken,
        state: ForkchoiceState,
        attributes: Option<PayloadBuildAttributes>,
    ) -> EngineCallOutcome<Option<PayloadId>>;

    /// `engine_getPayloadV1`.
    async fn get_payload(
        &self,
        token: &AuthToken,
        payload_id: PayloadId,
    ) -> EngineCallOutcome<ExecutionPayloadV1>;

    /// `engine_newPayloadV1`. Carries the node's latest valid hash, if any.
    async fn new_payload(
        &self,
        token: &AuthToken,
        payload: &ExecutionPayloadV1,
    ) -> EngineCallOutcome<Option<B256>>;
}

/// Read-only view of the node's chain, over the unauthenticated RPC.
///
/// Failures never surface as errors: the node may still be starting up.
#[async_trait::async_trait]
pub trait ChainObserver: Send + Sync {
    /// Latest block, or `None` if the node is not ready.
    async fn head(&self) -> Option<HeadBlock>;

    /// Pending transactions in the pool; `0` on any failure.
    async fn pending_count(&self) -> u64;

    /// Whether the node can serve the block with this hash.
    async fn block_visible(&self, hash: B256) -> bool;
}
