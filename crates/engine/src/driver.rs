//! The four-call Engine API sequence that produces one block.
//!
//! `RequestBuild -> AwaitPayload -> ExecutePayload -> Finalize`, with any
//! stage able to end the sequence as a [`DriveError`].

use std::fmt;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use beacon_types::{HeadBlock, ProductionConfig};

use crate::{
    poll_until, AuthToken, ChainObserver, Committed, DriveError, EngineApi, EngineCallOutcome,
    ExecutionStatus, ForkchoiceState, PayloadBuildAttributes,
};

/// Stage of a production sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `forkchoiceUpdated` with payload attributes.
    RequestBuild,
    /// `getPayload`.
    AwaitPayload,
    /// `newPayload`.
    ExecutePayload,
    /// `forkchoiceUpdated` adopting the new block.
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequestBuild => "request-build",
            Self::AwaitPayload => "await-payload",
            Self::ExecutePayload => "execute-payload",
            Self::Finalize => "finalize",
        })
    }
}

/// How long to wait between `newPayload` and the adopting forkchoice update.
///
/// The node needs a moment to internalize an executed block before it can
/// become head. The fixed delay is empirical, not a guaranteed bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeWait {
    /// Sleep a fixed grace period.
    Fixed(Duration),

    /// Poll until the block is queryable by hash, with linear backoff.
    /// Proceeds anyway once attempts run out.
    Poll {
        /// Maximum number of visibility checks.
        attempts: u32,
        /// Backoff base; attempt `n` waits `base_delay * n`.
        base_delay: Duration,
    },
}

impl FinalizeWait {
    /// Strategy selected by the production config.
    #[must_use]
    pub fn from_config(config: &ProductionConfig) -> Self {
        let grace = Duration::from_millis(config.finalize_grace_ms);
        match config.finalize_poll_attempts {
            0 => Self::Fixed(grace),
            attempts => Self::Poll { attempts, base_delay: grace },
        }
    }

    /// Longest this wait can take when each visibility check may run for
    /// `check_timeout`.
    #[must_use]
    pub fn max_duration(&self, check_timeout: Duration) -> Duration {
        match *self {
            Self::Fixed(grace) => grace,
            Self::Poll { attempts, base_delay } => {
                let backoff_steps: u32 = (1..attempts).sum();
                base_delay * backoff_steps + check_timeout * attempts
            }
        }
    }
}

impl Default for FinalizeWait {
    fn default() -> Self {
        Self::Fixed(Duration::from_millis(500))
    }
}

/// Inputs for one production sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRequest {
    /// Block to build on.
    pub head: HeadBlock,

    /// Finalized hash sent with both forkchoice updates.
    pub finalized: B256,

    /// Timestamp of the block to build.
    pub target_timestamp: u64,
}

/// Runs the build/fetch/execute/adopt handshake for exactly one block.
#[derive(Debug, Clone)]
pub struct PayloadDriver {
    fee_recipient: Address,
    finalize_wait: FinalizeWait,
}

impl PayloadDriver {
    /// Create a driver paying fees to `fee_recipient`.
    #[must_use]
    pub fn new(fee_recipient: Address, finalize_wait: FinalizeWait) -> Self {
        Self { fee_recipient, finalize_wait }
    }

    /// Produce one block on top of `request.head`.
    ///
    /// The finalized hash is passed through unchanged to both forkchoice
    /// updates; the driver never advances finalization itself.
    ///
    /// # Errors
    ///
    /// Returns a [`DriveError`] naming the stage that failed. An
    /// [`DriveError::AuthRejected`] means the caller should refresh its
    /// token and may retry once.
    pub async fn run<E, O>(
        &self,
        engine: &E,
        observer: &O,
        request: &BuildRequest,
        token: &AuthToken,
    ) -> Result<Committed, DriveError>
    where
        E: EngineApi + ?Sized,
        O: ChainObserver + ?Sized,
    {
        let state = ForkchoiceState::new(request.head.hash, request.finalized);
        let attributes = PayloadBuildAttributes::new(request.target_timestamp, self.fee_recipient);

        tracing::debug!(
            stage = %Stage::RequestBuild,
            parent = %request.head.hash,
            parent_number = request.head.number,
            timestamp = request.target_timestamp,
            "Requesting payload build"
        );

        let payload_id = match engine.forkchoice_updated(token, state, Some(attributes)).await {
            EngineCallOutcome::Valid(Some(id)) | EngineCallOutcome::Syncing(Some(id)) => id,
            outcome @ (EngineCallOutcome::Valid(None) | EngineCallOutcome::Syncing(None)) => {
                return Err(DriveError::NoPayload { status: outcome.label().to_string() });
            }
            EngineCallOutcome::Invalid { reason } => {
                tracing::warn!(%reason, "Build request rejected as invalid");
                return Err(DriveError::Rejected { reason });
            }
            EngineCallOutcome::AuthError(reason) => {
                return Err(DriveError::AuthRejected { stage: Stage::RequestBuild, reason });
            }
            EngineCallOutcome::TransportError(reason) | EngineCallOutcome::MalformedResponse(reason) => {
                return Err(DriveError::Transport { stage: Stage::RequestBuild, reason });
            }
        };

        tracing::debug!(stage = %Stage::AwaitPayload, ?payload_id, "Fetching built payload");

        let payload = match engine.get_payload(token, payload_id).await {
            EngineCallOutcome::Valid(payload) | EngineCallOutcome::Syncing(payload) => payload,
            other => return Err(DriveError::PayloadFetch(other.to_string())),
        };

        tracing::debug!(
            stage = %Stage::ExecutePayload,
            block_number = payload.block_number,
            block_hash = %payload.block_hash,
            tx_count = payload.transactions.len(),
            "Executing payload"
        );

        let status = match engine.new_payload(token, &payload).await {
            EngineCallOutcome::Valid(_) => ExecutionStatus::Valid,
            EngineCallOutcome::Syncing(_) => ExecutionStatus::Syncing,
            other => {
                tracing::warn!(block_hash = %payload.block_hash, outcome = %other, "Payload execution failed");
                return Err(DriveError::Execution(other.to_string()));
            }
        };

        let block_hash = payload.block_hash;
        self.wait_for_block(observer, block_hash).await;

        tracing::debug!(stage = %Stage::Finalize, %block_hash, finalized = %request.finalized, "Adopting new block");

        let finalize = engine.forkchoice_updated(token, state.with_soft(block_hash), None).await;
        let finalize_acknowledged = finalize.is_success();
        if !finalize_acknowledged {
            tracing::warn!(%block_hash, outcome = %finalize, "Adopting forkchoice update not acknowledged");
        }

        Ok(Committed {
            block_hash,
            block_number: payload.block_number,
            status,
            finalize_acknowledged,
        })
    }

    async fn wait_for_block<O>(&self, observer: &O, block_hash: B256)
    where
        O: ChainObserver + ?Sized,
    {
        match self.finalize_wait {
            FinalizeWait::Fixed(grace) => tokio::time::sleep(grace).await,
            FinalizeWait::Poll { attempts, base_delay } => {
                poll_until("block visibility", attempts, base_delay, || {
                    observer.block_visible(block_hash)
                })
                .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EngineCall, ScriptedEngine, StaticObserver};

    fn driver() -> PayloadDriver {
        PayloadDriver::new(Address::with_last_byte(0x42), FinalizeWait::Fixed(Duration::ZERO))
    }

    fn request() -> BuildRequest {
        let head = HeadBlock { hash: B256::repeat_byte(0x0a), number: 10, timestamp: 100 };
        BuildRequest { head, finalized: B256::repeat_byte(0xf0), target_timestamp: 105 }
    }

    fn token() -> AuthToken {
        AuthToken { value: "h.p.s".to_string(), issued_at: 100 }
    }

    #[tokio::test]
    async fn test_commits_with_four_calls() {
        let engine = ScriptedEngine::default();
        let observer = StaticObserver::default();

        let committed = driver().run(&engine, &observer, &request(), &token()).await.unwrap();
        assert_eq!(committed.block_hash, ScriptedEngine::BUILT_BLOCK_HASH);
        assert_eq!(committed.block_number, 11);
        assert!(committed.is_valid());
        assert!(committed.finalize_acknowledged);

        let calls = engine.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0], EngineCall::ForkchoiceUpdated { attributes: Some(_), .. }));
        assert!(matches!(calls[1], EngineCall::GetPayload { .. }));
        assert!(matches!(calls[2], EngineCall::NewPayload { .. }));
        assert!(matches!(calls[3], EngineCall::ForkchoiceUpdated { attributes: None, .. }));
    }

    #[tokio::test]
    async fn test_finalized_identical_in_both_forkchoice_calls() {
        let engine = ScriptedEngine::default();
        let request = request();

        driver().run(&engine, &StaticObserver::default(), &request, &token()).await.unwrap();

        let states = engine.forkchoice_states();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].finalized, request.finalized);
        assert_eq!(states[1].finalized, request.finalized);

        assert_eq!(states[0].head, request.head.hash);
        assert_eq!(states[0].safe, request.head.hash);
        assert_eq!(states[1].head, ScriptedEngine::BUILT_BLOCK_HASH);
        assert_eq!(states[1].safe, ScriptedEngine::BUILT_BLOCK_HASH);
    }

    #[tokio::test]
    async fn test_build_attributes() {
        let engine = ScriptedEngine::default();
        driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap();

        let calls = engine.calls();
        let EngineCall::ForkchoiceUpdated { attributes: Some(attributes), .. } = &calls[0] else {
            panic!("first call must request a build");
        };
        assert_eq!(attributes.timestamp, 105);
        assert_eq!(attributes.prev_randao, B256::ZERO);
        assert_eq!(attributes.suggested_fee_recipient, Address::with_last_byte(0x42));
    }

    #[tokio::test]
    async fn test_auth_error_aborts_before_fetch() {
        let engine = ScriptedEngine::default();
        engine.push_forkchoice(EngineCallOutcome::AuthError("Request rejected `401`".into()));

        let err = driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_syncing_with_payload_id_advances() {
        let engine = ScriptedEngine::default();
        engine.push_forkchoice(EngineCallOutcome::Syncing(Some(ScriptedEngine::payload_id())));
        engine.push_new_payload(EngineCallOutcome::Syncing(None));

        let committed =
            driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap();
        assert_eq!(committed.status, ExecutionStatus::Syncing);
        assert!(!committed.is_valid());
    }

    #[tokio::test]
    async fn test_missing_payload_id_fails() {
        let engine = ScriptedEngine::default();
        engine.push_forkchoice(EngineCallOutcome::Valid(None));

        let err = driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap_err();
        assert_eq!(err, DriveError::NoPayload { status: "VALID".to_string() });
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_build_request() {
        let engine = ScriptedEngine::default();
        engine.push_forkchoice(EngineCallOutcome::Invalid { reason: "unknown parent".into() });

        let err = driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap_err();
        assert_eq!(err, DriveError::Rejected { reason: "unknown parent".to_string() });
    }

    #[tokio::test]
    async fn test_transport_error_on_build() {
        let engine = ScriptedEngine::default();
        engine.push_forkchoice(EngineCallOutcome::TransportError("connection refused".into()));

        let err = driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap_err();
        assert!(matches!(err, DriveError::Transport { stage: Stage::RequestBuild, .. }));
        assert!(!err.is_auth());
    }

    #[tokio::test]
    async fn test_payload_fetch_failure() {
        let engine = ScriptedEngine::default();
        engine.push_get_payload(EngineCallOutcome::MalformedResponse("Unknown payload".into()));

        let err = driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap_err();
        assert!(matches!(err, DriveError::PayloadFetch(ref msg) if msg.contains("Unknown payload")));
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_execution_failure() {
        let engine = ScriptedEngine::default();
        engine.push_new_payload(EngineCallOutcome::Invalid { reason: "bad state root".into() });

        let err = driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap_err();
        assert!(matches!(err, DriveError::Execution(ref msg) if msg.contains("bad state root")));
        assert_eq!(engine.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_unacknowledged_finalize_still_commits() {
        let engine = ScriptedEngine::default();
        engine.push_forkchoice(EngineCallOutcome::Valid(Some(ScriptedEngine::payload_id())));
        engine.push_forkchoice(EngineCallOutcome::TransportError("timeout".into()));

        let committed =
            driver().run(&engine, &StaticObserver::default(), &request(), &token()).await.unwrap();
        assert_eq!(committed.block_hash, ScriptedEngine::BUILT_BLOCK_HASH);
        assert!(!committed.finalize_acknowledged);
    }

    #[tokio::test]
    async fn test_poll_wait_checks_visibility() {
        let engine = ScriptedEngine::default();
        let observer = StaticObserver::default();
        observer.set_visible(true);

        let driver = PayloadDriver::new(
            Address::ZERO,
            FinalizeWait::Poll { attempts: 3, base_delay: Duration::from_millis(1) },
        );
        driver.run(&engine, &observer, &request(), &token()).await.unwrap();

        assert_eq!(observer.visibility_checks(), 1);
    }

    #[tokio::test]
    async fn test_poll_wait_is_bounded() {
        let engine = ScriptedEngine::default();
        let observer = StaticObserver::default();

        let driver = PayloadDriver::new(
            Address::ZERO,
            FinalizeWait::Poll { attempts: 2, base_delay: Duration::from_millis(1) },
        );
        let committed = driver.run(&engine, &observer, &request(), &token()).await.unwrap();

        assert_eq!(observer.visibility_checks(), 2);
        assert!(committed.finalize_acknowledged);
        assert_eq!(engine.calls().len(), 4);
    }

    #[test]
    fn test_finalize_wait_from_config() {
        let mut config = ProductionConfig::default();
        assert_eq!(FinalizeWait::from_config(&config), FinalizeWait::Fixed(Duration::from_millis(500)));

        config.finalize_poll_attempts = 4;
        config.finalize_grace_ms = 100;
        assert_eq!(
            FinalizeWait::from_config(&config),
            FinalizeWait::Poll { attempts: 4, base_delay: Duration::from_millis(100) }
        );
    }

    #[test]
    fn test_finalize_wait_max_duration() {
        let check = Duration::from_secs(1);
        assert_eq!(FinalizeWait::default().max_duration(check), Duration::from_millis(500));

        // Sleeps 100 + 200 ms between three checks of up to 1s each
        let poll = FinalizeWait::Poll { attempts: 3, base_delay: Duration::from_millis(100) };
        assert_eq!(poll.max_duration(check), Duration::from_millis(3300));

        let never = FinalizeWait::Poll { attempts: 0, base_delay: Duration::from_millis(100) };
        assert_eq!(never.max_duration(check), Duration::ZERO);
    }
}
