//! Scheduling loop: decides each tick whether to produce a block.

use std::future::Future;
use std::time::Duration;

use alloy_primitives::B256;
use eyre::Result;
use tracing::{debug, error, info, warn};

use beacon_engine::{
    unix_now, AuthToken, BuildRequest, ChainObserver, Committed, DriveError, EngineApi,
    FinalizeWait, FinalizedPointer, PayloadDriver, TokenManager,
};
use beacon_types::{BeaconConfig, HeadBlock};

/// Whether this tick should trigger block production.
///
/// Fires when the chain has not moved since the last tick, when transactions
/// are waiting, or when the block period has elapsed.
#[must_use]
pub fn should_trigger(
    head_number: u64,
    last_observed_number: u64,
    pending_count: u64,
    now: u64,
    next_timestamp: u64,
) -> bool {
    head_number == last_observed_number || pending_count > 0 || now >= next_timestamp
}

/// State carried between ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopState {
    /// Highest block number seen so far.
    pub last_observed_number: u64,

    /// When the current token was issued.
    pub last_token_refresh: u64,

    /// Finalized pointer last sent to the node.
    pub finalized: Option<FinalizedPointer>,
}

impl LoopState {
    /// Finalized hash to send when building on `head`.
    ///
    /// Follows the head but never moves to a lower block number.
    fn advance_finalized(&mut self, head: &HeadBlock) -> B256 {
        let pointer = match self.finalized {
            Some(previous) => previous.advance(head),
            None => FinalizedPointer::at(head),
        };
        self.finalized = Some(pointer);
        pointer.hash
    }
}

/// Worst-case time from reading the head to the last Engine API call of one
/// production sequence.
#[must_use]
pub fn sequence_budget(config: &BeaconConfig) -> Duration {
    let rpc = Duration::from_millis(config.rpc.timeout_ms);
    let engine = Duration::from_millis(config.engine.timeout_ms);
    let finalize = FinalizeWait::from_config(&config.production).max_duration(rpc);

    // head and txpool reads, four engine calls, the finalize wait
    rpc * 2 + engine * 4 + finalize
}

/// [`sequence_budget`] rounded up to whole seconds.
#[must_use]
pub fn token_margin_secs(config: &BeaconConfig) -> u64 {
    let budget = sequence_budget(config);
    budget.as_secs() + u64::from(budget.subsec_nanos() > 0)
}

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Clique period in seconds.
    pub period_secs: u64,

    /// Proactive token refresh interval in seconds.
    pub refresh_interval_secs: u64,

    /// Seconds a token must outlive the tick that starts a sequence with it.
    pub token_margin_secs: u64,

    /// Cadence between ticks.
    pub tick_interval: Duration,
}

impl From<&BeaconConfig> for SchedulerSettings {
    fn from(config: &BeaconConfig) -> Self {
        Self {
            period_secs: config.production.period_secs,
            refresh_interval_secs: config.engine.token_refresh_interval_secs,
            token_margin_secs: token_margin_secs(config),
            tick_interval: Duration::from_millis(config.production.tick_interval_ms),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The node did not report a head; nothing was attempted.
    NotReady,

    /// No trigger condition held.
    Idle,

    /// A block was produced.
    Produced(Committed),

    /// Production was attempted and failed.
    Failed(DriveError),
}

/// The top-level control loop.
pub struct Scheduler<E, O> {
    engine: E,
    observer: O,
    tokens: TokenManager,
    driver: PayloadDriver,
    settings: SchedulerSettings,
    token: AuthToken,
    state: LoopState,
}

impl<E, O> Scheduler<E, O>
where
    E: EngineApi,
    O: ChainObserver,
{
    /// Create a scheduler holding a token issued at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial token cannot be signed.
    pub fn new(
        engine: E,
        observer: O,
        tokens: TokenManager,
        driver: PayloadDriver,
        settings: SchedulerSettings,
        now: u64,
    ) -> Result<Self> {
        let token = tokens.issue(now)?;
        debug!(issued_at = now, "Issued initial Engine API token");

        Ok(Self {
            engine,
            observer,
            tokens,
            driver,
            settings,
            token,
            state: LoopState { last_token_refresh: now, ..LoopState::default() },
        })
    }

    /// State carried between ticks.
    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Token currently presented to the engine.
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Run ticks until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Never returns an error from a tick; errors only back the loop off.
    pub async fn run(mut self) -> Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Run ticks until `shutdown` resolves.
    ///
    /// A tick in flight when `shutdown` resolves runs to completion and the
    /// loop stops right after it.
    ///
    /// # Errors
    ///
    /// Never returns an error from a tick; errors only back the loop off.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Result<()> {
        info!(
            period_secs = self.settings.period_secs,
            token_issued_at = self.token().issued_at,
            "Starting block production loop"
        );

        tokio::pin!(shutdown);
        let mut stopping = false;

        loop {
            let result = {
                let tick = self.tick_at(unix_now());
                tokio::pin!(tick);
                loop {
                    tokio::select! {
                        result = &mut tick => break result,
                        _ = &mut shutdown, if !stopping => {
                            warn!("Shutdown signal received, finishing current tick");
                            stopping = true;
                        }
                    }
                }
            };

            let pause = match result {
                Ok(outcome) => {
                    log_outcome(&outcome);
                    self.settings.tick_interval
                }
                Err(e) => {
                    // Back off a full period against a misbehaving node
                    error!(error = %e, "Tick failed");
                    Duration::from_secs(self.settings.period_secs)
                }
            };

            if stopping {
                break;
            }

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                _ = &mut shutdown => {
                    warn!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(last_block = self.state().last_observed_number, "Block production loop stopped");
        Ok(())
    }

    /// Execute one tick as if the wall clock read `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only if a token cannot be signed.
    pub async fn tick_at(&mut self, now: u64) -> Result<TickOutcome> {
        let Some(head) = self.observer.head().await else {
            debug!("Node not ready, skipping tick");
            return Ok(TickOutcome::NotReady);
        };

        // The token must stay valid until the last call of the sequence
        let token_stale = now.saturating_sub(self.state.last_token_refresh)
            >= self.settings.refresh_interval_secs
            || !self.token.is_usable(
                now.saturating_add(self.settings.token_margin_secs),
                self.tokens.validity_secs(),
            );
        if token_stale {
            self.refresh_token(now)?;
        }

        let pending = self.observer.pending_count().await;
        let next_timestamp = head.next_timestamp(self.settings.period_secs, now);
        let trigger =
            should_trigger(head.number, self.state.last_observed_number, pending, now, next_timestamp);

        debug!(
            head = head.number,
            last_observed = self.state.last_observed_number,
            pending,
            now,
            next_timestamp,
            trigger,
            "Tick"
        );

        let outcome = if trigger {
            let finalized = self.state.advance_finalized(&head);
            let request = BuildRequest { head, finalized, target_timestamp: next_timestamp };
            self.produce(&request, pending).await?
        } else {
            TickOutcome::Idle
        };

        if head.number > self.state.last_observed_number {
            info!(number = head.number, hash = %head.hash, "New block observed");
            self.state.last_observed_number = head.number;
        }

        Ok(outcome)
    }

    /// Run the driver, retrying once with a fresh token on auth rejection.
    async fn produce(&mut self, request: &BuildRequest, pending: u64) -> Result<TickOutcome> {
        let first = self.driver.run(&self.engine, &self.observer, request, &self.token).await;

        let result = match first {
            Err(e) if e.is_auth() => {
                warn!(error = %e, "Engine rejected token, refreshing and retrying once");
                let token = self.tokens.refresh()?;
                self.adopt(token);
                self.driver.run(&self.engine, &self.observer, request, &self.token).await
            }
            other => other,
        };

        Ok(match result {
            Ok(committed) => {
                info!(
                    parent = request.head.number,
                    block_hash = %committed.block_hash,
                    status = ?committed.status,
                    pending,
                    "Triggered block production"
                );
                TickOutcome::Produced(committed)
            }
            Err(e) => TickOutcome::Failed(e),
        })
    }

    fn refresh_token(&mut self, now: u64) -> Result<()> {
        let token = self.tokens.issue(now)?;
        self.adopt(token);
        Ok(())
    }

    fn adopt(&mut self, token: AuthToken) {
        debug!(issued_at = token.issued_at, "Refreshed Engine API token");
        self.state.last_token_refresh = token.issued_at;
        self.token = token;
    }
}

fn log_outcome(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::NotReady | TickOutcome::Idle | TickOutcome::Produced(_) => {}
        TickOutcome::Failed(e @ DriveError::AuthRejected { .. }) => {
            // Second rejection in a row; the next tick tries again
            debug!(error = %e, "Block production skipped this tick");
        }
        TickOutcome::Failed(e @ (DriveError::Rejected { .. } | DriveError::Execution(_))) => {
            warn!(error = %e, "Block production failed");
        }
        TickOutcome::Failed(e) => {
            debug!(error = %e, "Block production did not complete");
        }
    }
}
