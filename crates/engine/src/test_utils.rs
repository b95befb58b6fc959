//! Scripted test doubles for [`EngineApi`] and [`ChainObserver`].
//!
//! Unscripted calls behave like a healthy node: every build request yields
//! [`ScriptedEngine::payload_id`], every payload is
//! [`ScriptedEngine::BUILT_BLOCK_HASH`], every status is `VALID`.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy_primitives::{Address, Bloom, Bytes, B256, U256};
use alloy_rpc_types_engine::{ExecutionPayloadV1, PayloadId};
use beacon_types::HeadBlock;
use tokio::sync::oneshot;

use crate::{
    AuthToken, ChainObserver, EngineApi, EngineCallOutcome, ForkchoiceState,
    PayloadBuildAttributes,
};

/// One recorded Engine API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ForkchoiceUpdated {
        token: AuthToken,
        state: ForkchoiceState,
        attributes: Option<PayloadBuildAttributes>,
    },
    GetPayload {
        token: AuthToken,
        payload_id: PayloadId,
    },
    NewPayload {
        token: AuthToken,
        block_hash: B256,
    },
}

impl EngineCall {
    pub fn token(&self) -> &AuthToken {
        match self {
            Self::ForkchoiceUpdated { token, .. }
            | Self::GetPayload { token, .. }
            | Self::NewPayload { token, .. } => token,
        }
    }
}

/// [`EngineApi`] answering from per-method queues.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    forkchoice: Mutex<VecDeque<EngineCallOutcome<Option<PayloadId>>>>,
    get_payload: Mutex<VecDeque<EngineCallOutcome<ExecutionPayloadV1>>>,
    new_payload: Mutex<VecDeque<EngineCallOutcome<Option<B256>>>>,
    calls: Mutex<Vec<EngineCall>>,
}

impl ScriptedEngine {
    pub const BUILT_BLOCK_HASH: B256 = B256::repeat_byte(0xbb);

    /// ID handed out for unscripted build requests (`0x0000000000000001`).
    pub fn payload_id() -> PayloadId {
        PayloadId::new([0, 0, 0, 0, 0, 0, 0, 1])
    }

    pub fn push_forkchoice(&self, outcome: EngineCallOutcome<Option<PayloadId>>) {
        self.forkchoice.lock().unwrap().push_back(outcome);
    }

    pub fn push_get_payload(&self, outcome: EngineCallOutcome<ExecutionPayloadV1>) {
        self.get_payload.lock().unwrap().push_back(outcome);
    }

    pub fn push_new_payload(&self, outcome: EngineCallOutcome<Option<B256>>) {
        self.new_payload.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// States of every `forkchoiceUpdated` call, in order.
    pub fn forkchoice_states(&self) -> Vec<ForkchoiceState> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::ForkchoiceUpdated { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Build requests (forkchoice updates carrying attributes), in order.
    pub fn build_requests(&self) -> Vec<EngineCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, EngineCall::ForkchoiceUpdated { attributes: Some(_), .. }))
            .collect()
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Payload a healthy node would return for the default scripted build.
pub fn built_payload(timestamp: u64) -> ExecutionPayloadV1 {
    ExecutionPayloadV1 {
        parent_hash: B256::repeat_byte(0x0a),
        fee_recipient: Address::ZERO,
        state_root: B256::repeat_byte(0x01),
        receipts_root: B256::repeat_byte(0x02),
        logs_bloom: Bloom::ZERO,
        prev_randao: B256::ZERO,
        block_number: 11,
        gas_limit: 30_000_000,
        gas_used: 0,
        timestamp,
        extra_data: Bytes::new(),
        base_fee_per_gas: U256::from(7),
        block_hash: ScriptedEngine::BUILT_BLOCK_HASH,
        transactions: vec![],
    }
}

#[async_trait::async_trait]
impl EngineApi for ScriptedEngine {
    async fn forkchoice_updated(
        &self,
        token: &AuthToken,
        state: ForkchoiceState,
        attributes: Option<PayloadBuildAttributes>,
    ) -> EngineCallOutcome<Option<PayloadId>> {
        self.record(EngineCall::ForkchoiceUpdated { token: token.clone(), state, attributes });

        self.forkchoice.lock().unwrap().pop_front().unwrap_or_else(|| {
            EngineCallOutcome::Valid(attributes.map(|_| Self::payload_id()))
        })
    }

    async fn get_payload(
        &self,
        token: &AuthToken,
        payload_id: PayloadId,
    ) -> EngineCallOutcome<ExecutionPayloadV1> {
        self.record(EngineCall::GetPayload { token: token.clone(), payload_id });

        self.get_payload
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| EngineCallOutcome::Valid(built_payload(0)))
    }

    async fn new_payload(
        &self,
        token: &AuthToken,
        payload: &ExecutionPayloadV1,
    ) -> EngineCallOutcome<Option<B256>> {
        self.record(EngineCall::NewPayload { token: token.clone(), block_hash: payload.block_hash });

        self.new_payload
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(EngineCallOutcome::Valid(Some(payload.block_hash)))
    }
}

/// [`ChainObserver`] returning whatever the test last set.
#[derive(Debug, Default)]
pub struct StaticObserver {
    head: Mutex<Option<HeadBlock>>,
    pending: AtomicU64,
    visible: AtomicBool,
    visibility_checks: AtomicUsize,
    head_reads: AtomicUsize,
    on_head: Mutex<Option<oneshot::Sender<()>>>,
}

impl StaticObserver {
    pub fn with_head(head: HeadBlock) -> Self {
        let observer = Self::default();
        observer.set_head(Some(head));
        observer
    }

    pub fn set_head(&self, head: Option<HeadBlock>) {
        *self.head.lock().unwrap() = head;
    }

    pub fn set_pending(&self, pending: u64) {
        self.pending.store(pending, Ordering::SeqCst);
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn visibility_checks(&self) -> usize {
        self.visibility_checks.load(Ordering::SeqCst)
    }

    pub fn head_reads(&self) -> usize {
        self.head_reads.load(Ordering::SeqCst)
    }

    /// Resolves while the next `head()` call is in flight.
    pub fn notify_on_head(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.on_head.lock().unwrap() = Some(tx);
        rx
    }
}

#[async_trait::async_trait]
impl ChainObserver for StaticObserver {
    async fn head(&self) -> Option<HeadBlock> {
        self.head_reads.fetch_add(1, Ordering::SeqCst);
        let notify = self.on_head.lock().unwrap().take();
        if let Some(tx) = notify {
            let _ = tx.send(());
            tokio::task::yield_now().await;
        }
        *self.head.lock().unwrap()
    }

    async fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    async fn block_visible(&self, _hash: B256) -> bool {
        self.visibility_checks.fetch_add(1, Ordering::SeqCst);
        self.visible.load(Ordering::SeqCst)
    }
}
