//! Chain head and txpool observation over the unauthenticated RPC.

use std::time::Duration;

use alloy_primitives::B256;
use beacon_types::{HeadBlock, PendingStatus};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;

use crate::{ChainObserver, EngineError, Result};

/// [`ChainObserver`] backed by `eth_*` and `txpool_*` JSON-RPC calls.
pub struct RpcObserver {
    client: HttpClient,
}

impl RpcObserver {
    /// Create an observer for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| EngineError::ClientBuild { url: url.to_string(), reason: e.to_string() })?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ChainObserver for RpcObserver {
    async fn head(&self) -> Option<HeadBlock> {
        let response: std::result::Result<Option<HeadBlock>, _> = self
            .client
            .request("eth_getBlockByNumber", rpc_params!["latest", false])
            .await;

        match response {
            Ok(Some(head)) => Some(head),
            Ok(None) => {
                tracing::debug!("Node returned no latest block");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "Node not ready");
                None
            }
        }
    }

    async fn pending_count(&self) -> u64 {
        let response: std::result::Result<PendingStatus, _> =
            self.client.request("txpool_status", rpc_params![]).await;

        match response {
            Ok(status) => {
                tracing::trace!(pending = status.pending, queued = status.queued, "txpool status");
                status.pending
            }
            Err(e) => {
                tracing::debug!(error = %e, "txpool_status failed, assuming no pending transactions");
                0
            }
        }
    }

    async fn block_visible(&self, hash: B256) -> bool {
        let response: std::result::Result<Option<serde_json::Value>, _> =
            self.client.request("eth_getBlockByHash", rpc_params![hash, false]).await;

        matches!(response, Ok(Some(_)))
    }
}
