//! Engine API client implementation.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use alloy_primitives::B256;
use alloy_rpc_types_engine::{ExecutionPayloadV1, ForkchoiceUpdated, PayloadId, PayloadStatus};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;

use crate::{
    AuthToken, EngineApi, EngineCallOutcome, EngineError, ForkchoiceState,
    PayloadBuildAttributes, Result,
};

/// Client for the authenticated Engine API endpoint.
///
/// Holds one HTTP client per bearer token; a new token rebuilds it.
pub struct EngineClient {
    url: String,
    timeout: Duration,
    cached: Mutex<Option<(String, HttpClient)>>,
}

impl EngineClient {
    /// Create a new Engine API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(EngineError::ClientBuild {
                url,
                reason: "engine url cannot be empty".to_string(),
            });
        }

        Ok(Self { url, timeout, cached: Mutex::new(None) })
    }

    /// HTTP client presenting `token`.
    fn client_for(&self, token: &AuthToken) -> std::result::Result<HttpClient, String> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((value, client)) = cached.as_ref() {
            if *value == token.value {
                return Ok(client.clone());
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&token.bearer()).map_err(|e| format!("invalid header value: {e}"))?,
        );

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(self.timeout)
            .build(&self.url)
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        tracing::debug!(issued_at = token.issued_at, "Rebuilt Engine API client for new token");
        *cached = Some((token.value.clone(), client.clone()));
        Ok(client)
    }

    /// Issue one authenticated call and classify transport-level failures.
    async fn call<R: DeserializeOwned>(
        &self,
        token: &AuthToken,
        method: &'static str,
        params: ArrayParams,
    ) -> EngineCallOutcome<R> {
        let client = match self.client_for(token) {
            Ok(client) => client,
            Err(e) => return EngineCallOutcome::TransportError(e),
        };

        match client.request::<R, _>(method, params).await {
            Ok(response) => EngineCallOutcome::Valid(response),
            Err(e) => {
                let outcome = classify_error(&e);
                tracing::debug!(method, error = %e, kind = outcome.label(), "Engine API call failed");
                outcome
            }
        }
    }
}

#[async_trait::async_trait]
impl EngineApi for EngineClient {
    async fn forkchoice_updated(
        &self,
        token: &AuthToken,
        state: ForkchoiceState,
        attributes: Option<PayloadBuildAttributes>,
    ) -> EngineCallOutcome<Option<PayloadId>> {
        tracing::debug!(
            head = %state.head,
            safe = %state.safe,
            finalized = %state.finalized,
            building = attributes.is_some(),
            "Updating forkchoice"
        );

        let engine_state: alloy_rpc_types_engine::ForkchoiceState = state.into();

        // Parameters: forkchoice_state, payload_attributes (None = no new block)
        let outcome: EngineCallOutcome<ForkchoiceUpdated> = self
            .call(token, "engine_forkchoiceUpdatedV1", rpc_params![engine_state, attributes])
            .await;

        match outcome {
            EngineCallOutcome::Valid(response) => {
                tracing::debug!(
                    status = ?response.payload_status.status,
                    payload_id = ?response.payload_id,
                    latest_valid_hash = ?response.payload_status.latest_valid_hash,
                    "engine_forkchoiceUpdatedV1 response"
                );
                EngineCallOutcome::from_status(response.payload_status.status, response.payload_id)
            }
            other => other.map(|_| None),
        }
    }

    async fn get_payload(
        &self,
        token: &AuthToken,
        payload_id: PayloadId,
    ) -> EngineCallOutcome<ExecutionPayloadV1> {
        tracing::debug!(?payload_id, "Getting built payload");

        let outcome: EngineCallOutcome<ExecutionPayloadV1> =
            self.call(token, "engine_getPayloadV1", rpc_params![payload_id]).await;

        if let EngineCallOutcome::Valid(payload) = &outcome {
            tracing::debug!(
                block_number = payload.block_number,
                block_hash = %payload.block_hash,
                gas_used = payload.gas_used,
                tx_count = payload.transactions.len(),
                "Got built payload"
            );
        }

        outcome
    }

    async fn new_payload(
        &self,
        token: &AuthToken,
        payload: &ExecutionPayloadV1,
    ) -> EngineCallOutcome<Option<B256>> {
        let outcome: EngineCallOutcome<PayloadStatus> =
            self.call(token, "engine_newPayloadV1", rpc_params![payload]).await;

        match outcome {
            EngineCallOutcome::Valid(response) => {
                tracing::debug!(
                    ?response.status,
                    latest_valid_hash = ?response.latest_valid_hash,
                    "engine_newPayloadV1 response"
                );
                EngineCallOutcome::from_status(response.status, response.latest_valid_hash)
            }
            other => other.map(|_| None),
        }
    }
}

/// Map a client error onto the outcome taxonomy.
fn classify_error<T>(error: &ClientError) -> EngineCallOutcome<T> {
    match error {
        ClientError::Call(object) => {
            let message = format!("rpc error {}: {}", object.code(), object.message());
            if is_auth_message(&message) {
                EngineCallOutcome::AuthError(message)
            } else {
                EngineCallOutcome::MalformedResponse(message)
            }
        }
        ClientError::ParseError(e) => EngineCallOutcome::MalformedResponse(e.to_string()),
        ClientError::RequestTimeout => EngineCallOutcome::TransportError("request timeout".to_string()),
        other => {
            let message = other.to_string();
            if is_auth_status(&message) || is_auth_message(&message) {
                EngineCallOutcome::AuthError(message)
            } else {
                EngineCallOutcome::TransportError(message)
            }
        }
    }
}

/// Whether an HTTP-level failure carries a 401 or 403 status.
///
/// Only whole numeric words count, so hashes and quantities never match.
fn is_auth_status(message: &str) -> bool {
    message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == "401" || word == "403")
}

/// Whether an error message reports a rejected or stale bearer token.
fn is_auth_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("token is expired")
        || lower.contains("stale token")
        || lower.contains("missing token")
        || lower.contains("invalid token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObjectOwned;

    #[test]
    fn test_empty_url_fails() {
        let client = EngineClient::new("", Duration::from_secs(5));
        assert!(matches!(client, Err(EngineError::ClientBuild { .. })));
    }

    #[tokio::test]
    async fn test_client_cached_per_token() {
        let client = EngineClient::new("http://127.0.0.1:8551", Duration::from_secs(5)).unwrap();
        let first = AuthToken { value: "a.b.c".to_string(), issued_at: 1 };
        let second = AuthToken { value: "d.e.f".to_string(), issued_at: 2 };

        client.client_for(&first).unwrap();
        assert_eq!(client.cached.lock().unwrap().as_ref().unwrap().0, "a.b.c");

        client.client_for(&second).unwrap();
        assert_eq!(client.cached.lock().unwrap().as_ref().unwrap().0, "d.e.f");
    }

    #[test]
    fn test_auth_failure_detection() {
        assert!(is_auth_status("Request rejected `401`"));
        assert!(is_auth_status("HTTP status client error (403 Forbidden)"));
        assert!(!is_auth_status("connection refused"));
        assert!(!is_auth_status("block 0x4013ab not found"));
        assert!(!is_auth_status("gas 14030"));

        assert!(is_auth_message("token is expired"));
        assert!(is_auth_message("401 Unauthorized"));
        assert!(!is_auth_message("Unknown payload"));
    }

    #[test]
    fn test_classify_call_errors() {
        let unknown = ClientError::Call(ErrorObjectOwned::owned(-38001, "Unknown payload", None::<()>));
        assert!(matches!(classify_error::<()>(&unknown), EngineCallOutcome::MalformedResponse(_)));

        let stale = ClientError::Call(ErrorObjectOwned::owned(-32000, "token is expired", None::<()>));
        assert!(matches!(classify_error::<()>(&stale), EngineCallOutcome::AuthError(_)));

        // Digits inside a JSON-RPC error message are not an HTTP status
        let digits = ClientError::Call(ErrorObjectOwned::owned(
            -32000,
            "invalid parent 0x401 at height 403",
            None::<()>,
        ));
        assert!(matches!(classify_error::<()>(&digits), EngineCallOutcome::MalformedResponse(_)));

        let rejected = ClientError::Custom("Request rejected `401`".to_string());
        assert!(matches!(classify_error::<()>(&rejected), EngineCallOutcome::AuthError(_)));

        assert!(matches!(
            classify_error::<()>(&ClientError::RequestTimeout),
            EngineCallOutcome::TransportError(_)
        ));
    }

    #[test]
    fn test_classify_parse_error() {
        let parse = serde_json::from_str::<ForkchoiceUpdated>("null").unwrap_err();
        let outcome = classify_error::<()>(&ClientError::ParseError(parse));
        assert!(matches!(outcome, EngineCallOutcome::MalformedResponse(_)));
    }
}
