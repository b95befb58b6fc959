//! Configuration types.

use std::path::PathBuf;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// Top-level beacon simulator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Unauthenticated JSON-RPC endpoint.
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Authenticated Engine API endpoint.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Block production pacing.
    #[serde(default)]
    pub production: ProductionConfig,
}

/// Plain JSON-RPC configuration (head and txpool queries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// HTTP JSON-RPC URL.
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { url: default_rpc_url(), timeout_ms: default_rpc_timeout_ms() }
    }
}

fn default_rpc_url() -> String {
    "http://localhost:8546".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    2000
}

/// Engine API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Authenticated Engine API URL.
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Candidate locations of the JWT secret, tried in order.
    ///
    /// A leading `~/` is expanded from `$HOME`.
    #[serde(default = "default_jwt_secret_paths")]
    pub jwt_secret_paths: Vec<PathBuf>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_engine_timeout_ms")]
    pub timeout_ms: u64,

    /// Proactive token refresh interval in seconds.
    ///
    /// Must be strictly shorter than `token_validity_secs`.
    #[serde(default = "default_token_refresh_interval_secs")]
    pub token_refresh_interval_secs: u64,

    /// How long after `iat` the node accepts a token.
    #[serde(default = "default_token_validity_secs")]
    pub token_validity_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            jwt_secret_paths: default_jwt_secret_paths(),
            timeout_ms: default_engine_timeout_ms(),
            token_refresh_interval_secs: default_token_refresh_interval_secs(),
            token_validity_secs: default_token_validity_secs(),
        }
    }
}

fn default_engine_url() -> String {
    "http://127.0.0.1:8551".to_string()
}

fn default_jwt_secret_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("~/local-blockchain/geth/jwtsecret"),
        PathBuf::from("geth/jwtsecret"),
        PathBuf::from("jwt.hex"),
    ]
}

fn default_engine_timeout_ms() -> u64 {
    5000
}

fn default_token_refresh_interval_secs() -> u64 {
    30
}

fn default_token_validity_secs() -> u64 {
    60 // Engine API authentication allows +-60s around iat
}

/// Block production configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionConfig {
    /// Clique period: target seconds between blocks.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Polling cadence of the scheduling loop in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Fee recipient placed in every payload-build request.
    #[serde(default = "default_fee_recipient")]
    pub fee_recipient: Address,

    /// Delay between `newPayload` and the adopting `forkchoiceUpdated`.
    ///
    /// Empirical: gives the node time to internalize the executed block.
    /// Also used as the base backoff when `finalize_poll_attempts > 0`.
    #[serde(default = "default_finalize_grace_ms")]
    pub finalize_grace_ms: u64,

    /// Poll for the new block instead of sleeping a fixed grace period.
    ///
    /// `0` keeps the fixed delay.
    #[serde(default)]
    pub finalize_poll_attempts: u32,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            fee_recipient: default_fee_recipient(),
            finalize_grace_ms: default_finalize_grace_ms(),
            finalize_poll_attempts: 0,
        }
    }
}

fn default_period_secs() -> u64 {
    5
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_fee_recipient() -> Address {
    address!("356981ee849c96fC40e78B0B22715345E57746fb")
}

fn default_finalize_grace_ms() -> u64 {
    500
}

impl BeaconConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&content).map_err(ConfigError::Parse)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error in config file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: BeaconConfig = toml::from_str("").unwrap();
        assert_eq!(config.rpc.url, "http://localhost:8546");
        assert_eq!(config.rpc.timeout_ms, 2000);
        assert_eq!(config.engine.url, "http://127.0.0.1:8551");
        assert_eq!(config.engine.token_validity_secs, 60);
        assert!(config.engine.token_refresh_interval_secs < config.engine.token_validity_secs);
        assert_eq!(config.production.period_secs, 5);
        assert_eq!(config.production.finalize_grace_ms, 500);
        assert_eq!(config.production.finalize_poll_attempts, 0);
    }

    #[test]
    fn test_partial_sections() {
        let config: BeaconConfig = toml::from_str(
            r#"
            [production]
            period_secs = 2
            fee_recipient = "0x0000000000000000000000000000000000000001"

            [engine]
            jwt_secret_paths = ["/tmp/secret"]
            "#,
        )
        .unwrap();

        assert_eq!(config.production.period_secs, 2);
        assert_eq!(config.production.tick_interval_ms, 1000);
        assert_eq!(config.production.fee_recipient, Address::with_last_byte(1));
        assert_eq!(config.engine.jwt_secret_paths, vec![PathBuf::from("/tmp/secret")]);
        assert_eq!(config.engine.timeout_ms, 5000);
    }
}
