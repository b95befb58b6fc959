//! Engine error types.

use std::path::PathBuf;

use crate::driver::Stage;

/// Errors raised while setting up or authenticating against the Engine API.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// None of the candidate secret locations exist.
    #[error("JWT secret not found (tried: {})", display_paths(.candidates))]
    SecretNotFound {
        /// Locations that were tried, after `~` expansion.
        candidates: Vec<PathBuf>,
    },

    /// The secret file exists but could not be read.
    #[error("failed to read JWT secret from {}: {source}", .path.display())]
    SecretUnreadable {
        /// Path of the secret file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The secret file is empty after trimming.
    #[error("JWT secret at {} is empty", .0.display())]
    EmptySecret(PathBuf),

    /// Token signing or decoding failed.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Token decoded but its `iat` is outside the validity window.
    #[error("token issued at {issued_at} is not valid at {now} (window {validity_secs}s)")]
    TokenExpired {
        /// Issued-at claim of the token.
        issued_at: u64,
        /// Verification time.
        now: u64,
        /// Accepted distance from `iat`.
        validity_secs: u64,
    },

    /// Failed to build an HTTP client.
    #[error("failed to build RPC client for {url}: {reason}")]
    ClientBuild {
        /// Endpoint URL.
        url: String,
        /// Builder error.
        reason: String,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// Why a single block-production sequence ended without committing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriveError {
    /// The node rejected the bearer token.
    #[error("engine rejected token during {stage}: {reason}")]
    AuthRejected {
        /// Stage that was rejected.
        stage: Stage,
        /// Error reported by the transport.
        reason: String,
    },

    /// The node could not be reached or answered garbage.
    #[error("engine unreachable during {stage}: {reason}")]
    Transport {
        /// Stage that failed.
        stage: Stage,
        /// Error reported by the transport.
        reason: String,
    },

    /// The build request was answered with `INVALID`.
    #[error("build request rejected as invalid: {reason}")]
    Rejected {
        /// Validation error reported by the node.
        reason: String,
    },

    /// The node accepted the forkchoice but did not start building.
    #[error("forkchoiceUpdated returned no payload ID (status {status})")]
    NoPayload {
        /// Status the node reported alongside the missing ID.
        status: String,
    },

    /// `engine_getPayloadV1` failed.
    #[error("failed to fetch built payload: {0}")]
    PayloadFetch(String),

    /// `engine_newPayloadV1` failed or reported the payload invalid.
    #[error("payload execution failed: {0}")]
    Execution(String),
}

impl DriveError {
    /// Whether the sequence should be retried with a fresh token.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}
