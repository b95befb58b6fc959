//! Typed results of Engine API calls.

use std::fmt;

use alloy_rpc_types_engine::PayloadStatusEnum;

/// Result of a single Engine API call, decoded once at the RPC boundary.
///
/// `T` is the call-specific value: a payload ID for `forkchoiceUpdated`, the
/// built payload for `getPayload`, the latest valid hash for `newPayload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCallOutcome<T> {
    /// The node accepted the call.
    Valid(T),

    /// The node accepted the call but has not fully validated it yet
    /// (`SYNCING` or `ACCEPTED`).
    Syncing(T),

    /// The node reported `INVALID`.
    Invalid {
        /// Validation error reported by the node.
        reason: String,
    },

    /// The bearer token was rejected.
    AuthError(String),

    /// Connection refused, timed out, or otherwise failed below JSON-RPC.
    TransportError(String),

    /// The node answered, but not with the expected result.
    MalformedResponse(String),
}

impl<T> EngineCallOutcome<T> {
    /// Map a payload status onto an outcome carrying `value`.
    pub fn from_status(status: PayloadStatusEnum, value: T) -> Self {
        match status {
            PayloadStatusEnum::Valid => Self::Valid(value),
            PayloadStatusEnum::Syncing | PayloadStatusEnum::Accepted => Self::Syncing(value),
            PayloadStatusEnum::Invalid { validation_error } => {
                Self::Invalid { reason: validation_error }
            }
        }
    }

    /// Transform the carried value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EngineCallOutcome<U> {
        match self {
            Self::Valid(v) => EngineCallOutcome::Valid(f(v)),
            Self::Syncing(v) => EngineCallOutcome::Syncing(f(v)),
            Self::Invalid { reason } => EngineCallOutcome::Invalid { reason },
            Self::AuthError(e) => EngineCallOutcome::AuthError(e),
            Self::TransportError(e) => EngineCallOutcome::TransportError(e),
            Self::MalformedResponse(e) => EngineCallOutcome::MalformedResponse(e),
        }
    }

    /// Whether the node accepted the call (`Valid` or `Syncing`).
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Valid(_) | Self::Syncing(_))
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "VALID",
            Self::Syncing(_) => "SYNCING",
            Self::Invalid { .. } => "INVALID",
            Self::AuthError(_) => "auth error",
            Self::TransportError(_) => "transport error",
            Self::MalformedResponse(_) => "malformed response",
        }
    }
}

impl<T> fmt::Display for EngineCallOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(_) | Self::Syncing(_) => f.write_str(self.label()),
            Self::Invalid { reason }
            | Self::AuthError(reason)
            | Self::TransportError(reason)
            | Self::MalformedResponse(reason) => write!(f, "{}: {reason}", self.label()),
        }
    }
}
