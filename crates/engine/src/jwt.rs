//! JWT token management for Engine API authentication.
//!
//! Implements HS256 tokens carrying only an `iat` claim, as required by the
//! Engine API authentication scheme.

use std::path::{Path, PathBuf};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Shared secret used to sign Engine API tokens.
///
/// Loaded once at startup and read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw secret bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Normalize secret file contents.
    ///
    /// Surrounding whitespace and an optional `0x` prefix are stripped. The
    /// remainder is hex-decoded when possible, otherwise used byte for byte.
    #[must_use]
    pub fn parse(contents: &[u8]) -> Self {
        let trimmed = contents.trim_ascii();
        let body = trimmed.strip_prefix(b"0x").unwrap_or(trimmed);

        match hex::decode(body) {
            Ok(bytes) => Self(bytes),
            Err(_) => Self(body.to_vec()),
        }
    }

    /// Load the secret from the first existing candidate path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SecretNotFound`] if no candidate exists, or an
    /// error if the file is unreadable or empty.
    pub fn load(candidates: &[PathBuf]) -> Result<Self> {
        let expanded: Vec<PathBuf> = candidates.iter().map(|p| expand_home(p)).collect();

        let Some(path) = expanded.iter().find(|p| p.is_file()) else {
            return Err(EngineError::SecretNotFound { candidates: expanded });
        };

        let contents = std::fs::read(path)
            .map_err(|source| EngineError::SecretUnreadable { path: path.clone(), source })?;

        let secret = Self::parse(&contents);
        if secret.0.is_empty() {
            return Err(EngineError::EmptySecret(path.clone()));
        }

        tracing::info!(path = %path.display(), len = secret.0.len(), "Loaded JWT secret");
        Ok(secret)
    }

    /// Secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(<{} bytes>)", self.0.len())
    }
}

/// Expand a leading `~/` from `$HOME`.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// A signed bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    /// Compact JWT (`header.payload.signature`).
    pub value: String,

    /// Issued-at time (unix seconds).
    pub issued_at: u64,
}

impl AuthToken {
    /// Seconds elapsed since issuance.
    #[must_use]
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.issued_at)
    }

    /// Whether a call issued at `now` may still present this token.
    #[must_use]
    pub fn is_usable(&self, now: u64, validity_secs: u64) -> bool {
        self.age(now) < validity_secs
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

/// JWT claims (https://github.com/ethereum/execution-apis/blob/main/src/engine/authentication.md).
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Issued-at, seconds since UNIX_EPOCH.
    iat: u64,
}

/// Issues and verifies Engine API tokens for one secret.
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity_secs: u64,
}

impl TokenManager {
    /// Create a token manager for `secret`.
    #[must_use]
    pub fn new(secret: &Secret, validity_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validity_secs,
        }
    }

    /// Validity window in seconds.
    #[must_use]
    pub fn validity_secs(&self) -> u64 {
        self.validity_secs
    }

    /// Issue a token with `iat = now`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, now: u64) -> Result<AuthToken> {
        let value = encode(&Header::new(Algorithm::HS256), &Claims { iat: now }, &self.encoding)?;
        Ok(AuthToken { value, issued_at: now })
    }

    /// Issue a token for the current wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn refresh(&self) -> Result<AuthToken> {
        self.issue(unix_now())
    }

    /// Verify a token the way the execution node does.
    ///
    /// Returns the token's `iat` if the signature matches and `now` is within
    /// the validity window of it.
    ///
    /// # Errors
    ///
    /// Returns an error on a bad signature, malformed token, or stale `iat`.
    pub fn verify(&self, token: &str, now: u64) -> Result<u64> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let issued_at = decode::<Claims>(token, &self.decoding, &validation)?.claims.iat;

        if issued_at.abs_diff(now) > self.validity_secs {
            return Err(EngineError::TokenExpired {
                issued_at,
                now,
                validity_secs: self.validity_secs,
            });
        }

        Ok(issued_at)
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
