//! Configuration loading and validation.

use std::path::Path;

use beacon_types::BeaconConfig;
use eyre::{Context, Result};
use tracing::warn;

use crate::scheduler::token_margin_secs;

/// Complete simulator configuration.
pub type Config = BeaconConfig;

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<Config> {
    BeaconConfig::load(path)
        .wrap_err_with(|| format!("failed to load config file: {}", path.display()))
}

/// Load configuration, falling back to defaults if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load(path)
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        Ok(default_config())
    }
}

/// Validate the configuration.
///
/// # Errors
///
/// Returns an error if validation fails.
pub fn validate(config: &Config) -> Result<()> {
    if config.rpc.url.is_empty() {
        eyre::bail!("rpc.url is required");
    }

    if config.engine.url.is_empty() {
        eyre::bail!("engine.url is required");
    }

    if config.engine.jwt_secret_paths.is_empty() {
        eyre::bail!("at least one engine.jwt_secret_paths entry is required");
    }

    // A token refreshed just in time must still cover a full sequence
    let margin = token_margin_secs(config);
    if config.engine.token_refresh_interval_secs.saturating_add(margin)
        >= config.engine.token_validity_secs
    {
        eyre::bail!(
            "engine.token_refresh_interval_secs ({}) plus the worst-case production sequence \
             ({margin}s) must be shorter than token_validity_secs ({})",
            config.engine.token_refresh_interval_secs,
            config.engine.token_validity_secs
        );
    }

    if config.production.period_secs == 0 {
        eyre::bail!("production.period_secs must be non-zero");
    }

    if config.production.tick_interval_ms == 0 {
        eyre::bail!("production.tick_interval_ms must be non-zero");
    }

    Ok(())
}

/// Generate a default configuration.
#[must_use]
pub fn default_config() -> Config {
    BeaconConfig::default()
}
