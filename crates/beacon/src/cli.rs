//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use tracing::info;

use beacon_engine::{unix_now, EngineClient, FinalizeWait, PayloadDriver, RpcObserver, Secret, TokenManager};

use crate::config::{self, Config};
use crate::scheduler::{Scheduler, SchedulerSettings};

/// Keeps a post-merge Clique node producing blocks via the Engine API.
#[derive(Parser)]
#[command(name = "beacon-sim")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the block production loop.
    Run {
        /// Path to configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
        #[arg(short, long, default_value = "info")]
        log_level: String,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Initialize a new configuration file.
    Init {
        /// Output path for the config file.
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

/// Command-line overrides applied on top of the config file.
#[derive(clap::Args, Default)]
struct Overrides {
    /// Unauthenticated JSON-RPC URL.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Engine API URL.
    #[arg(long)]
    engine_url: Option<String>,

    /// JWT secret path; replaces the configured candidates.
    #[arg(long)]
    jwt_secret: Option<PathBuf>,

    /// Clique period in seconds.
    #[arg(long)]
    period: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.rpc_url {
            config.rpc.url = url;
        }
        if let Some(url) = self.engine_url {
            config.engine.url = url;
        }
        if let Some(path) = self.jwt_secret {
            config.engine.jwt_secret_paths = vec![path];
        }
        if let Some(period) = self.period {
            config.production.period_secs = period;
        }
    }
}

impl Cli {
    /// Log level requested on the command line.
    pub fn log_level(&self) -> &str {
        match &self.command {
            Some(Commands::Run { log_level, .. }) => log_level,
            _ => "info",
        }
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Some(Commands::Run { config, log_level: _, overrides }) => {
                Self::run_beacon(config, overrides).await
            }
            Some(Commands::Init { output }) => Self::init_config(output),
            None => {
                // Default: run with config.toml if present, defaults otherwise
                Self::run_beacon(PathBuf::from("config.toml"), Overrides::default()).await
            }
        }
    }

    async fn run_beacon(config_path: PathBuf, overrides: Overrides) -> Result<()> {
        info!(config = %config_path.display(), "Loading configuration");

        let mut cfg = config::load_or_default(&config_path)?;
        overrides.apply(&mut cfg);
        config::validate(&cfg)?;

        // Without the secret nothing can authenticate: fatal before the loop starts
        let secret = Secret::load(&cfg.engine.jwt_secret_paths)
            .wrap_err("cannot authenticate against the Engine API")?;
        let tokens = TokenManager::new(&secret, cfg.engine.token_validity_secs);

        let engine = EngineClient::new(
            cfg.engine.url.clone(),
            Duration::from_millis(cfg.engine.timeout_ms),
        )?;
        let observer = RpcObserver::new(&cfg.rpc.url, Duration::from_millis(cfg.rpc.timeout_ms))?;
        let driver = PayloadDriver::new(
            cfg.production.fee_recipient,
            FinalizeWait::from_config(&cfg.production),
        );

        info!(
            rpc = %cfg.rpc.url,
            engine = %cfg.engine.url,
            period_secs = cfg.production.period_secs,
            fee_recipient = %cfg.production.fee_recipient,
            "Starting beacon simulator"
        );

        let scheduler = Scheduler::new(
            engine,
            observer,
            tokens,
            driver,
            SchedulerSettings::from(&cfg),
            unix_now(),
        )?;
        scheduler.run().await
    }

    fn init_config(output: PathBuf) -> Result<()> {
        info!(path = %output.display(), "Generating default configuration");

        let cfg = config::default_config();
        let toml_str = toml::to_string_pretty(&cfg)?;
        std::fs::write(&output, toml_str)?;

        info!("Configuration written");
        Ok(())
    }
}
