//! Beacon simulator for a post-merge Clique chain.
//!
//! This binary stands in for a consensus client:
//! - polls the execution node's head and txpool
//! - decides when a block is due
//! - drives the Engine API handshake that produces it

#![warn(missing_docs)]

mod cli;
mod config;
mod scheduler;

use clap::Parser;
use eyre::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    cli.run().await
}
