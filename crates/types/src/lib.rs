//! Core types for the Clique beacon simulator.
//!
//! This crate provides shared type definitions used by the Engine API driver
//! and the scheduling binary.

#![warn(missing_docs)]

mod block;
mod config;
pub mod serde_helpers;

pub use block::{HeadBlock, PendingStatus};
pub use config::{BeaconConfig, ConfigError, EngineConfig, ProductionConfig, RpcConfig};
