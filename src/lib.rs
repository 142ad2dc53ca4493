//! Signalbox library crate: semantic routing, parameter resolution,
//! workflow expansion, and the per-call supervisor pipeline.
pub mod cli;
pub mod core;
pub mod logging;

/// Current crate version string exposed for CLI and tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Result<T> = std::result::Result<T, anyhow::Error>;
