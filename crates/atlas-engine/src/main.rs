//! # Atlas Engine
//!
//! Simulation driver for Project Atlas, an infinite procedurally generated
//! tile world for autonomous agents.
//!
//! Usage: `atlas [CONFIG_PATH]` (defaults to `atlas.toml` in the working
//! directory; missing files fall back to built-in defaults).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod config;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EngineConfig;

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("atlas=info".parse()?))
        .init();

    info!("Project Atlas starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };

    app::run(config)?;

    info!("Project Atlas shutdown complete");
    Ok(())
}
