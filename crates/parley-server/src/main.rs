//! # Parley Server
//!
//! Real-time chat relay: clients join, chat, and see each other come and
//! go over a WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with custom config
//! parley --config /path/to/parley.toml
//!
//! # Run with environment variables
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 PARLEY_HUB__HISTORY_CAPACITY=20 parley
//! ```

mod config;
mod handlers;
mod metrics;
mod session;
mod shutdown;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "parley", version, about = "Real-time chat relay server")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load(cli.config.as_deref())?;

    // Initialize tracing
    if config.logging.enabled {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| config.logging.filter_directive().into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    let controller = shutdown::ShutdownController::new();
    tokio::spawn(shutdown::setup_signal_handlers(
        controller.clone(),
        Duration::from_millis(config.graceful_term_ms),
    ));

    // Start the server
    handlers::run_server(config, controller).await?;

    tracing::info!("Parley server stopped");
    Ok(())
}
