//! TCP echo server.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 TCP SERVER                   │
//!                    │                                              │
//!  Client ──────────▶│  ┌──────────┐    ┌────────────┐   ┌────────┐ │
//!                    │  │   net    │───▶│ net server │──▶│handler │ │
//!                    │  │ listener │    │ accept loop│   │ (echo) │ │
//!                    │  └──────────┘    └─────┬──────┘   └────────┘ │
//!                    │                        │ drain               │
//!  SIGTERM/SIGINT ──▶│  ┌──────────────────────┴───────────────┐   │
//!                    │  │ lifecycle: signals → shutdown → stop │   │
//!                    │  └──────────────────────────────────────┘   │
//!                    │  config · observability (logs, metrics)     │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tcp_server::config::{load_config, Config};
use tcp_server::handler::EchoHandler;
use tcp_server::lifecycle::listen_and_serve_with_signal;
use tcp_server::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "tcp-server")]
#[command(about = "TCP echo server with graceful shutdown", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(address) = cli.address {
        config.server.address = address;
    }

    logging::init(&config.observability)?;

    tracing::debug!(?config, "Configuration loaded");

    if let Some(addr) = config.observability.metrics_address {
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics endpoint");
        }
    }

    let handler = Arc::new(EchoHandler::from_config(&config.server));
    listen_and_serve_with_signal(&config.server, handler).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
