//! Transparent WebSocket Reverse Proxy
//!
//! Accepts WebSocket upgrade requests, dials the configured backend, and
//! relays frames in both directions for the lifetime of each session.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │               WEBSOCKET PROXY                │
//!                    │                                              │
//!   Upgrade request  │  ┌─────────┐   ┌──────────┐   ┌───────────┐ │
//!   ─────────────────┼─▶│  http   │──▶│  proxy   │──▶│  backend  │─┼──▶ Backend
//!                    │  │ server  │   │ handler  │   │   dial    │ │    Server
//!                    │  └─────────┘   └────┬─────┘   └─────┬─────┘ │
//!                    │                     │               │       │
//!                    │                     ▼               ▼       │
//!   Frames           │               ┌──────────────────────────┐  │
//!   ◀────────────────┼──────────────▶│         session          │◀─┼──▶ Frames
//!                    │               │  (two directional pumps) │  │
//!                    │               └──────────────────────────┘  │
//!                    │                                              │
//!                    │  ┌────────────────────────────────────────┐ │
//!                    │  │   config    observability (logs, Prom) │ │
//!                    │  └────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use websocket_proxy::config::{loader, ProxyConfig};
use websocket_proxy::http::HttpServer;
use websocket_proxy::observability::{logging, metrics};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "websocket-proxy", about = "Transparent WebSocket reverse proxy")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => loader::load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.url,
        connect_timeout_secs = config.timeouts.connect_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
