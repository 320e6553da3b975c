//! Peer Relay
//!
//! A real-time message relay built with Tokio and Axum. Authenticated peers
//! hold one WebSocket each and address each other with `target:payload`
//! frames.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────┐
//!                    │                     PEER RELAY                    │
//!                    │                                                   │
//!   GET /ws?token=   │  ┌─────────┐   ┌─────────────┐   ┌────────────┐  │
//!   ─────────────────┼─▶│  http   │──▶│   session   │──▶│  registry  │  │
//!                    │  │websocket│   │    gate     │   │ peer→handle│  │
//!                    │  └────┬────┘   └──────┬──────┘   └─────▲──────┘  │
//!                    │       │ frames        │ credentials    │ lookup  │
//!                    │       ▼               ▼                │         │
//!   payload          │  ┌─────────┐   ┌─────────────┐   ┌─────┴──────┐  │
//!   ◀────────────────┼──│ handle  │◀──│   router    │   │    auth    │  │
//!                    │  │ (sink)  │   │target:payload   │ jwt+revoke │  │
//!                    │  └─────────┘   └─────────────┘   └────────────┘  │
//!                    │                                                   │
//!                    │  config · observability · lifecycle · admin       │
//!                    └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use peer_relay::config::load_or_default;
use peer_relay::lifecycle::signals;
use peer_relay::observability::{logging, metrics};
use peer_relay::RelayServer;

#[derive(Parser)]
#[command(name = "peer-relay")]
#[command(about = "Real-time peer-addressed message relay", long_about = None)]
struct Args {
    /// Path to a TOML config file; built-in defaults when omitted.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "peer-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        idle_timeout_secs = config.relay.idle_timeout_secs,
        delivery_timeout_secs = config.relay.delivery_timeout_secs,
        tls = config.listener.tls.is_some(),
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

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = RelayServer::new(config);
    signals::install(server.shutdown_handle());

    match tls {
        Some(tls) => server.run_tls(&tls).await?,
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
