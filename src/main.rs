//! ack-server: a sequential TCP acknowledgment server
//!
//! Accepts one client at a time, reads messages framed only by read size
//! (a read shorter than the chunk size ends a message) and answers every
//! message with a fixed acknowledgment string.
//!
//! Features:
//! - Single-threaded, strictly sequential connection handling
//! - Per-connection error isolation
//! - Graceful shutdown on Ctrl-C between connections
//! - Configuration via CLI arguments or TOML file

mod config;
mod error;
mod framing;
mod handler;
mod listener;

use config::Config;
use listener::Listener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        backlog = config.backlog,
        chunk_size = config.chunk_size,
        read_timeout = ?config.read_timeout,
        "Starting ack-server"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let listener = Listener::bind(&config)?;
        let served = listener.run(shutdown_signal()).await;
        info!(connections = served, "Server stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs
/// until the process is killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
