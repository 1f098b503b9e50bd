//! Relay Server - Standalone entry point
//!
//! Thin wrapper around `relay-api`: reads configuration from the
//! environment, starts the job processor and serves the HTTP API.

use anyhow::Result;
use relay_api::{RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    relay_api::server::init_tracing();

    // Listener port comes from $PORT (default 5000)
    let config = ServerConfig::from_env();

    tracing::info!(
        addr = %config.addr,
        fetch_timeout_secs = config.processor.fetch_timeout.as_secs(),
        inter_job_delay_secs = config.processor.inter_job_delay.as_secs(),
        "Starting relay server"
    );

    let server = RelayServer::new(config);

    server.run().await.map_err(|e| {
        tracing::error!("Server error during execution: {}", e);
        e
    })?;

    Ok(())
}
