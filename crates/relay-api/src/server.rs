//! Relay API server with graceful shutdown

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use crate::error::ApiError;
use crate::middleware::{
    body_limit_error_middleware, body_limit_layer, request_id_middleware, timeout_layer,
    tracing_middleware,
};
use crate::routes::api_router;
use crate::state::AppState;
use relay_queue::{MemoryQueue, Processor, ProcessorConfig, QueueBackend};

/// Port used when `PORT` is unset or unparsable
pub const DEFAULT_PORT: u16 = 5000;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server address
    pub addr: SocketAddr,
    /// Request timeout
    pub timeout: Duration,
    /// Max request body size (bytes)
    pub max_body_size: usize,
    /// Background processor settings
    pub processor: ProcessorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
            processor: ProcessorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let timeout_secs: u64 = std::env::var("RELAY_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(30);

        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            timeout: Duration::from_secs(timeout_secs),
            processor: ProcessorConfig::from_env(),
            ..Default::default()
        }
    }
}

/// Relay API Server
pub struct RelayServer {
    config: ServerConfig,
    app_state: AppState,
    processor: Arc<Processor<dyn QueueBackend>>,
}

impl RelayServer {
    /// Create a server around a fresh in-memory queue
    pub fn new(config: ServerConfig) -> Self {
        let queue: Arc<dyn QueueBackend> = Arc::new(MemoryQueue::new());
        let processor = Processor::new_with_arc(queue.clone(), config.processor);
        let app_state = AppState::new(queue, processor.stats());

        Self {
            config,
            app_state,
            processor: Arc::new(processor),
        }
    }

    pub fn state(&self) -> AppState {
        self.app_state.clone()
    }

    /// Get the configured router
    pub fn router(&self) -> Router {
        api_router(self.app_state.clone())
            // Body size limit
            .layer(body_limit_layer(self.config.max_body_size))
            .layer(middleware::from_fn_with_state(
                self.config.max_body_size,
                body_limit_error_middleware,
            ))
            // Timeout
            .layer(timeout_layer(self.config.timeout))
            // Tracing
            .layer(middleware::from_fn(tracing_middleware))
            // Request ID (outermost, so the tracing span can see it)
            .layer(middleware::from_fn(request_id_middleware))
    }

    /// Run the processor and the HTTP listener until a shutdown signal.
    ///
    /// Jobs still queued at shutdown are lost.
    pub async fn run(self) -> Result<(), ApiError> {
        let app = self.router();
        let addr = self.config.addr;

        // Start the processor in background
        let processor = self.processor.clone();
        let worker = tokio::spawn(async move {
            processor.run().await;
        });

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Relay API listening on http://{}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        worker.abort();
        served.map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

        let remaining = self.app_state.queue().len().await;
        if remaining > 0 {
            tracing::warn!(queue_size = remaining, "Shutting down with jobs still queued");
        }
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Initialize tracing subscriber
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,relay_api=debug,relay_queue=debug,tower_http=debug")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
