//! # Relay API
//!
//! HTTP surface of the relay job queue.
//!
//! Features:
//! - Axum-based web server
//! - `POST /process` job admission, `GET /health` and `GET /health/detailed`
//! - Tower middleware (request id, tracing, body limit, timeout)
//! - Background processor spawned alongside the listener
//! - Graceful shutdown

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{RelayServer, ServerConfig};
pub use state::AppState;
