//! HTTP server layer
//!
//! Axum server with:
//! - CORS (localhost only by default)
//! - Request tracing
//! - Graceful shutdown
//! - JSON error responses and login redirects

pub mod error;
pub mod extractors;
pub mod links;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, AppState, ServerConfig, ServerError};
