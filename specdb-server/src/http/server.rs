//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use specdb_core::SpecdbConfig;

use super::routes;
use crate::images::{HttpProbe, ImageLocator};
use crate::session::SessionStore;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3030)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = localhost only)
    ///
    /// WARNING: Setting this to true allows any origin.
    /// Only use for development or documented use cases.
    pub cors_permissive: bool,

    /// Login page for anonymous callers
    pub login_url: String,

    /// Base URL of the photo store; probing is off when unset
    pub image_base_url: Option<String>,

    pub image_probe_timeout: Duration,

    /// Default page size for lists and the report
    pub list_page_size: u32,

    /// Rows per import preview page
    pub preview_page_size: usize,

    /// Enables the bulk-delete debug route
    pub debug_bulk_delete: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = SpecdbConfig::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_permissive: settings.cors_permissive,
            login_url: settings.login_url,
            image_base_url: settings.image_base_url,
            image_probe_timeout: Duration::from_secs(settings.image_probe_timeout_secs),
            list_page_size: settings.list_page_size,
            preview_page_size: settings.preview_page_size,
            debug_bulk_delete: settings.debug_bulk_delete,
        }
    }
}

impl ServerConfig {
    /// Build from the layered settings file and environment.
    pub fn from_settings(settings: &SpecdbConfig) -> Result<Self, ServerError> {
        let bind_addr = settings
            .bind_addr
            .parse()
            .map_err(|_| ServerError::InvalidBind(settings.bind_addr.clone()))?;
        Ok(Self {
            bind_addr,
            cors_permissive: settings.cors_permissive,
            login_url: settings.login_url.clone(),
            image_base_url: settings.image_base_url.clone(),
            image_probe_timeout: Duration::from_secs(settings.image_probe_timeout_secs),
            list_page_size: settings.list_page_size,
            preview_page_size: settings.preview_page_size,
            debug_bulk_delete: settings.debug_bulk_delete,
        })
    }
}

/// Shared application state
pub struct AppState {
    pub pool: PgPool,
    pub config: ServerConfig,
    pub sessions: SessionStore,
    pub images: ImageLocator,
}

impl AppState {
    pub fn new(pool: PgPool, config: ServerConfig) -> Result<Self, ServerError> {
        let images = match &config.image_base_url {
            Some(base) => {
                let probe = HttpProbe::new(config.image_probe_timeout)?;
                ImageLocator::new(Some(base.clone()), Arc::new(probe))
            }
            None => ImageLocator::disabled(),
        };
        Ok(Self {
            pool,
            config,
            sessions: SessionStore::new(),
            images,
        })
    }
}

/// All routes with CORS and tracing layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = if state.config.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        // Localhost only
        CorsLayer::new()
            .allow_origin([
                axum::http::HeaderValue::from_static("http://localhost:3000"),
                axum::http::HeaderValue::from_static("http://localhost:3030"),
                axum::http::HeaderValue::from_static("http://127.0.0.1:3000"),
                axum::http::HeaderValue::from_static("http://127.0.0.1:3030"),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(routes::health::router())
        .merge(routes::session::router())
        .merge(routes::records::router())
        .merge(routes::report::router())
        .merge(routes::export::router())
        .merge(routes::filters::router())
        .merge(routes::images::router())
        .merge(routes::legacy::router())
        .merge(routes::import::router())
        .merge(routes::debug::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&database_url).await?;
/// let config = ServerConfig::default();
/// run_server(pool, config).await?;
/// ```
pub async fn run_server(pool: PgPool, config: ServerConfig) -> Result<(), ServerError> {
    let bind_addr = config.bind_addr;
    if config.debug_bulk_delete {
        tracing::warn!("bulk delete debug route is enabled");
    }
    let state = Arc::new(AppState::new(pool, config)?);
    let app = build_router(state);

    // Bind listener
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bind address '{0}'")]
    InvalidBind(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3030);
        assert!(!config.cors_permissive);
        assert_eq!(config.login_url, "/accounts/login/");
        assert_eq!(config.image_probe_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_bad_bind_address() {
        let settings = SpecdbConfig {
            bind_addr: "not-an-address".into(),
            ..SpecdbConfig::default()
        };
        assert!(matches!(
            ServerConfig::from_settings(&settings),
            Err(ServerError::InvalidBind(_))
        ));
    }
}
