//! HTTP server command
//!
//! Settings come from the config file and environment; flags override them.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use specdb_core::SpecdbConfig;
use specdb_server::{run_server, ServerConfig};

use super::{connect, database_url};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default from config: 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Apply pending migrations before serving
    #[arg(long)]
    pub migrate: bool,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, settings: SpecdbConfig) -> Result<()> {
    let database_url = database_url(args.database_url, &settings)?;

    let mut config = ServerConfig::from_settings(&settings)?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.cors_permissive |= args.cors_permissive;

    tracing::info!("Starting specdb server on {}", config.bind_addr);

    let pool = connect(&database_url, &settings).await?;
    if args.migrate {
        specdb_server::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    // Run server (blocks until shutdown)
    run_server(pool, config).await.context("Server error")?;

    Ok(())
}
