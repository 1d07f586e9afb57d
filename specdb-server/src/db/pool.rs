//! Postgres pool and schema migrations
//!
//! Pool size and acquire timeout come from [`SpecdbConfig`]. The connection
//! target is logged by host and database name only, never the full URL.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use specdb_core::SpecdbConfig;

/// Versioned schema migrations, embedded at compile time.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Pool limits for the specimen database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &SpecdbConfig) -> Self {
        Self {
            max_connections: config.max_connections.max(1),
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs.max(1)),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from_config(&SpecdbConfig::default())
    }
}

/// Parse a `postgres://` URL.
pub fn connect_options(database_url: &str) -> Result<PgConnectOptions, sqlx::Error> {
    PgConnectOptions::from_str(database_url)
}

/// Pool with the default limits.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    create_pool_with(database_url, &PoolSettings::default()).await
}

/// Pool sized by `settings`.
///
/// # Errors
///
/// Returns an error if the URL does not parse or the first connection fails.
pub async fn create_pool_with(database_url: &str, settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    let options = connect_options(database_url)?;
    let host = options.get_host().to_owned();
    let database = options.get_database().unwrap_or("-").to_owned();

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await?;
    tracing::info!(
        %host,
        %database,
        max_connections = settings.max_connections,
        "connected to specimen database"
    );
    Ok(pool)
}

/// Apply any pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    let known = MIGRATOR.iter().count();
    tracing::info!(known, "running specimen schema migrations");
    MIGRATOR.run(pool).await?;
    tracing::info!("specimen schema is current");
    Ok(())
}
