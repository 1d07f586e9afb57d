//! Command implementations for the specdb CLI

pub mod backup;
pub mod export;
pub mod import;
pub mod migrate;
pub mod serve;

pub use backup::run_backup;
pub use export::run_export;
pub use import::run_import;
pub use migrate::run_migrate;
pub use serve::run_serve;

use anyhow::{Context, Result};
use specdb_core::SpecdbConfig;
use specdb_server::{create_pool_with, PgPool, PoolSettings};

/// Database URL from the flag, else `DATABASE_URL` or the config file.
pub(crate) fn database_url(flag: Option<String>, settings: &SpecdbConfig) -> Result<String> {
    flag.or_else(|| settings.database_url.clone())
        .filter(|url| !url.trim().is_empty())
        .context("DATABASE_URL not set. Set via --database-url, DATABASE_URL env, or ~/.specdb/config.toml")
}

/// Open a pool sized from the settings.
pub(crate) async fn connect(database_url: &str, settings: &SpecdbConfig) -> Result<PgPool> {
    create_pool_with(database_url, &PoolSettings::from_config(settings))
        .await
        .context("Failed to create database pool")
}
