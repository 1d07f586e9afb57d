//! specdb-server: HTTP service and database layer for specimen records
//!
//! Role-gated list, detail and edit views, the bulk import pipeline,
//! report exports, specimen photo lookup and scheduled backups.

pub mod backup;
pub mod db;
pub mod export;
pub mod http;
pub mod images;
pub mod import;
pub mod models;
pub mod session;

pub use backup::{run_backup, BackupError, BackupOptions, BackupReport, BackupStore, LocalDirStore};
pub use db::{create_pool, create_pool_with, run_migrations, DbError, PoolSettings, RecordRepo};
pub use http::{build_router, run_server, ApiError, AppState, ServerConfig, ServerError};
pub use import::IngestError;
pub use sqlx::PgPool;
