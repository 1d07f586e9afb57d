//! Database layer - connection pool, migrations, SQL rendering and repositories
//!
//! # Design Principles
//!
//! - Connection pool sized from the settings
//! - Every identifier comes from the static entity schema; values are bound
//! - Rely on DB constraints and classify their failures

pub mod pool;
pub mod query;
pub mod repos;

pub use pool::{create_pool, create_pool_with, run_migrations, PoolSettings, MIGRATOR};
pub use repos::*;
