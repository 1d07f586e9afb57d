use anyhow::{Context, Result};
use clap::Parser;

use specdb_core::SpecdbConfig;

use super::{connect, database_url};
use crate::ui;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Apply pending schema migrations.
pub async fn run_migrate(args: MigrateArgs, settings: SpecdbConfig) -> Result<()> {
    let database_url = database_url(args.database_url, &settings)?;
    let pool = connect(&database_url, &settings).await?;

    ui::with_spinner_async(
        "Applying migrations",
        "Schema up to date",
        specdb_server::run_migrations(&pool),
    )
    .await
    .context("Failed to run migrations")?;
    Ok(())
}
