//! Spreadsheet backups of the core tables, with an optional `pg_dump`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use specdb_core::SpecdbConfig;
use specdb_server::{BackupOptions, LocalDirStore};

use super::{connect, database_url};
use crate::ui;

#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Backup directory (default from config: ~/.specdb/backups)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Copies to keep per backup file family
    #[arg(long)]
    pub keep: Option<usize>,

    /// Also write a pg_dump of the whole database (needs pg_dump on PATH)
    #[arg(long = "pg-dump")]
    pub pg_dump: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

pub async fn run_backup(args: BackupArgs, settings: SpecdbConfig) -> Result<()> {
    let database_url = database_url(args.database_url, &settings)?;
    let dir = args.dir.unwrap_or_else(|| settings.backup_dir.clone());
    let options = BackupOptions {
        keep: args.keep.unwrap_or(settings.backup_keep).max(1),
        dump_database_url: args.pg_dump.then(|| database_url.clone()),
    };

    let pool = connect(&database_url, &settings).await?;
    let store = LocalDirStore::new(&dir);

    let report = ui::with_spinner_async(
        format!("Backing up to {}", dir.display()),
        "Backup complete",
        specdb_server::run_backup(&pool, &store, &options),
    )
    .await
    .context("Backup failed")?;

    for name in &report.written {
        println!("wrote  {}", dir.join(name).display());
    }
    for name in &report.pruned {
        println!("pruned {}", dir.join(name).display());
    }
    Ok(())
}
