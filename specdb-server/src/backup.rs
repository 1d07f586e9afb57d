//! Backups
//!
//! A backup run writes one spreadsheet per core table and, optionally, a
//! `pg_dump` of the whole database into a [`BackupStore`], then prunes each
//! backup family down to the newest `keep` files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::process::Command;

use specdb_core::EntityKind;

use crate::db::DbError;
use crate::export::raw_table;

/// Prefix of database dump files.
pub const DUMP_PREFIX: &str = "asa_postgres_backup_";

/// Tables exported to spreadsheets on every run.
const SPREADSHEET_TABLES: [EntityKind; 3] = [EntityKind::Specimen, EntityKind::Locality, EntityKind::Initials];

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("failed to write spreadsheet: {0}")]
    Tabular(#[from] specdb_core::TabularError),

    #[error("pg_dump failed: {0}")]
    Dump(String),
}

/// Where backup files go.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), BackupError>;

    /// Names of every stored file.
    async fn list(&self) -> Result<Vec<String>, BackupError>;

    async fn remove(&self, name: &str) -> Result<(), BackupError>;
}

/// A directory on the local filesystem.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BackupStore for LocalDirStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), BackupError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(name), bytes).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, BackupError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    async fn remove(&self, name: &str) -> Result<(), BackupError> {
        tokio::fs::remove_file(self.root.join(name)).await?;
        Ok(())
    }
}

/// Family a backup file belongs to, or `None` for unrelated files.
///
/// Names look like `<family>_<YYYYMMDD>_<HHMMSS>.<ext>`.
pub fn backup_family(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if !matches!(ext, "sql" | "xlsx") {
        return None;
    }
    let (rest, time) = stem.rsplit_once('_')?;
    let (family, date) = rest.rsplit_once('_')?;
    let is_digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    if family.is_empty() || !is_digits(date, 8) || !is_digits(time, 6) {
        return None;
    }
    Some(family)
}

/// Files to delete so each family keeps only its newest `keep` members.
pub fn prune_plan(names: &[String], keep: usize) -> Vec<String> {
    let mut families: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
    for name in names {
        if let Some(family) = backup_family(name) {
            families.entry(family).or_default().push(name);
        }
    }

    let mut doomed = Vec::new();
    for (_, mut members) in families {
        // Timestamps are fixed-width, so name order is age order.
        members.sort_unstable_by(|a, b| b.cmp(a));
        doomed.extend(members.into_iter().skip(keep).cloned());
    }
    doomed.sort();
    doomed
}

/// Options for one run.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub keep: usize,
    /// Connection string passed to `pg_dump`; no dump when `None`.
    pub dump_database_url: Option<String>,
}

/// What a run wrote and removed.
#[derive(Debug, Clone, Default)]
pub struct BackupReport {
    pub written: Vec<String>,
    pub pruned: Vec<String>,
}

/// Run `pg_dump` and capture its output.
async fn pg_dump(database_url: &str) -> Result<Vec<u8>, BackupError> {
    let output = Command::new("pg_dump")
        .arg("--no-owner")
        .arg("--dbname")
        .arg(database_url)
        .output()
        .await?;
    if !output.status.success() {
        return Err(BackupError::Dump(String::from_utf8_lossy(&output.stderr).trim().to_owned()));
    }
    Ok(output.stdout)
}

/// Export, dump and prune.
pub async fn run_backup(
    pool: &PgPool,
    store: &dyn BackupStore,
    options: &BackupOptions,
) -> Result<BackupReport, BackupError> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let mut report = BackupReport::default();

    if let Some(url) = options.dump_database_url.as_deref() {
        let name = format!("{DUMP_PREFIX}{stamp}.sql");
        let bytes = pg_dump(url).await?;
        store.put(&name, bytes).await?;
        tracing::info!(file = %name, "database dump written");
        report.written.push(name);
    }

    for kind in SPREADSHEET_TABLES {
        let table = raw_table(pool, kind).await?;
        let name = format!("{kind}_backup_{stamp}.xlsx");
        store.put(&name, table.to_xlsx(kind.schema().label)?).await?;
        tracing::info!(file = %name, rows = table.len(), "spreadsheet backup written");
        report.written.push(name);
    }

    let existing = store.list().await?;
    for name in prune_plan(&existing, options.keep.max(1)) {
        store.remove(&name).await?;
        tracing::info!(file = %name, "pruned old backup");
        report.pruned.push(name);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_backup_families() {
        assert_eq!(backup_family("asa_postgres_backup_20250101_120000.sql"), Some("asa_postgres_backup"));
        assert_eq!(backup_family("specimen_backup_20250101_120000.xlsx"), Some("specimen_backup"));
        assert_eq!(backup_family("notes.xlsx"), None);
        assert_eq!(backup_family("specimen_backup_2025_120000.xlsx"), None);
        assert_eq!(backup_family("specimen_backup_20250101_120000.csv"), None);
    }

    #[test]
    fn keeps_newest_per_family() {
        let names: Vec<String> = [
            "specimen_backup_20250101_000000.xlsx",
            "specimen_backup_20250301_000000.xlsx",
            "specimen_backup_20250201_000000.xlsx",
            "specimen_backup_20250401_000000.xlsx",
            "locality_backup_20250101_000000.xlsx",
            "asa_postgres_backup_20250101_000000.sql",
            "README.txt",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(prune_plan(&names, 3), vec!["specimen_backup_20250101_000000.xlsx"]);
        assert_eq!(
            prune_plan(&names, 1),
            vec![
                "specimen_backup_20250101_000000.xlsx",
                "specimen_backup_20250201_000000.xlsx",
                "specimen_backup_20250301_000000.xlsx",
            ]
        );
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path().join("backups"));
        assert!(store.list().await.unwrap().is_empty());

        store.put("a_backup_20250101_000000.xlsx", b"x".to_vec()).await.unwrap();
        store.put("a_backup_20250102_000000.xlsx", b"y".to_vec()).await.unwrap();
        let mut names = store.list().await.unwrap();
        names.sort();
        assert_eq!(names.len(), 2);

        for name in prune_plan(&names, 1) {
            store.remove(&name).await.unwrap();
        }
        assert_eq!(store.list().await.unwrap(), vec!["a_backup_20250102_000000.xlsx"]);
    }
}
