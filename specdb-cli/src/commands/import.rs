//! Import a CSV/XLSX file from the command line
//!
//! Runs the same validation as the web preview. Every row problem is printed;
//! rows are inserted only when the whole file is clean.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use specdb_core::{EntityKind, ImportSession, ImportSummary, SpecdbConfig};
use specdb_server::import;

use super::{connect, database_url};
use crate::ui;

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// CSV or XLSX file to import
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Entity kind the rows belong to
    #[arg(long, default_value = "specimen")]
    pub kind: EntityKind,

    /// Validate and report without inserting anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Lines describing every error and warning, 1-based row numbers.
pub fn describe_issues(session: &ImportSession) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, report) in &session.reports {
        for issue in &report.errors {
            lines.push(format!("row {}: error: {}: {}", index + 1, issue.field, issue.message));
        }
        for issue in &report.warnings {
            lines.push(format!("row {}: warning: {}: {}", index + 1, issue.field, issue.message));
        }
    }
    lines
}

/// Summary line followed by one line per failed row. Rows are already 1-based.
pub fn summary_lines(summary: &ImportSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Created {} row(s), {} failed",
        summary.created, summary.failed
    )];
    lines.extend(summary.failures().map(|outcome| {
        format!(
            "row {} ({}): {}",
            outcome.row,
            outcome.key.as_deref().unwrap_or("-"),
            outcome.error.as_deref().unwrap_or_default()
        )
    }));
    lines
}

pub async fn run_import(args: ImportArgs, settings: SpecdbConfig) -> Result<()> {
    let bytes = std::fs::read(&args.file).with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let database_url = database_url(args.database_url, &settings)?;
    let pool = connect(&database_url, &settings).await?;

    let mut session = ui::with_spinner_async(
        format!("Validating {file_name}"),
        format!("Validated {file_name}"),
        import::start(&pool, args.kind, &file_name, &bytes),
    )
    .await?;

    for column in &session.ignored_columns {
        println!("ignored column: {column}");
    }
    for line in describe_issues(&session) {
        println!("{line}");
    }

    let error_rows = session.error_row_count();
    if error_rows > 0 {
        bail!("{error_rows} row(s) have errors; nothing was imported");
    }
    if args.dry_run {
        println!("{} row(s) ready to import (dry run)", session.table.len());
        return Ok(());
    }

    let summary = import::commit(&pool, &mut session).await?;
    for line in summary_lines(&summary) {
        println!("{line}");
    }
    if summary.failed > 0 {
        bail!("{} row(s) failed to insert", summary.failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use specdb_core::import::{RowIssue, RowReport};
    use specdb_core::Table;

    #[test]
    fn describes_issues_with_one_based_rows() {
        let mut table = Table::new(vec!["localityCode".to_owned(), "notes".to_owned()]);
        for code in ["KL", "PD", ""] {
            table.push_row(vec![code.to_owned(), String::new()]);
        }
        let mut session = ImportSession::new(EntityKind::Locality, "rows.csv", table).unwrap();
        assert_eq!(session.ignored_columns, vec!["notes"]);
        session.reports.insert(
            2,
            RowReport {
                errors: vec![RowIssue {
                    field: "localityCode".into(),
                    message: "This field is required.".into(),
                }],
                warnings: vec![],
            },
        );

        assert_eq!(
            describe_issues(&session),
            vec!["row 3: error: localityCode: This field is required."]
        );
    }

    #[test]
    fn summary_reports_failed_rows_as_stored() {
        let mut summary = ImportSummary::default();
        summary.record_failure(0, Some("2024-KL-0001".into()), "Duplicate value");
        summary.record_success(1, Some("2024-KL-0002".into()));

        assert_eq!(
            summary_lines(&summary),
            vec![
                "Created 1 row(s), 1 failed",
                "row 1 (2024-KL-0001): Duplicate value",
            ]
        );
    }
}
