//! Export the specimen report, or one raw table, to CSV or XLSX

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use specdb_core::{apply_model_filters, EntityKind, SpecdbConfig, TabularFormat};
use specdb_server::export::{raw_table, specimen_report};

use super::{connect, database_url};
use crate::ui;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl From<ExportFormat> for TabularFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Csv => TabularFormat::Csv,
            ExportFormat::Xlsx => TabularFormat::Xlsx,
        }
    }
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "csv")]
    pub format: ExportFormat,

    /// Output file (default: stdout, CSV only)
    #[arg(long = "out", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Export every column of one table instead of the specimen report
    #[arg(long, value_name = "KIND")]
    pub table: Option<EntityKind>,

    /// Report filter, same syntax as the list view (repeatable: --filter year=2020:2023)
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub filters: Vec<(String, String)>,

    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Parse `key=value`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter name in '{s}'"));
    }
    Ok((key.to_owned(), value.trim().to_owned()))
}

pub async fn run_export(args: ExportArgs, settings: SpecdbConfig) -> Result<()> {
    let format = TabularFormat::from(args.format);
    if args.output.is_none() && format == TabularFormat::Xlsx {
        bail!("XLSX output needs --out <PATH>");
    }
    if args.table.is_some() && !args.filters.is_empty() {
        bail!("--filter applies to the specimen report only");
    }

    let database_url = database_url(args.database_url, &settings)?;
    let pool = connect(&database_url, &settings).await?;

    let (table, sheet) = match args.table {
        Some(kind) => {
            let table = ui::with_spinner_async(
                format!("Exporting {kind}"),
                format!("Exported {kind}"),
                raw_table(&pool, kind),
            )
            .await?;
            (table, kind.schema().label)
        }
        None => {
            let params: BTreeMap<String, String> = args.filters.into_iter().collect();
            let filter = apply_model_filters(EntityKind::Specimen.schema(), &params);
            let table = ui::with_spinner_async(
                "Exporting specimen report",
                "Exported specimen report",
                specimen_report(&pool, &filter),
            )
            .await?;
            (table, "Specimens")
        }
    };

    let bytes = table.to_bytes(format, sheet)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(rows = table.len(), path = %path.display(), "export written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filters() {
        assert_eq!(
            parse_key_value("year=2020:2023").unwrap(),
            ("year".to_owned(), "2020:2023".to_owned())
        );
        assert_eq!(
            parse_key_value("locality = KL, PD").unwrap(),
            ("locality".to_owned(), "KL, PD".to_owned())
        );
        assert!(parse_key_value("year").is_err());
        assert!(parse_key_value("=2020").is_err());
    }
}
