//! Bulk import session
//!
//! An upload becomes an [`ImportSession`]: the parsed table plus per-row
//! validation results. The operator pages through the preview, fixes cells,
//! revalidates, and commits only once no row has an error. The session is a
//! plain value; the server serializes it between requests.
//!
//! Validation runs against [`ReferenceSets`], the natural keys already in the
//! database, so a row never costs a query of its own.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{derive_catalog_number, missing_parts};
use crate::forms::{normalize_value, SpecimenRules};
use crate::record::Record;
use crate::schema::{EntityKind, EntitySchema, FieldKind};
use crate::tabular::{Table, TabularError};
use crate::validation::{FormErrors, ValidationError};

/// Errors driving an import session.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Tabular(#[from] TabularError),

    #[error("the uploaded file has no data rows")]
    NoRows,

    #[error("row {0} does not exist")]
    RowOutOfRange(usize),

    #[error("'{0}' is not a column of this import")]
    UnknownColumn(String),

    #[error("the import has changed since it was last validated")]
    NotValidated,

    #[error("{0} row(s) still have errors")]
    HasErrors(usize),

    #[error("the import was already committed")]
    AlreadyCommitted,
}

/// Natural keys and unique values already stored, by entity kind.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSets {
    keys: HashMap<EntityKind, HashSet<String>>,
    specimen_numbers: HashSet<String>,
}

impl ReferenceSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_keys(&mut self, kind: EntityKind, keys: impl IntoIterator<Item = String>) {
        self.keys.entry(kind).or_default().extend(keys);
    }

    pub fn insert_specimen_numbers(&mut self, numbers: impl IntoIterator<Item = String>) {
        self.specimen_numbers.extend(numbers);
    }

    pub fn contains(&self, kind: EntityKind, key: &str) -> bool {
        self.keys.get(&kind).is_some_and(|s| s.contains(key))
    }

    pub fn has_specimen_number(&self, number: &str) -> bool {
        self.specimen_numbers.contains(number)
    }
}

/// One problem found in a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub field: String,
    pub message: String,
}

impl From<&ValidationError> for RowIssue {
    fn from(e: &ValidationError) -> Self {
        Self {
            field: e.field().to_owned(),
            message: e.to_string(),
        }
    }
}

/// Validation outcome for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowReport {
    /// Problems that block the import.
    pub errors: Vec<RowIssue>,
    /// Values that were dropped but don't block the import.
    pub warnings: Vec<RowIssue>,
}

impl RowReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    /// Edited since the last validation pass.
    Dirty,
    /// Validated; may or may not have errors.
    Validated,
    Committed,
}

/// Upload being prepared for commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSession {
    pub kind: EntityKind,
    pub file_name: String,
    pub table: Table,
    /// Headers that aren't fields of `kind` and will be ignored.
    pub ignored_columns: Vec<String>,
    pub reports: BTreeMap<usize, RowReport>,
    pub state: ImportState,
}

impl ImportSession {
    pub fn new(kind: EntityKind, file_name: impl Into<String>, table: Table) -> Result<Self, ImportError> {
        if table.is_empty() {
            return Err(ImportError::NoRows);
        }
        let schema = kind.schema();
        let ignored_columns = table
            .headers
            .iter()
            .filter(|h| schema.field(h).is_none())
            .cloned()
            .collect();
        Ok(Self {
            kind,
            file_name: file_name.into(),
            table,
            ignored_columns,
            reports: BTreeMap::new(),
            state: ImportState::Dirty,
        })
    }

    /// Validate every row against `refs` and the rest of the file.
    pub fn validate_all(&mut self, refs: &ReferenceSets) {
        let schema = self.kind.schema();
        let mut seen_keys: HashMap<String, usize> = HashMap::new();
        let mut seen_numbers: HashMap<String, usize> = HashMap::new();

        self.reports.clear();
        for index in 0..self.table.len() {
            let Some(raw) = self.table.record(index) else {
                continue;
            };
            let (record, mut report) = normalize_row(schema, &raw);
            check_references(schema, &record, refs, &mut report);

            if let Some(key) = schema.natural_key.and_then(|k| record.get(k)) {
                if let Some(first) = seen_keys.insert(key.to_owned(), index) {
                    report.errors.push(RowIssue {
                        field: schema.natural_key.unwrap_or_default().to_owned(),
                        message: format!("'{key}' also appears in row {}", first + 1),
                    });
                }
            }
            if self.kind == EntityKind::Specimen {
                if let Some(number) = record.get("specimenNumber") {
                    if let Some(first) = seen_numbers.insert(number.to_owned(), index) {
                        report.errors.push(RowIssue {
                            field: "specimenNumber".to_owned(),
                            message: format!("specimenNumber '{number}' also appears in row {}", first + 1),
                        });
                    }
                }
            }

            if !report.errors.is_empty() || !report.warnings.is_empty() {
                self.reports.insert(index, report);
            }
        }
        self.state = ImportState::Validated;

        tracing::debug!(
            kind = %self.kind,
            rows = self.table.len(),
            error_rows = self.error_row_count(),
            "validated import"
        );
    }

    pub fn report(&self, row: usize) -> Option<&RowReport> {
        self.reports.get(&row)
    }

    pub fn row_has_errors(&self, row: usize) -> bool {
        self.reports.get(&row).is_some_and(|r| !r.is_clean())
    }

    pub fn error_row_count(&self) -> usize {
        self.reports.values().filter(|r| !r.is_clean()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_row_count() > 0
    }

    /// Overwrite one cell. The session must be revalidated afterwards.
    pub fn edit_cell(&mut self, row: usize, column: &str, value: &str) -> Result<(), ImportError> {
        if self.state == ImportState::Committed {
            return Err(ImportError::AlreadyCommitted);
        }
        if row >= self.table.len() {
            return Err(ImportError::RowOutOfRange(row));
        }
        let known = self.table.column(column).is_some() || self.kind.schema().field(column).is_some();
        if !known {
            return Err(ImportError::UnknownColumn(column.to_owned()));
        }
        self.table.set_cell(row, column, value.trim());
        self.state = ImportState::Dirty;
        Ok(())
    }

    /// Page `page` (1-indexed) of the preview.
    pub fn preview(&self, page: usize, page_size: usize, errors_only: bool) -> PreviewPage {
        let page_size = page_size.max(1);
        let indices: Vec<usize> = (0..self.table.len())
            .filter(|&i| !errors_only || self.row_has_errors(i))
            .collect();
        let total_pages = indices.len().div_ceil(page_size).max(1);
        let page = page.clamp(1, total_pages);

        let rows = indices
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .map(|&index| PreviewRow {
                index,
                cells: self.table.rows[index].clone(),
                report: self.reports.get(&index).cloned().unwrap_or_default(),
            })
            .collect();

        PreviewPage {
            headers: self.table.headers.clone(),
            rows,
            page,
            total_pages,
            matching_rows: indices.len(),
            total_rows: self.table.len(),
            error_rows: self.error_row_count(),
            errors_only,
            ignored_columns: self.ignored_columns.clone(),
            can_commit: self.ensure_committable().is_ok(),
        }
    }

    /// Server-side guard before commit.
    pub fn ensure_committable(&self) -> Result<(), ImportError> {
        match self.state {
            ImportState::Committed => Err(ImportError::AlreadyCommitted),
            ImportState::Dirty => Err(ImportError::NotValidated),
            ImportState::Validated if self.has_errors() => Err(ImportError::HasErrors(self.error_row_count())),
            ImportState::Validated => Ok(()),
        }
    }

    /// Normalized rows ready to insert, with their table index.
    pub fn committable_rows(&self) -> Result<Vec<(usize, Record)>, ImportError> {
        self.ensure_committable()?;
        let schema = self.kind.schema();
        Ok((0..self.table.len())
            .filter_map(|i| self.table.record(i).map(|r| (i, normalize_row(schema, &r).0)))
            .collect())
    }

    pub fn mark_committed(&mut self) {
        self.state = ImportState::Committed;
    }
}

/// One page of the preview.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewPage {
    pub headers: Vec<String>,
    pub rows: Vec<PreviewRow>,
    pub page: usize,
    pub total_pages: usize,
    /// Rows passing the errors-only filter.
    pub matching_rows: usize,
    pub total_rows: usize,
    pub error_rows: usize,
    pub errors_only: bool,
    pub ignored_columns: Vec<String>,
    pub can_commit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    /// Zero-based table index, used to address cell edits.
    pub index: usize,
    pub cells: Vec<String>,
    pub report: RowReport,
}

/// Normalize a raw row into the values to insert.
///
/// Unparseable dates and times are dropped with a warning. Everything else
/// that doesn't validate is an error.
pub fn normalize_row(schema: &EntitySchema, raw: &Record) -> (Record, RowReport) {
    let mut record = Record::new();
    let mut report = RowReport::default();

    for (key, value) in raw.iter() {
        let Some(field) = schema.field(key) else {
            continue;
        };
        // Logs and a derived natural key are imported as stored.
        if field.append_only || (field.managed && schema.natural_key == Some(field.name)) {
            record.set(field.name, value.trim());
            continue;
        }
        if field.managed {
            continue;
        }
        match normalize_value(field, value) {
            Ok(v) => record.set_opt(field.name, v),
            Err(e @ ValidationError::InvalidFormat { .. })
                if matches!(field.kind, FieldKind::Date | FieldKind::Time | FieldKind::Timestamp) =>
            {
                let mut issue = RowIssue::from(&e);
                issue.message.push_str("; left empty");
                report.warnings.push(issue);
            }
            Err(e) => report.errors.push(RowIssue::from(&e)),
        }
    }

    if schema.kind == EntityKind::Specimen {
        SpecimenRules::fill_date_components(&mut record);
        let mut errors = FormErrors::new();
        SpecimenRules::check_date_components(&record, &mut errors);
        report.errors.extend(errors.iter().map(RowIssue::from));

        if !record.contains("catalogNumber") {
            match derive_catalog_number(&record) {
                Ok(catalog) => record.set("catalogNumber", catalog),
                Err(_) => report.errors.push(RowIssue {
                    field: "catalogNumber".to_owned(),
                    message: format!(
                        "Missing required field(s) for catalog number: {}",
                        missing_parts(&record).join(", ")
                    ),
                }),
            }
        }
    } else if let Some(key) = schema.natural_key {
        if !record.contains(key) {
            report.errors.push(RowIssue::from(&ValidationError::Empty {
                field: schema.field(key).map_or(key, |f| f.name),
            }));
        }
    }

    (record, report)
}

fn check_references(schema: &EntitySchema, record: &Record, refs: &ReferenceSets, report: &mut RowReport) {
    for field in schema.fields {
        let Some(target) = field.foreign_key() else {
            continue;
        };
        if let Some(value) = record.get(field.name) {
            if !refs.contains(target, value) {
                report.errors.push(RowIssue::from(&ValidationError::UnknownReference {
                    field: field.name,
                    value: value.to_owned(),
                }));
            }
        }
    }

    if let Some(key) = schema.natural_key {
        if let Some(value) = record.get(key).filter(|v| refs.contains(schema.kind, v)) {
            report.errors.push(RowIssue::from(&ValidationError::Duplicate {
                field: schema.field(key).map_or(key, |f| f.name),
                value: value.to_owned(),
            }));
        }
    }
    if schema.kind == EntityKind::Specimen {
        if let Some(number) = record.get("specimenNumber").filter(|n| refs.has_specimen_number(n)) {
            report.errors.push(RowIssue::from(&ValidationError::Duplicate {
                field: "specimenNumber",
                value: number.to_owned(),
            }));
        }
    }
}

/// Outcome of one committed row.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    /// One-based row number as shown to the operator.
    pub row: usize,
    pub key: Option<String>,
    pub error: Option<String>,
}

/// Per-row result of a commit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub failed: usize,
    pub rows: Vec<RowOutcome>,
}

impl ImportSummary {
    pub fn record_success(&mut self, index: usize, key: Option<String>) {
        self.created += 1;
        self.rows.push(RowOutcome {
            row: index + 1,
            key,
            error: None,
        });
    }

    pub fn record_failure(&mut self, index: usize, key: Option<String>, error: impl Into<String>) {
        self.failed += 1;
        self.rows.push(RowOutcome {
            row: index + 1,
            key,
            error: Some(error.into()),
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &RowOutcome> {
        self.rows.iter().filter(|r| r.error.is_some())
    }
}
