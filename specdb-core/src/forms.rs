//! Create and edit rules per entity kind
//!
//! Submissions arrive as an [`EditRequest`]: raw field values plus new
//! entries for append-only log fields. Each [`EntityRules`] implementation
//! validates and normalizes a submission into the values to store.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::audit::{append_entry, AuditEntry};
use crate::catalog::{derive_catalog_number, CATALOG_PARTS};
use crate::dates::{format_date, format_time, format_timestamp, parse_date, parse_time, parse_timestamp};
use crate::record::Record;
use crate::schema::{EntitySchema, FieldDescriptor, FieldKind};
use crate::validation::{FormErrors, ValidationError};

/// Column values to write on update. `None` clears the column.
pub type Changes = BTreeMap<&'static str, Option<String>>;

/// New entry for an append-only field. The date defaults to today.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntryInput {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub initials: String,
    pub description: String,
}

impl LogEntryInput {
    pub fn new(initials: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            date: None,
            initials: initials.into(),
            description: description.into(),
        }
    }

    fn into_entry(self, today: NaiveDate) -> AuditEntry {
        AuditEntry::new(
            self.date.unwrap_or(today),
            self.initials.trim(),
            self.description.trim(),
        )
    }
}

/// A create or edit submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditRequest {
    #[serde(default)]
    pub fields: Record,
    /// New log entries keyed by append-only field name.
    #[serde(default)]
    pub append: BTreeMap<String, LogEntryInput>,
}

impl EditRequest {
    pub fn with_fields(fields: Record) -> Self {
        Self {
            fields,
            append: BTreeMap::new(),
        }
    }

    pub fn append(mut self, field: &str, entry: LogEntryInput) -> Self {
        self.append.insert(field.to_owned(), entry);
        self
    }
}

/// Per-kind create/edit behavior.
pub trait EntityRules: Send + Sync {
    /// Validate a new record and return the values to insert.
    fn prepare_create(
        &self,
        schema: &'static EntitySchema,
        request: &EditRequest,
        today: NaiveDate,
    ) -> Result<Record, FormErrors> {
        let (changes, mut errors) = normalize_fields(schema, &request.fields);
        let mut record = apply_changes(&Record::new(), &changes);
        let appended = log_entries(schema, request, today, &mut errors);
        for (field, entry) in appended {
            record.set(field, append_entry(None, entry));
        }
        self.check_record(schema, &record, &mut errors);
        errors.into_result(record)
    }

    /// Validate an edit of `current` and return the columns to change.
    fn prepare_update(
        &self,
        schema: &'static EntitySchema,
        current: &Record,
        request: &EditRequest,
        today: NaiveDate,
    ) -> Result<Changes, FormErrors> {
        let (changes, mut errors) = normalize_fields(schema, &request.fields);
        let mut changes = only_changed(current, changes);
        let appended = log_entries(schema, request, today, &mut errors);
        for (field, entry) in appended {
            changes.insert(field, Some(append_entry(current.get(field), entry)));
        }
        let merged = apply_changes(current, &changes);
        self.check_record(schema, &merged, &mut errors);
        errors.into_result(changes)
    }

    /// Checks on the full record after normalization.
    fn check_record(&self, schema: &'static EntitySchema, record: &Record, errors: &mut FormErrors);
}

/// Specimen forms: derived catalog number, audit and identification rules.
pub struct SpecimenRules;

impl SpecimenRules {
    /// Fill year/month/day from the event date where they are blank.
    pub fn fill_date_components(record: &mut Record) {
        let Some(date) = record.get("eventDate").and_then(parse_date) else {
            return;
        };
        if !record.contains("year") {
            record.set("year", date.year().to_string());
        }
        if !record.contains("month") {
            record.set("month", format!("{:02}", date.month()));
        }
        if !record.contains("day") {
            record.set("day", format!("{:02}", date.day()));
        }
    }

    /// Range checks on the text date components.
    pub fn check_date_components(record: &Record, errors: &mut FormErrors) {
        let checks: [(&'static str, u32, u32); 3] =
            [("year", 1900, 2050), ("month", 1, 12), ("day", 1, 31)];
        for (field, min, max) in checks {
            let Some(value) = record.get(field) else {
                continue;
            };
            let in_range = value
                .parse::<u32>()
                .ok()
                .filter(|_| value.bytes().all(|b| b.is_ascii_digit()))
                .is_some_and(|n| (min..=max).contains(&n));
            if !in_range {
                errors.push(ValidationError::InvalidFormat {
                    field,
                    reason: format!("must be a number from {min} to {max}"),
                });
            }
        }
    }
}

impl EntityRules for SpecimenRules {
    fn prepare_create(
        &self,
        schema: &'static EntitySchema,
        request: &EditRequest,
        today: NaiveDate,
    ) -> Result<Record, FormErrors> {
        let (changes, mut errors) = normalize_fields(schema, &request.fields);
        let mut record = apply_changes(&Record::new(), &changes);
        Self::fill_date_components(&mut record);

        for (field, entry) in log_entries(schema, request, today, &mut errors) {
            record.set(field, append_entry(None, entry));
        }

        match derive_catalog_number(&record) {
            Ok(catalog) => record.set("catalogNumber", catalog),
            Err(e) => errors.push(e),
        }
        self.check_record(schema, &record, &mut errors);
        errors.into_result(record)
    }

    fn prepare_update(
        &self,
        schema: &'static EntitySchema,
        current: &Record,
        request: &EditRequest,
        today: NaiveDate,
    ) -> Result<Changes, FormErrors> {
        let (changes, mut errors) = normalize_fields(schema, &request.fields);
        let mut changes = only_changed(current, changes);

        if !changes.is_empty() && !request.append.contains_key("modified") {
            errors.push(ValidationError::Rule {
                field: "modified",
                message: "editing a specimen requires a new modified entry (date, initials, description)"
                    .to_owned(),
            });
        }

        let taxonomy_changed = changes
            .keys()
            .any(|f| schema.field(f).is_some_and(|d| d.taxonomic));
        if taxonomy_changed {
            for field in ["identifiedBy", "dateIdentified"] {
                if request.fields.get(field).is_none() {
                    errors.push(ValidationError::Rule {
                        field,
                        message: format!("changing the identification requires {field}"),
                    });
                }
            }
        }

        for (field, entry) in log_entries(schema, request, today, &mut errors) {
            changes.insert(field, Some(append_entry(current.get(field), entry)));
        }

        let mut merged = apply_changes(current, &changes);
        let parts_changed = CATALOG_PARTS.iter().any(|f| changes.contains_key(f));
        if parts_changed || !merged.contains("catalogNumber") {
            match derive_catalog_number(&merged) {
                Ok(catalog) => {
                    if current.get("catalogNumber") != Some(catalog.as_str()) {
                        changes.insert("catalogNumber", Some(catalog.clone()));
                    }
                    merged.set("catalogNumber", catalog);
                }
                Err(e) if parts_changed => errors.push(e),
                // Legacy rows without parts stay as they are.
                Err(_) => {}
            }
        }

        self.check_record(schema, &merged, &mut errors);
        errors.into_result(changes)
    }

    fn check_record(&self, _schema: &'static EntitySchema, record: &Record, errors: &mut FormErrors) {
        Self::check_date_components(record, errors);
    }
}

/// Locality and Initials: the natural key is required.
pub struct ReferenceRules;

impl EntityRules for ReferenceRules {
    fn check_record(&self, schema: &'static EntitySchema, record: &Record, errors: &mut FormErrors) {
        if let Some(key) = schema.natural_key {
            if !record.contains(key) {
                let field = schema.field(key).map_or(key, |f| f.name);
                errors.push(ValidationError::Empty { field });
            }
        }
    }
}

/// ButterflyCollection and Trap: field-level validation only.
pub struct LegacyRules;

impl EntityRules for LegacyRules {
    fn check_record(&self, _schema: &'static EntitySchema, _record: &Record, _errors: &mut FormErrors) {}
}

/// Normalize one raw value for `field`. Blank input is `Ok(None)`.
pub fn normalize_value(field: &FieldDescriptor, raw: &str) -> Result<Option<String>, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let name = field.name;
    let normalized = match field.kind {
        FieldKind::Text(max) => {
            if value.chars().count() > max {
                return Err(ValidationError::TooLong { field: name, max });
            }
            value.to_owned()
        }
        FieldKind::LongText | FieldKind::ForeignKey(_) => value.to_owned(),
        FieldKind::Date => parse_date(value).map(format_date).ok_or_else(|| {
            ValidationError::InvalidFormat {
                field: name,
                reason: format!("'{value}' is not a date (e.g. 27-Nov-2024)"),
            }
        })?,
        FieldKind::Time => parse_time(value).map(format_time).ok_or_else(|| {
            ValidationError::InvalidFormat {
                field: name,
                reason: format!("'{value}' is not a time (e.g. 14:30)"),
            }
        })?,
        FieldKind::Timestamp => parse_timestamp(value).map(format_timestamp).ok_or_else(|| {
            ValidationError::InvalidFormat {
                field: name,
                reason: format!("'{value}' is not a date and time"),
            }
        })?,
        FieldKind::Choice(choices) => choices
            .iter()
            .find(|c| c.eq_ignore_ascii_case(value))
            .map(|c| (*c).to_owned())
            .ok_or_else(|| ValidationError::InvalidVariant {
                field: name,
                value: value.to_owned(),
            })?,
    };
    Ok(Some(normalized))
}

/// Normalize the user-editable fields present in `fields`.
///
/// Service-managed fields are ignored; append-only fields must go through
/// log entries instead.
pub fn normalize_fields(schema: &EntitySchema, fields: &Record) -> (Changes, FormErrors) {
    let mut changes = Changes::new();
    let mut errors = FormErrors::new();
    for (key, raw) in fields.restricted_to(schema).iter() {
        let Some(field) = schema.field(key) else {
            continue;
        };
        if field.managed {
            continue;
        }
        if field.append_only {
            errors.push(ValidationError::Rule {
                field: field.name,
                message: format!("{} is append-only; add an entry instead", field.name),
            });
            continue;
        }
        match normalize_value(field, raw) {
            Ok(value) => {
                changes.insert(field.name, value);
            }
            Err(e) => errors.push(e),
        }
    }
    (changes, errors)
}

fn only_changed(current: &Record, changes: Changes) -> Changes {
    changes
        .into_iter()
        .filter(|(field, value)| current.get(field) != value.as_deref())
        .collect()
}

fn apply_changes(base: &Record, changes: &Changes) -> Record {
    let mut out = base.clone();
    for (field, value) in changes {
        out.set_opt(*field, value.clone());
    }
    out
}

fn log_entries(
    schema: &'static EntitySchema,
    request: &EditRequest,
    today: NaiveDate,
    errors: &mut FormErrors,
) -> Vec<(&'static str, AuditEntry)> {
    let mut out = Vec::new();
    for (name, input) in &request.append {
        let Some(field) = schema.field(name).filter(|f| f.append_only) else {
            let field = schema.field(name).map_or("append", |f| f.name);
            errors.push(ValidationError::Rule {
                field,
                message: format!("{name} does not take log entries"),
            });
            continue;
        };
        let entry = input.clone().into_entry(today);
        match entry.validate(field.name) {
            Ok(()) => out.push((field.name, entry)),
            Err(e) => errors.push(e),
        }
    }
    out
}
