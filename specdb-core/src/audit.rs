//! Append-only log fields
//!
//! Fields such as `modified` and `disposition` hold a history of entries in
//! the stored form `MM-DD-YYYY, initials, description`, separated by `"; "`.
//! [`AuditLog`] parses that text into structured entries and renders it back
//! byte-compatibly. Entries that don't follow the format are kept verbatim.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

const DATE_FORMAT: &str = "%m-%d-%Y";
const SEPARATOR: &str = "; ";

/// One dated, attributed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub date: NaiveDate,
    pub initials: String,
    pub description: String,
}

impl AuditEntry {
    pub fn new(date: NaiveDate, initials: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            date,
            initials: initials.into(),
            description: description.into(),
        }
    }

    /// Check that the entry can be stored in `field`.
    ///
    /// Separators inside the text would corrupt the log on the next parse.
    pub fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        let initials = self.initials.trim();
        if initials.is_empty() {
            return Err(ValidationError::Rule {
                field,
                message: format!("{field} entry needs the initials of who made it"),
            });
        }
        if initials.contains(',') || initials.contains(';') {
            return Err(ValidationError::InvalidFormat {
                field,
                reason: "initials cannot contain ',' or ';'".to_owned(),
            });
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::Rule {
                field,
                message: format!("{field} entry needs a description"),
            });
        }
        if self.description.contains(';') {
            return Err(ValidationError::InvalidFormat {
                field,
                reason: "description cannot contain ';'".to_owned(),
            });
        }
        Ok(())
    }

    fn parse(text: &str) -> Option<Self> {
        let mut parts = text.splitn(3, ',');
        let date = NaiveDate::parse_from_str(parts.next()?.trim(), DATE_FORMAT).ok()?;
        let initials = parts.next()?.trim();
        let description = parts.next()?.trim();
        if initials.is_empty() {
            return None;
        }
        Some(Self::new(date, initials, description))
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.date.format(DATE_FORMAT),
            self.initials.trim(),
            self.description.trim()
        )
    }
}

/// Item of a parsed log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LogItem {
    Entry(AuditEntry),
    /// Text that doesn't follow the entry format.
    Raw(String),
}

impl fmt::Display for LogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry(entry) => entry.fmt(f),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

/// Parsed contents of an append-only field, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuditLog(Vec<LogItem>);

impl AuditLog {
    pub fn parse(text: Option<&str>) -> Self {
        let items = text
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match AuditEntry::parse(s) {
                Some(entry) => LogItem::Entry(entry),
                None => LogItem::Raw(s.to_owned()),
            })
            .collect();
        Self(items)
    }

    pub fn push(&mut self, entry: AuditEntry) {
        self.0.push(LogItem::Entry(entry));
    }

    pub fn items(&self) -> &[LogItem] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(SEPARATOR)?;
            }
            item.fmt(f)?;
        }
        Ok(())
    }
}

/// Append `entry` to the stored log text.
pub fn append_entry(existing: Option<&str>, entry: AuditEntry) -> String {
    let mut log = AuditLog::parse(existing);
    log.push(entry);
    log.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn renders_stored_format() {
        let entry = AuditEntry::new(date(2024, 11, 27), "JS", "fixed locality");
        assert_eq!(entry.to_string(), "11-27-2024, JS, fixed locality");
    }

    #[test]
    fn round_trips_existing_text() {
        let text = "01-05-2023, AB, created; 02-10-2023, CD, moved to drawer 4, row 2";
        let log = AuditLog::parse(Some(text));
        assert_eq!(log.len(), 2);
        assert_eq!(log.to_string(), text);

        match &log.items()[1] {
            LogItem::Entry(second) => assert_eq!(second.description, "moved to drawer 4, row 2"),
            LogItem::Raw(text) => panic!("expected a parsed entry, got {text:?}"),
        }
    }

    #[test]
    fn keeps_unparseable_entries() {
        let log = AuditLog::parse(Some("legacy note; 03-01-2024, EF, checked"));
        assert_eq!(log.items()[0], LogItem::Raw("legacy note".into()));
        assert!(matches!(log.items()[1], LogItem::Entry(_)));
    }

    #[test]
    fn appends_with_separator() {
        let out = append_entry(Some("01-05-2023, AB, created"), AuditEntry::new(date(2024, 1, 2), "CD", "relabeled"));
        assert_eq!(out, "01-05-2023, AB, created; 01-02-2024, CD, relabeled");

        let out = append_entry(None, AuditEntry::new(date(2024, 1, 2), "CD", "first"));
        assert_eq!(out, "01-02-2024, CD, first");
    }

    #[test]
    fn rejects_separator_in_description() {
        let entry = AuditEntry::new(date(2024, 1, 2), "CD", "a; b");
        assert!(entry.validate("modified").is_err());
        let entry = AuditEntry::new(date(2024, 1, 2), " ", "ok");
        assert!(entry.validate("modified").is_err());
    }
}
