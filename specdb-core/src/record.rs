//! Untyped row values keyed by field name
//!
//! Nearly every column is text, so records carry `String` values and the
//! schema decides how each one is stored. Missing keys mean NULL; blank
//! strings are normalized away on insert.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::EntitySchema;

/// Field values of one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a field, `None` when NULL or blank.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Set a field. Blank values clear it.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        if value.trim().is_empty() {
            self.0.remove(&field);
        } else {
            self.0.insert(field, value);
        }
    }

    pub fn set_opt(&mut self, field: impl Into<String>, value: Option<String>) {
        match value {
            Some(v) => self.set(field, v),
            None => {
                self.0.remove(&field.into());
            }
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Keep only keys that are fields of `schema`, trimming values. Blank
    /// values survive so they can still clear fields in [`Record::merged`].
    pub fn restricted_to(&self, schema: &EntitySchema) -> Record {
        let mut out = Record::new();
        for (key, value) in self.iter() {
            if schema.field(key).is_some() {
                out.0.insert(key.to_owned(), value.trim().to_owned());
            }
        }
        out
    }

    /// Overlay `changes` on top of `self`. Keys present in `changes` with a
    /// blank value clear the field.
    pub fn merged(&self, changes: &Record) -> Record {
        let mut out = self.clone();
        for (key, value) in changes.0.iter() {
            out.set(key.clone(), value.clone());
        }
        out
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for Record {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut record = Record::new();
        for (k, v) in map {
            record.set(k, v);
        }
        record
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LOCALITY;

    #[test]
    fn blank_values_are_null() {
        let mut r = Record::new();
        r.set("country", "  ");
        assert!(r.get("country").is_none());
        assert!(r.is_empty());
    }

    #[test]
    fn merge_clears_with_blank() {
        let base: Record = [("country", "Peru"), ("region", "Cusco")].into_iter().collect();
        let mut changes = Record::new();
        changes.0.insert("region".into(), String::new());
        let merged = base.merged(&changes);
        assert_eq!(merged.get("country"), Some("Peru"));
        assert_eq!(merged.get("region"), None);
    }

    #[test]
    fn restricts_to_schema_fields() {
        let r: Record = [("localityCode", " KL "), ("bogus", "x")].into_iter().collect();
        let restricted = r.restricted_to(&LOCALITY);
        assert_eq!(restricted.get("localityCode"), Some("KL"));
        assert!(!restricted.contains("bogus"));
    }
}
