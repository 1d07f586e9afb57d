//! Validation error types

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Validation error for one field of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// Value doesn't parse as the field's type
    InvalidFormat { field: &'static str, reason: String },

    /// Value is not one of the field's choices
    InvalidVariant { field: &'static str, value: String },

    /// Foreign key names a record that doesn't exist
    UnknownReference { field: &'static str, value: String },

    /// Natural key already taken
    Duplicate { field: &'static str, value: String },

    /// Business rule spanning several fields
    Rule { field: &'static str, message: String },
}

impl ValidationError {
    /// Field the error is reported against.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Empty { field }
            | Self::TooLong { field, .. }
            | Self::InvalidFormat { field, .. }
            | Self::InvalidVariant { field, .. }
            | Self::UnknownReference { field, .. }
            | Self::Duplicate { field, .. }
            | Self::Rule { field, .. } => field,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::InvalidFormat { field, reason } => write!(f, "{}: {}", field, reason),
            Self::InvalidVariant { field, value } => {
                write!(f, "invalid {} value: '{}'", field, value)
            }
            Self::UnknownReference { field, value } => {
                write!(f, "{} '{}' does not exist", field, value)
            }
            Self::Duplicate { field, value } => {
                write!(f, "{} '{}' already exists", field, value)
            }
            Self::Rule { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Every validation error found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors(Vec<ValidationError>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: FormErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field() == field)
    }

    /// `Ok(value)` when no errors were collected.
    pub fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Messages grouped by field.
    pub fn by_field(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut out: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for error in &self.0 {
            out.entry(error.field()).or_default().push(error.to_string());
        }
        out
    }
}

impl From<ValidationError> for FormErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for FormErrors {}

impl Serialize for FormErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let grouped = self.by_field();
        let mut map = serializer.serialize_map(Some(grouped.len()))?;
        for (field, messages) in &grouped {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}
