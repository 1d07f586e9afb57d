//! Repository implementations for database access
//!
//! Each repository follows these patterns:
//! - Identifiers come from the entity schema, values are always bound
//! - Inserts rely on DB constraints; failures are classified, not pre-checked
//! - Rows are read back through `RETURNING` in the same statement

pub mod records;
pub mod reference;

pub use records::{RecordRepo, StoredRecord};
pub use reference::ReferenceRepo;

use std::fmt;

use sqlx::postgres::PgDatabaseError;

/// Constraint failures users can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    NotNull,
    TooLong,
    Unique,
    ForeignKey,
}

impl ConstraintKind {
    /// Map a Postgres SQLSTATE code.
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            "23502" => Some(Self::NotNull),
            "22001" => Some(Self::TooLong),
            "23505" => Some(Self::Unique),
            "23503" => Some(Self::ForeignKey),
            _ => None,
        }
    }
}

/// A rejected write, with the column or constraint named when Postgres says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    pub target: Option<String>,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self.target.as_deref().unwrap_or("unknown");
        match self.kind {
            ConstraintKind::NotNull => write!(f, "Missing required value ({target})"),
            ConstraintKind::TooLong => write!(f, "A value is too long for its column"),
            ConstraintKind::Unique => write!(f, "Duplicate value ({target})"),
            ConstraintKind::ForeignKey => write!(f, "Referenced record does not exist ({target})"),
        }
    }
}

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("unknown field '{field}' on {table}")]
    UnknownField { table: &'static str, field: String },

    #[error("{0}")]
    Constraint(ConstraintViolation),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let violation = err.as_database_error().and_then(|db| {
            let kind = ConstraintKind::from_sqlstate(db.code()?.as_ref())?;
            let target = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.column().or(pg.constraint()))
                .or(db.constraint())
                .map(str::to_owned);
            Some(ConstraintViolation { kind, target })
        });
        match violation {
            Some(v) => Self::Constraint(v),
            None => Self::Sqlx(err),
        }
    }
}

impl DbError {
    /// Message suitable for an import row summary.
    pub fn user_message(&self) -> String {
        match self {
            Self::Constraint(v) => v.to_string(),
            Self::NotFound { resource, id } => format!("{resource} '{id}' not found"),
            Self::UnknownField { field, .. } => format!("Unknown field '{field}'"),
            Self::Sqlx(_) => "Database error while saving this row".to_owned(),
        }
    }
}
