pub mod access;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod dates;
pub mod filter;
pub mod forms;
pub mod import;
pub mod record;
pub mod schema;
pub mod tabular;
pub mod validation;

pub use access::{authorize, Action, Decision, Principal};
pub use audit::{AuditEntry, AuditLog};
pub use config::SpecdbConfig;
pub use filter::{apply_model_filters, FilterBuilder, Predicate, SortKey};
pub use forms::{Changes, EditRequest, EntityRules, LogEntryInput};
pub use import::{ImportError, ImportSession, ImportSummary, ReferenceSets};
pub use record::Record;
pub use schema::{EntityKind, EntitySchema, FieldDescriptor, FieldKind};
pub use tabular::{Table, TabularError, TabularFormat};
pub use validation::{FormErrors, ValidationError};
