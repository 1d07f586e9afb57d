//! Natural-key lookups used by import validation and in-memory filtering

use sqlx::PgPool;

use specdb_core::{EntityKind, ReferenceSets};

use super::{DbError, RecordRepo};

/// Loads every natural key once per validation pass.
pub struct ReferenceRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ReferenceRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Existing keys of every kind plus persisted specimen numbers.
    pub async fn reference_sets(&self) -> Result<ReferenceSets, DbError> {
        let mut refs = ReferenceSets::new();
        for kind in EntityKind::ALL {
            let repo = RecordRepo::new(self.pool, kind);
            if repo.schema().natural_key.is_some() {
                refs.insert_keys(kind, repo.natural_keys().await?);
            }
        }
        let numbers = RecordRepo::new(self.pool, EntityKind::Specimen)
            .column_values("specimenNumber")
            .await?;
        refs.insert_specimen_numbers(numbers);
        tracing::debug!("loaded reference keys for import validation");
        Ok(refs)
    }
}
