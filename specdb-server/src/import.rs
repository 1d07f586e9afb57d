//! Import against the database
//!
//! Wraps the in-memory [`ImportSession`] with the steps that need the
//! database: loading reference keys for validation and inserting rows on
//! commit. Shared by the HTTP routes and the CLI.

use sqlx::PgPool;

use specdb_core::{EntityKind, ImportError, ImportSession, ImportSummary, Table, TabularFormat};

use crate::db::{DbError, RecordRepo, ReferenceRepo};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Parse an uploaded file and run the first validation pass.
pub async fn start(
    pool: &PgPool,
    kind: EntityKind,
    file_name: &str,
    bytes: &[u8],
) -> Result<ImportSession, IngestError> {
    let format = TabularFormat::from_filename(file_name).map_err(ImportError::from)?;
    let table = Table::read(bytes, format).map_err(ImportError::from)?;
    let mut session = ImportSession::new(kind, file_name, table)?;
    validate(pool, &mut session).await?;
    tracing::info!(
        kind = %kind,
        file = file_name,
        rows = session.table.len(),
        error_rows = session.error_row_count(),
        "import uploaded"
    );
    Ok(session)
}

/// Re-run validation against the current database contents.
pub async fn validate(pool: &PgPool, session: &mut ImportSession) -> Result<(), DbError> {
    let refs = ReferenceRepo::new(pool).reference_sets().await?;
    session.validate_all(&refs);
    Ok(())
}

/// Insert every row. Each row stands alone: a failed insert is reported and
/// the rest carry on.
pub async fn commit(pool: &PgPool, session: &mut ImportSession) -> Result<ImportSummary, IngestError> {
    let rows = session.committable_rows()?;
    let repo = RecordRepo::new(pool, session.kind);
    let key_field = repo.schema().natural_key;

    let mut summary = ImportSummary::default();
    for (index, record) in rows {
        let key = key_field.and_then(|f| record.get(f)).map(str::to_owned);
        match repo.insert(&record).await {
            Ok(_) => summary.record_success(index, key),
            Err(e) => {
                tracing::warn!(row = index + 1, error = %e, "import row failed");
                summary.record_failure(index, key, e.user_message());
            }
        }
    }
    session.mark_committed();

    tracing::info!(
        kind = %session.kind,
        created = summary.created,
        failed = summary.failed,
        "import committed"
    );
    Ok(summary)
}
