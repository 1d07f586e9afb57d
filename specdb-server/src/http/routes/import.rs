//! Bulk import: upload, preview, fix cells, revalidate, confirm
//!
//! The import in progress lives in the caller's session. Nothing reaches the
//! database until confirm, and confirm is refused while any row has errors
//! or edits have not been revalidated.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use specdb_core::import::PreviewPage;
use specdb_core::{Action, EntityKind, ImportSession, ImportSummary};

use crate::http::error::ApiError;
use crate::http::extractors::Caller;
use crate::http::server::AppState;
use crate::import;

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default)]
    pub errors_only: bool,
}

fn first_page() -> usize {
    1
}

/// Replacement value for one cell of the uploaded table.
#[derive(Debug, Deserialize)]
pub struct CellEdit {
    /// Zero-based row index, as returned in the preview.
    pub row: usize,
    pub column: String,
    #[serde(default)]
    pub value: String,
}

fn bad_upload(message: impl Into<String>) -> ApiError {
    ApiError::BadRequest {
        message: message.into(),
    }
}

async fn load(state: &AppState, session_id: &str) -> Result<ImportSession, ApiError> {
    state
        .sessions
        .load_import(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "import",
            id: session_id.to_owned(),
        })
}

/// POST /import/upload - multipart `file`, optional `kind` (default specimen)
async fn upload(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<Json<PreviewPage>, ApiError> {
    caller.require(&state, Action::Import, None)?;
    let session_id = caller.session()?;

    let mut kind = EntityKind::Specimen;
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_upload(e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("kind") => {
                let text = field.text().await.map_err(|e| bad_upload(e.body_text()))?;
                kind = text.trim().parse()?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await.map_err(|e| bad_upload(e.body_text()))?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }
    let Some((file_name, bytes)) = file else {
        return Err(bad_upload("no file uploaded"));
    };
    if bytes.is_empty() {
        return Err(bad_upload("uploaded file is empty"));
    }

    let session = import::start(&state.pool, kind, &file_name, &bytes).await?;
    state.sessions.save_import(session_id, &session).await?;
    Ok(Json(session.preview(1, state.config.preview_page_size, false)))
}

/// GET /import/preview
async fn preview(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<PreviewPage>, ApiError> {
    caller.require(&state, Action::Import, None)?;
    let session = load(&state, caller.session()?).await?;
    Ok(Json(session.preview(
        query.page,
        state.config.preview_page_size,
        query.errors_only,
    )))
}

/// POST /import/cell - edits mark the import as needing revalidation
async fn edit_cell(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(edit): Json<CellEdit>,
) -> Result<StatusCode, ApiError> {
    caller.require(&state, Action::Import, None)?;
    let session_id = caller.session()?;
    let mut session = load(&state, session_id).await?;

    session.edit_cell(edit.row, &edit.column, &edit.value)?;
    state.sessions.save_import(session_id, &session).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /import/revalidate
async fn revalidate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<PreviewPage>, ApiError> {
    caller.require(&state, Action::Import, None)?;
    let session_id = caller.session()?;
    let mut session = load(&state, session_id).await?;

    import::validate(&state.pool, &mut session).await?;
    state.sessions.save_import(session_id, &session).await?;
    Ok(Json(session.preview(1, state.config.preview_page_size, false)))
}

/// POST /import/confirm - insert every row and end the import
async fn confirm(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<ImportSummary>, ApiError> {
    caller.require(&state, Action::Import, None)?;
    let session_id = caller.session()?;
    let mut session = load(&state, session_id).await?;

    let summary = import::commit(&state.pool, &mut session).await?;
    state.sessions.clear_import(session_id).await?;
    Ok(Json(summary))
}

/// POST /import/abandon
async fn abandon(State(state): State<Arc<AppState>>, caller: Caller) -> Result<StatusCode, ApiError> {
    caller.require(&state, Action::Import, None)?;
    let session_id = caller.session()?;

    if state.sessions.clear_import(session_id).await? {
        tracing::info!("import abandoned");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Import routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/import/upload", post(upload))
        .route("/import/preview", get(preview))
        .route("/import/cell", post(edit_cell))
        .route("/import/revalidate", post(revalidate))
        .route("/import/confirm", post(confirm))
        .route("/import/abandon", post(abandon))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
