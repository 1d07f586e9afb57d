//! Specimen report downloads

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use specdb_core::{apply_model_filters, Action, EntityKind, TabularFormat};

use crate::export::specimen_report;
use crate::http::error::ApiError;
use crate::http::extractors::Caller;
use crate::http::links::{filter_params, QueryPairs};
use crate::http::server::AppState;

const SHEET: &str = "Specimens";

async fn download(
    state: &AppState,
    caller: &Caller,
    pairs: &QueryPairs,
    format: TabularFormat,
) -> Result<Response, ApiError> {
    caller.require(state, Action::Export, Some(EntityKind::Specimen))?;

    let filter = apply_model_filters(EntityKind::Specimen.schema(), &filter_params(pairs));
    let table = specimen_report(&state.pool, &filter).await?;
    let bytes = table.to_bytes(format, SHEET).map_err(|e| ApiError::Internal {
        message: e.to_string(),
    })?;
    let disposition = format!("attachment; filename=\"specimens.{}\"", format.extension());

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// GET /export/specimens.csv
async fn export_csv(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, ApiError> {
    download(&state, &caller, &pairs, TabularFormat::Csv).await
}

/// GET /export/specimens.xlsx
async fn export_xlsx(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, ApiError> {
    download(&state, &caller, &pairs, TabularFormat::Xlsx).await
}

/// Export routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/export/specimens.csv", get(export_csv))
        .route("/export/specimens.xlsx", get(export_xlsx))
}
