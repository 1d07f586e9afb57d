//! Bulk delete, for clearing test data. Off unless `debug_bulk_delete` is set.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use specdb_core::Action;

use crate::db::repos::RecordRepo;
use crate::http::error::ApiError;
use crate::http::extractors::{Caller, Kind};
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

/// POST /debug/bulk-delete/{kind}
async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    Kind(kind): Kind,
    caller: Caller,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    if !state.config.debug_bulk_delete {
        return Err(ApiError::NotFound {
            resource: "route",
            id: format!("/debug/bulk-delete/{kind}"),
        });
    }
    caller.require(&state, Action::BulkDelete, Some(kind))?;

    let deleted = RecordRepo::new(&state.pool, kind).delete_all().await?;
    tracing::warn!(
        kind = %kind,
        deleted,
        user = caller.principal.username.as_deref().unwrap_or_default(),
        "bulk delete"
    );
    Ok(Json(BulkDeleteResponse { deleted }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/debug/bulk-delete/{kind}", post(bulk_delete))
}
