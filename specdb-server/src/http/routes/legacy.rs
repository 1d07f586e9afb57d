//! Legacy butterfly collection and trap records on one page

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use specdb_core::{apply_model_filters, Action, EntityKind};

use crate::db::repos::{RecordRepo, StoredRecord};
use crate::http::error::ApiError;
use crate::http::extractors::Caller;
use crate::http::links::{filter_params, param, QueryPairs};
use crate::http::server::AppState;
use crate::models::{Paginated, Pagination, PaginationParams};

#[derive(Serialize)]
pub struct LegacyResponse {
    pub butterflies: Paginated<StoredRecord>,
    pub traps: Paginated<StoredRecord>,
}

async fn legacy_page(
    state: &AppState,
    kind: EntityKind,
    pairs: &QueryPairs,
    pagination: Pagination,
) -> Result<Paginated<StoredRecord>, ApiError> {
    let filter = apply_model_filters(kind.schema(), &filter_params(pairs));
    Ok(RecordRepo::new(&state.pool, kind)
        .report(&filter, &[], pagination)
        .await?)
}

/// GET /legacy - both legacy tables, filtered by the same parameters
async fn list_legacy(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(pairs): Query<QueryPairs>,
) -> Result<Json<LegacyResponse>, ApiError> {
    caller.require(&state, Action::List, Some(EntityKind::ButterflyCollection))?;
    caller.require(&state, Action::List, Some(EntityKind::Trap))?;

    let pagination = PaginationParams {
        page: param(&pairs, "page").and_then(|v| v.parse().ok()),
        per_page: param(&pairs, "per_page").and_then(|v| v.parse().ok()),
    }
    .resolve(state.config.list_page_size);

    let butterflies = legacy_page(&state, EntityKind::ButterflyCollection, &pairs, pagination).await?;
    let traps = legacy_page(&state, EntityKind::Trap, &pairs, pagination).await?;

    Ok(Json(LegacyResponse { butterflies, traps }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/legacy", get(list_legacy))
}
