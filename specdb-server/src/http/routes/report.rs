//! Specimen report: offset pages in taxonomic order

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use specdb_core::filter::report_ordering;
use specdb_core::{apply_model_filters, Action, EntityKind};

use crate::db::repos::{RecordRepo, StoredRecord};
use crate::http::error::ApiError;
use crate::http::extractors::Caller;
use crate::http::links::{filter_params, page_link, param, QueryPairs};
use crate::http::server::AppState;
use crate::models::PaginationParams;

const REPORT_PATH: &str = "/report";

#[derive(Serialize)]
pub struct ReportResponse {
    pub items: Vec<StoredRecord>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub next: Option<String>,
    pub prev: Option<String>,
}

fn page_param(pairs: &QueryPairs, key: &str) -> Option<u32> {
    param(pairs, key).and_then(|v| v.trim().parse().ok())
}

/// GET /report
async fn specimen_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(pairs): Query<QueryPairs>,
) -> Result<Json<ReportResponse>, ApiError> {
    caller.require(&state, Action::Report, Some(EntityKind::Specimen))?;

    let kind = EntityKind::Specimen;
    let filter = apply_model_filters(kind.schema(), &filter_params(&pairs));
    let pagination = PaginationParams {
        page: page_param(&pairs, "page"),
        per_page: page_param(&pairs, "per_page"),
    }
    .resolve(state.config.list_page_size);

    let page = RecordRepo::new(&state.pool, kind)
        .report(&filter, report_ordering(kind), pagination)
        .await?;

    let total_pages = page.total_pages();
    let next = page
        .has_next()
        .then(|| page_link(REPORT_PATH, &pairs, page.page + 1));
    let prev = page
        .has_prev()
        .then(|| page_link(REPORT_PATH, &pairs, page.page - 1));

    Ok(Json(ReportResponse {
        total: page.total,
        page: page.page,
        per_page: page.per_page,
        total_pages,
        next,
        prev,
        items: page.items,
    }))
}

/// Report routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(REPORT_PATH, get(specimen_report))
}
