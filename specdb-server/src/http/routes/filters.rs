use std::sync::Arc;

use axum::{routing::get, Json, Router};

use specdb_core::filter::{filter_hints, FilterHint};

use crate::http::extractors::Kind;
use crate::http::server::AppState;

/// GET /filters/{kind} - placeholder and help text per filterable field
async fn list_hints(Kind(kind): Kind) -> Json<Vec<FilterHint>> {
    Json(filter_hints(kind.schema()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/filters/{kind}", get(list_hints))
}
