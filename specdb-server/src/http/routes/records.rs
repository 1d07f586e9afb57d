//! Generic list/detail/create/edit/delete endpoints for every entity kind

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::Serialize;

use specdb_core::config::MAX_LIST_PAGE_SIZE;
use specdb_core::{apply_model_filters, Action, AuditLog, EditRequest, EntityKind};

use crate::db::repos::{RecordRepo, StoredRecord};
use crate::http::error::ApiError;
use crate::http::extractors::{Caller, Kind, KindAndId};
use crate::http::links::{filter_params, link, param, with_param, QueryPairs};
use crate::http::server::AppState;
use crate::images::SpecimenImages;
use crate::models::Cursor;

/// One keyset page of a list
#[derive(Serialize)]
pub struct ListResponse {
    pub kind: EntityKind,
    pub items: Vec<StoredRecord>,
    pub next_cursor: Option<String>,
    /// Link to the next page, keeping the active filters
    pub next: Option<String>,
}

/// One record with its parsed logs and, for specimens, photo links
#[derive(Serialize)]
pub struct DetailResponse {
    pub kind: EntityKind,
    pub record: StoredRecord,
    pub logs: BTreeMap<&'static str, AuditLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<SpecimenImages>,
}

/// GET /list/{kind} - filtered keyset page
async fn list_records(
    State(state): State<Arc<AppState>>,
    Kind(kind): Kind,
    caller: Caller,
    Query(pairs): Query<QueryPairs>,
) -> Result<Json<ListResponse>, ApiError> {
    caller.require(&state, Action::List, Some(kind))?;

    let filter = apply_model_filters(kind.schema(), &filter_params(&pairs));
    let after = param(&pairs, "after").map(Cursor::decode).transpose()?;
    let limit = param(&pairs, "per_page")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(state.config.list_page_size)
        .clamp(1, MAX_LIST_PAGE_SIZE);

    let page = RecordRepo::new(&state.pool, kind)
        .list_keyset(&filter, after.as_ref(), limit)
        .await?;
    let next = page
        .next_cursor
        .as_deref()
        .map(|cursor| link(&format!("/list/{kind}"), with_param(&pairs, "after", cursor)));

    Ok(Json(ListResponse {
        kind,
        items: page.items,
        next_cursor: page.next_cursor,
        next,
    }))
}

/// Request body, parsed only after the access check so anonymous callers
/// are redirected whatever they sent.
type EditBody = Result<Json<EditRequest>, JsonRejection>;

fn edit_request(body: EditBody) -> Result<EditRequest, ApiError> {
    body.map(|Json(request)| request)
        .map_err(|e| ApiError::BadRequest {
            message: e.body_text(),
        })
}

async fn detail(state: &AppState, kind: EntityKind, record: StoredRecord) -> DetailResponse {
    let logs = kind
        .schema()
        .fields
        .iter()
        .filter(|f| f.append_only)
        .map(|f| (f.name, AuditLog::parse(record.fields.get(f.name))))
        .collect();
    let images = match (kind, record.fields.get("catalogNumber")) {
        (EntityKind::Specimen, Some(catalog)) => Some(state.images.images_for(catalog).await),
        (EntityKind::Specimen, None) => Some(SpecimenImages::missing()),
        _ => None,
    };

    DetailResponse {
        kind,
        record,
        logs,
        images,
    }
}

/// GET /detail/{kind}/{id}
async fn get_record(
    State(state): State<Arc<AppState>>,
    KindAndId(kind, id): KindAndId,
    caller: Caller,
) -> Result<Json<DetailResponse>, ApiError> {
    caller.require(&state, Action::Detail, Some(kind))?;

    let record = RecordRepo::new(&state.pool, kind).get(id).await?;
    Ok(Json(detail(&state, kind, record).await))
}

/// GET /butterflyid/{butterfly_id} - trap detail by its butterfly ID
async fn get_by_butterfly_id(
    State(state): State<Arc<AppState>>,
    Path(butterfly_id): Path<String>,
    caller: Caller,
) -> Result<Json<DetailResponse>, ApiError> {
    let kind = EntityKind::Trap;
    caller.require(&state, Action::Detail, Some(kind))?;

    let key = butterfly_id.trim();
    let not_found = || ApiError::NotFound {
        resource: kind.schema().label,
        id: key.to_owned(),
    };
    if key.is_empty() {
        return Err(not_found());
    }
    let record = RecordRepo::new(&state.pool, kind)
        .find_by_key(key)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(detail(&state, kind, record).await))
}

/// POST /add/{kind}
async fn create_record(
    State(state): State<Arc<AppState>>,
    Kind(kind): Kind,
    caller: Caller,
    body: EditBody,
) -> Result<(StatusCode, Json<StoredRecord>), ApiError> {
    caller.require(&state, Action::Create, Some(kind))?;
    let request = edit_request(body)?;

    let today = Local::now().date_naive();
    let record = kind.rules().prepare_create(kind.schema(), &request, today)?;
    let stored = RecordRepo::new(&state.pool, kind).insert(&record).await?;
    tracing::info!(kind = %kind, id = stored.id, "record created");

    Ok((StatusCode::CREATED, Json(stored)))
}

/// POST /edit/{kind}/{id}
async fn update_record(
    State(state): State<Arc<AppState>>,
    KindAndId(kind, id): KindAndId,
    caller: Caller,
    body: EditBody,
) -> Result<Json<StoredRecord>, ApiError> {
    caller.require(&state, Action::Edit, Some(kind))?;
    let request = edit_request(body)?;

    let repo = RecordRepo::new(&state.pool, kind);
    let current = repo.get(id).await?;
    let today = Local::now().date_naive();
    let changes = kind
        .rules()
        .prepare_update(kind.schema(), &current.fields, &request, today)?;
    let updated = repo.update(id, &changes).await?;
    tracing::info!(kind = %kind, id, fields = changes.len(), "record updated");

    Ok(Json(updated))
}

/// POST /delete/{kind}/{id}
async fn delete_record(
    State(state): State<Arc<AppState>>,
    KindAndId(kind, id): KindAndId,
    caller: Caller,
) -> Result<StatusCode, ApiError> {
    caller.require(&state, Action::Delete, Some(kind))?;

    RecordRepo::new(&state.pool, kind).delete(id).await?;
    tracing::info!(kind = %kind, id, "record deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Record routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/list/{kind}", get(list_records))
        .route("/detail/{kind}/{id}", get(get_record))
        .route("/butterflyid/{butterfly_id}", get(get_by_butterfly_id))
        .route("/add/{kind}", post(create_record))
        .route("/edit/{kind}/{id}", post(update_record))
        .route("/delete/{kind}/{id}", post(delete_record))
}
