use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use specdb_core::{Action, EntityKind};

use crate::http::error::ApiError;
use crate::http::extractors::Caller;
use crate::http::server::AppState;
use crate::images::SpecimenImages;

/// GET /images/{catalog} - dorsal and ventral photo URLs
async fn specimen_images(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(catalog): Path<String>,
) -> Result<Json<SpecimenImages>, ApiError> {
    caller.require(&state, Action::Images, Some(EntityKind::Specimen))?;
    Ok(Json(state.images.images_for(catalog.trim()).await))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/images/{catalog}", get(specimen_images))
}
