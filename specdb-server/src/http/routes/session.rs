//! Session endpoints: issue ids and toggle guest mode

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::http::error::ApiError;
use crate::http::extractors::Caller;
use crate::http::server::AppState;

/// Session state response
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub guest: bool,
}

/// POST /session - issue a new session id
async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionResponse>) {
    let session_id = state.sessions.create().await;
    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            guest: false,
        }),
    )
}

/// Reuse the caller's session, or start one when they have none.
async fn session_for(state: &AppState, caller: &Caller) -> String {
    match caller.session_id.as_deref() {
        Some(id) if state.sessions.exists(id).await => id.to_owned(),
        _ => state.sessions.create().await,
    }
}

/// POST /session/guest - enter read-only guest mode
async fn enable_guest(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = session_for(&state, &caller).await;
    state.sessions.set_guest(&session_id, true).await?;
    tracing::info!("guest mode enabled");
    Ok(Json(SessionResponse {
        session_id,
        guest: true,
    }))
}

/// DELETE /session/guest - leave guest mode
async fn disable_guest(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = caller.session()?.to_owned();
    state.sessions.set_guest(&session_id, false).await?;
    Ok(Json(SessionResponse {
        session_id,
        guest: false,
    }))
}

/// Session routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/guest", post(enable_guest).delete(disable_guest))
}
