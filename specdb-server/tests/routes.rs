//! Router tests
//!
//! Access checks run before any query, so most of these use a lazy pool that
//! never connects. Tests marked `requires database` need `DATABASE_URL`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use specdb_server::http::extractors::{GROUPS_HEADER, USER_HEADER};
use specdb_server::session::SESSION_HEADER;
use specdb_server::{build_router, AppState, ServerConfig};

fn lazy_state(config: ServerConfig) -> Arc<AppState> {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/specdb_unused")
        .unwrap();
    Arc::new(AppState::new(pool, config).unwrap())
}

fn app() -> Router {
    build_router(lazy_state(ServerConfig::default()))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

async fn guest_session(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post("/session/guest").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["guest"], true);
    body["session_id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .oneshot(get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn anonymous_list_redirects_to_login_with_next() {
    let response = app()
        .oneshot(get("/list/specimen?year=2023").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_owned();
    assert_eq!(location, "/accounts/login/?next=%2Flist%2Fspecimen%3Fyear%3D2023");
    assert_eq!(body_json(response).await["error"], "login_required");
}

#[tokio::test]
async fn guest_cannot_edit() {
    let app = app();
    let session = guest_session(&app).await;

    let response = app
        .oneshot(
            post("/edit/specimen/1")
                .header(SESSION_HEADER, &session)
                .body(Body::from(json!({"fields": {"genus": "Papilio"}}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn leaving_guest_mode_requires_a_session() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/session/guest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_admin_cannot_delete_or_edit_reference_data() {
    let app = app();

    let response = app
        .clone()
        .oneshot(
            post("/delete/specimen/7")
                .header(USER_HEADER, "ana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            post("/add/locality")
                .header(USER_HEADER, "ana")
                .header(GROUPS_HEADER, "Researchers")
                .body(Body::from(json!({"fields": {"localityCode": "KL"}}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "forbidden");
}

#[tokio::test]
async fn unknown_kind_is_not_found() {
    let response = app()
        .oneshot(get("/list/dragonfly").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_numeric_id_is_not_found() {
    let response = app()
        .oneshot(
            get("/detail/specimen/abc")
                .header(USER_HEADER, "ana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn filter_hints_are_public() {
    let response = app()
        .oneshot(get("/filters/specimen").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let hints = body_json(response).await;
    let year = hints
        .as_array()
        .unwrap()
        .iter()
        .find(|h| h["field"] == "year")
        .unwrap();
    assert_eq!(year["range_support"], true);
}

#[tokio::test]
async fn guest_sees_placeholder_images_without_a_photo_store() {
    let app = app();
    let session = guest_session(&app).await;

    let response = app
        .oneshot(
            get("/images/2023-KL-0001")
                .header(SESSION_HEADER, &session)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["dorsal"], "no data");
    assert_eq!(body["ventral"], "no data");
}

#[tokio::test]
async fn export_requires_login_even_for_guests() {
    let app = app();
    let session = guest_session(&app).await;

    let response = app
        .oneshot(
            get("/export/specimens.csv")
                .header(SESSION_HEADER, &session)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn bulk_delete_hidden_unless_enabled() {
    let response = app()
        .oneshot(
            post("/debug/bulk-delete/specimen")
                .header(USER_HEADER, "root")
                .header(GROUPS_HEADER, "Admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_delete_needs_admin_when_enabled() {
    let config = ServerConfig {
        debug_bulk_delete: true,
        ..ServerConfig::default()
    };
    let response = build_router(lazy_state(config))
        .oneshot(
            post("/debug/bulk-delete/specimen")
                .header(USER_HEADER, "ana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn import_preview_without_upload() {
    let app = app();
    let admin = |req: axum::http::request::Builder| req.header(USER_HEADER, "root").header(GROUPS_HEADER, "Admin");

    let response = app
        .clone()
        .oneshot(admin(get("/import/preview")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let created = app
        .clone()
        .oneshot(post("/session").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let session = body_json(created).await["session_id"].as_str().unwrap().to_owned();

    let response = app
        .oneshot(
            admin(get("/import/preview?page=2&errors_only=true"))
                .header(SESSION_HEADER, &session)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_butterfly_id_lookup_redirects_to_login() {
    let response = app()
        .oneshot(get("/butterflyid/BF-12").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/accounts/login/?next=%2Fbutterflyid%2FBF-12"
    );
}

#[tokio::test]
async fn blank_butterfly_id_is_not_found() {
    let response = app()
        .oneshot(
            get("/butterflyid/%20")
                .header(USER_HEADER, "ana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_malformed_body_still_redirects() {
    let response = app()
        .oneshot(post("/add/specimen").body(Body::from("{not json")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/accounts/login/?next=%2Fadd%2Fspecimen"
    );
}

#[tokio::test]
async fn signed_in_malformed_body_is_bad_request() {
    let response = app()
        .oneshot(
            post("/edit/specimen/3")
                .header(USER_HEADER, "ana")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
#[ignore = "requires database"]
async fn trap_detail_by_butterfly_id() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
    let pool = specdb_server::create_pool(&url).await.unwrap();
    specdb_server::run_migrations(&pool).await.unwrap();

    let key = format!("BF-{}", std::process::id());
    let trap: specdb_core::Record = [("butterflyID", key.as_str()), ("name", "Ridge trap")]
        .into_iter()
        .collect();
    let repo = specdb_server::RecordRepo::new(&pool, specdb_core::EntityKind::Trap);
    let stored = repo.insert(&trap).await.unwrap();

    let app = build_router(Arc::new(AppState::new(pool.clone(), ServerConfig::default()).unwrap()));
    let response = app
        .clone()
        .oneshot(
            get(&format!("/butterflyid/{key}"))
                .header(USER_HEADER, "ana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "trap");
    assert_eq!(body["record"]["id"], stored.id);

    let response = app
        .oneshot(
            get("/butterflyid/no-such-trap")
                .header(USER_HEADER, "ana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    repo.delete(stored.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn guest_lists_specimens_with_next_link() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
    let pool = specdb_server::create_pool(&url).await.unwrap();
    specdb_server::run_migrations(&pool).await.unwrap();
    let app = build_router(Arc::new(AppState::new(pool, ServerConfig::default()).unwrap()));
    let session = guest_session(&app).await;

    let response = app
        .oneshot(
            get("/list/specimen?per_page=1&genus=pap")
                .header(SESSION_HEADER, &session)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["items"].as_array().unwrap().len() <= 1);
    if let Some(next) = body["next"].as_str() {
        assert!(next.starts_with("/list/specimen?"));
        assert!(next.contains("genus=pap"));
        assert!(next.contains("after="));
    }
}
