//! Pass-through forwarding of `/api/*` resources.

mod common;

use axum::{
    extract::Path,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use common::{gateway, test_config, unreachable_base_url, FakeUpstream};

const SESSION: &str = "auth_token=tok-123";

fn upstream_routes() -> Router {
    Router::new()
        .route(
            "/api/accounts/{id}",
            get(|Path(id): Path<String>| async move { Json(json!({ "id": id, "role": "student" })) })
                .put(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                    Json(json!({ "id": id, "updated": body }))
                }),
        )
        .route(
            "/api/crimes",
            get(|| async { Json(json!({ "items": [], "total": 0 })) }),
        )
        .route(
            "/api/reports/{id}",
            get(|| async { (StatusCode::FORBIDDEN, Json(json!({ "error": "Forbidden" }))) }),
        )
        .route(
            "/api/statistics/export",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "text/csv"),
                        (header::CONTENT_DISPOSITION, "attachment; filename=\"crimes.csv\""),
                    ],
                    "id,type\n1,theft\n",
                )
                    .into_response()
            }),
        )
        .route(
            "/api/broken",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{not json").into_response() }),
        )
}

#[tokio::test]
async fn test_get_account_forwards_bearer_and_relays_body() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    let response = server
        .get("/api/accounts/123")
        .add_header(header::COOKIE, HeaderValue::from_static(SESSION))
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({ "id": "123", "role": "student" }));

    let calls = upstream.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "GET");
    assert_eq!(calls[0].uri, "/api/accounts/123");
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer tok-123"));
}

#[tokio::test]
async fn test_anonymous_requests_are_forwarded_without_authorization() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    server.get("/api/crimes").await.assert_status_ok();

    assert_eq!(upstream.calls()[0].authorization, None);
}

#[tokio::test]
async fn test_query_string_is_passed_through_verbatim() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    server
        .get("/api/crimes?status=open&page=2&search=bike%20theft")
        .await
        .assert_json(&json!({ "items": [], "total": 0 }));

    assert_eq!(
        upstream.calls()[0].uri,
        "/api/crimes?status=open&page=2&search=bike%20theft"
    );
}

#[tokio::test]
async fn test_put_body_is_forwarded() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    let response = server
        .put("/api/accounts/9")
        .add_header(header::COOKIE, HeaderValue::from_static(SESSION))
        .json(&json!({ "name": "Ada" }))
        .await;

    response.assert_json(&json!({ "id": "9", "updated": { "name": "Ada" } }));
    let calls = upstream.calls();
    assert_eq!(calls[0].method, "PUT");
    assert_eq!(calls[0].content_type.as_deref(), Some("application/json"));
    assert_eq!(calls[0].json(), json!({ "name": "Ada" }));
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed_unchanged() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    let response = server
        .get("/api/reports/5")
        .add_header(header::COOKIE, HeaderValue::from_static(SESSION))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    response.assert_json(&json!({ "error": "Forbidden" }));
}

#[tokio::test]
async fn test_unknown_upstream_route_is_relayed_as_404() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    server
        .get("/api/nowhere")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert_eq!(upstream.calls().len(), 1);
}

#[tokio::test]
async fn test_binary_download_keeps_headers() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    let response = server
        .get("/api/statistics/export")
        .add_header(header::COOKIE, HeaderValue::from_static(SESSION))
        .await;

    response.assert_status_ok();
    response.assert_text("id,type\n1,theft\n");
    assert_eq!(response.header(header::CONTENT_TYPE), "text/csv");
    assert_eq!(
        response.header(header::CONTENT_DISPOSITION),
        "attachment; filename=\"crimes.csv\""
    );
}

#[tokio::test]
async fn test_malformed_upstream_json_is_a_generic_500() {
    let upstream = FakeUpstream::start(upstream_routes()).await;
    let uploads = tempfile::tempdir().unwrap();
    let server = gateway(test_config(&upstream.base_url, uploads.path())).await;

    let response = server.get("/api/broken").await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.assert_json(&json!({ "error": "Internal server error" }));
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_generic_500() {
    let uploads = tempfile::tempdir().unwrap();
    let base_url = unreachable_base_url().await;
    let server = gateway(test_config(&base_url, uploads.path())).await;

    let response = server
        .get("/api/accounts/1")
        .add_header(header::COOKIE, HeaderValue::from_static(SESSION))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body, json!({ "error": "Internal server error" }));
    assert!(!response.text().contains("127.0.0.1"));
}

#[tokio::test]
async fn test_health_is_served_locally() {
    let uploads = tempfile::tempdir().unwrap();
    let base_url = unreachable_base_url().await;
    let server = gateway(test_config(&base_url, uploads.path())).await;

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "ok");

    let ready: Value = server.get("/ready").await.json();
    assert_eq!(ready["upstream_configured"], true);
    assert_eq!(ready["secure_cookies"], false);
}
