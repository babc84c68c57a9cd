//! 健康检查与用户管理 API 集成测试

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::{send_json, TestApp, PASSWORD, TEST_TOKEN};

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();

    let (status, body) = send_json(app.router(), "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["checks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_response_carries_trace_headers() {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-trace-id", "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-trace-id"], "trace-abc");
    assert!(response.headers().contains_key("x-request-id"));
}

async fn bearer_for(app: &TestApp, email: &str) -> String {
    let (status, body) = send_json(
        app.router(),
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"email": email, "password": PASSWORD, "recaptcha_token": TEST_TOKEN})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_user_endpoints() {
    let app = TestApp::new();
    app.seed_user_with("boss@example.com", |u| u.role = Some("Admin".to_string()))
        .await;
    let token = bearer_for(&app, "boss@example.com").await;

    let (status, body) = send_json(
        app.router(),
        "POST",
        "/api/v1/users",
        Some(&token),
        Some(json!({
            "email": "hire@example.com",
            "password": PASSWORD,
            "name": "Hire",
            "role": "Sales"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User created successfully");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        app.router(),
        "POST",
        "/api/v1/users",
        Some(&token),
        Some(json!({"email": "hire@example.com", "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "failure");

    let (status, body) = send_json(app.router(), "GET", "/api/v1/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = send_json(
        app.router(),
        "GET",
        "/api/v1/users/search?query=hire",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send_json(
        app.router(),
        "GET",
        "/api/v1/users/search?query=",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Search query cannot be empty.");

    let (status, body) = send_json(
        app.router(),
        "GET",
        "/api/v1/users/filter?role=sales",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send_json(
        app.router(),
        "PUT",
        &format!("/api/v1/users/{}", id),
        Some(&token),
        Some(json!({"name": "Renamed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Renamed");

    let (status, body) = send_json(
        app.router(),
        "PATCH",
        &format!("/api/v1/users/{}/status", id),
        Some(&token),
        Some(json!({"is_active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User successfully deactivated");
    assert_eq!(body["data"]["is_active"], false);

    let (status, _) = send_json(
        app.router(),
        "GET",
        &format!("/api/v1/users/{}", uuid::Uuid::new_v4()),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_toggle_forbidden_for_non_admin() {
    let app = TestApp::new();
    let target = app.seed_user("target@example.com").await;
    app.seed_user("rep@example.com").await;
    let token = bearer_for(&app, "rep@example.com").await;

    let (status, body) = send_json(
        app.router(),
        "PATCH",
        &format!("/api/v1/users/{}/status", target.id),
        Some(&token),
        Some(json!({"is_active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["message"],
        "You do not have permission to perform this action."
    );
}
