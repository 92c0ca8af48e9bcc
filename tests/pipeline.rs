//! End-to-end tests of the request pipeline over a real listener.

use chess_backend::config::{AuditMode, ServiceConfig};
use chess_backend::observability::Level;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn health_check_reports_ok() {
    let server = common::spawn(ServiceConfig::default()).await;

    let response = reqwest::get(server.url("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert!(!headers.contains_key("content-security-policy"));
    let request_id = headers["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "development");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(timestamp.ends_with('Z'));
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_route_in_production_hides_stack() {
    let server = common::spawn(common::production()).await;

    let response = reqwest::get(server.url("/foo")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("content-security-policy"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "success": false, "error": "Route /foo not found" }));

    let logged = server.wait_for_logs("API Error", 1).await;
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].metadata["url"], "/foo");
    assert_eq!(logged[0].metadata["method"], "GET");
    assert_eq!(logged[0].metadata["ip"], "127.0.0.1");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_route_in_development_exposes_stack() {
    let server = common::spawn(ServiceConfig::default()).await;

    let body: Value = reqwest::get(server.url("/missing?x=1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"], "Route /missing?x=1 not found");
    assert!(body["stack"]
        .as_str()
        .unwrap()
        .contains("Route /missing?x=1 not found"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn each_request_gets_one_start_and_one_completion_record() {
    let server = common::spawn(ServiceConfig::default()).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = client.get(server.url("/api/health")).send().await.unwrap();
        let _ = response.bytes().await.unwrap();
    }

    let started = server.wait_for_logs("Incoming request", 3).await;
    let completed = server.wait_for_logs("Request completed", 3).await;
    assert_eq!(started.len(), 3);
    assert_eq!(completed.len(), 3);
    assert!(completed.iter().all(|r| r.level == Level::Http));
    assert!(completed.iter().all(|r| r.metadata["statusCode"] == 200));

    // The start record carries the id the response echoes.
    assert!(started[0].metadata["requestId"].is_string());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn head_request_gets_one_completion_record() {
    let server = common::spawn(ServiceConfig::default()).await;

    let response = reqwest::Client::new()
        .head(server.url("/api/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let completed = server.wait_for_logs("Request completed", 1).await;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].metadata["method"], "HEAD");
    assert_eq!(completed[0].metadata["statusCode"], 200);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(server.logs.with_message("Request completed").len(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn error_only_audit_logs_failures_alone() {
    let mut config = ServiceConfig::default();
    config.logging.request_log = AuditMode::Errors;
    let server = common::spawn(config).await;

    reqwest::get(server.url("/api/health")).await.unwrap();
    reqwest::get(server.url("/nope")).await.unwrap();

    let errors = server.wait_for_logs("Request error", 1).await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, Level::Error);
    assert_eq!(errors[0].metadata["statusCode"], 404);
    assert_eq!(errors[0].metadata["url"], "/nope");
    assert!(server.logs.with_message("Incoming request").is_empty());
    assert!(server.logs.with_message("Request completed").is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn rate_limit_rejects_after_ceiling() {
    let mut config = ServiceConfig::default();
    config.rate_limit.max_requests = Some(3);
    let server = common::spawn(config).await;
    let client = reqwest::Client::new();

    for remaining in ["2", "1", "0"] {
        let response = client.get(server.url("/api/health")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-remaining"], remaining);
    }

    let response = client.get(server.url("/api/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Too many requests from this IP, please try again later."
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_body_is_413() {
    let mut config = ServiceConfig::default();
    config.body.limit_bytes = 16;
    let server = common::spawn(config).await;

    let response = reqwest::Client::new()
        .post(server.url("/api/health"))
        .json(&json!({ "payload": "far more than sixteen bytes" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "request entity too large");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_json_is_400_and_logged() {
    let server = common::spawn(ServiceConfig::default()).await;

    let response = reqwest::Client::new()
        .post(server.url("/api/health"))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid JSON body");
    assert!(body["details"]["reason"].is_string());

    let logged = server.wait_for_logs("API Error", 1).await;
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].metadata["method"], "POST");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn cors_preflight_allows_frontend() {
    let server = common::spawn(ServiceConfig::default()).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, server.url("/api/health"))
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    server.stop().await.unwrap();
}
