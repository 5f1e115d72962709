//! URL scanning client against an in-process fake of the scanning API.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;

use autobridge_integrations::virustotal::VirusTotalSettings;
use autobridge_integrations::{ScanService, VirusTotalClient};

use common::serve;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-apikey").and_then(|v| v.to_str().ok()) == Some("K")
}

async fn submit(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    match form.get("url").map(String::as_str) {
        Some("https://evil.example") => Json(json!({"data": {"id": "evil-1"}})).into_response(),
        Some("https://no-id.example") => Json(json!({"data": {}})).into_response(),
        Some(_) => Json(json!({"data": {"id": "clean-1"}})).into_response(),
        None => (StatusCode::BAD_REQUEST, "missing url").into_response(),
    }
}

async fn analysis(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    let stats = match id.as_str() {
        "evil-1" => json!({"malicious": 5, "harmless": 60}),
        _ => json!({"malicious": 0, "harmless": 70}),
    };
    Json(json!({"data": {"attributes": {"status": "completed", "stats": stats}}})).into_response()
}

async fn fake_scanner() -> String {
    let router = Router::new()
        .route("/urls", post(submit))
        .route("/analyses/{id}", get(analysis));
    serve(router).await
}

fn client(base_url: String, api_key: &str) -> VirusTotalClient {
    VirusTotalClient::new(VirusTotalSettings {
        api_key: Some(api_key.to_string()),
        base_url,
        timeout: Duration::from_secs(5),
        retries: 0,
    })
}

#[tokio::test]
async fn clean_url_reports_zero_malicious() {
    let base = fake_scanner().await;
    let report = client(base, "K").scan_url("https://example.com").await;

    assert!(report.success, "unexpected failure: {:?}", report.error_message);
    assert_eq!(report.analysis_id.as_deref(), Some("clean-1"));
    assert_eq!(report.status.as_deref(), Some("completed"));
    assert_eq!(report.malicious_count(), Some(0));
}

#[tokio::test]
async fn malicious_url_reports_counts() {
    let base = fake_scanner().await;
    let report = client(base, "K").scan_url("https://evil.example").await;

    assert!(report.success);
    assert_eq!(report.malicious_count(), Some(5));
    assert_eq!(report.stats["harmless"], 60);
}

#[tokio::test]
async fn missing_analysis_id_is_failure() {
    let base = fake_scanner().await;
    let report = client(base, "K").scan_url("https://no-id.example").await;

    assert!(!report.success);
    assert_eq!(
        report.error_message.as_deref(),
        Some("No analysis ID returned from VirusTotal")
    );
}

#[tokio::test]
async fn rejected_key_reports_http_status() {
    let base = fake_scanner().await;
    let report = client(base, "wrong").scan_url("https://example.com").await;

    assert!(!report.success);
    assert_eq!(report.error_message.as_deref(), Some("HTTP 401: bad key"));
}

#[tokio::test]
async fn unreachable_service_is_failure_after_retries() {
    let client = VirusTotalClient::new(VirusTotalSettings {
        api_key: Some("K".into()),
        base_url: "http://127.0.0.1:1".into(),
        timeout: Duration::from_secs(1),
        retries: 1,
    });
    let report = client.scan_url("https://example.com").await;

    assert!(!report.success);
    assert!(report
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("Request failed")));
}
