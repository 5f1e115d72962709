#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use autobridge_runtime::dispatch::{AutomationInput, AutomationOutput, AutomationRuntime};
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{addr}")
}

/// Fake URL scanning API. Every URL is clean; `hits` counts submissions.
pub async fn fake_scanner(hits: Arc<AtomicUsize>) -> String {
    async fn submit(State(hits): State<Arc<AtomicUsize>>) -> Json<Value> {
        hits.fetch_add(1, Ordering::SeqCst);
        Json(json!({"data": {"id": "analysis-1"}}))
    }

    async fn analysis(UrlPath(_id): UrlPath<String>) -> Json<Value> {
        Json(json!({"data": {"attributes": {
            "status": "completed",
            "stats": {"malicious": 0, "harmless": 70}
        }}}))
    }

    let router = Router::new()
        .route("/urls", post(submit))
        .route("/analyses/{id}", get(analysis))
        .with_state(hits);
    serve(router).await
}

/// Fake orchestrator serving integration configs from `integrations`.
pub async fn fake_orchestrator(integrations: Value) -> String {
    async fn integration(
        State(integrations): State<Arc<Value>>,
        headers: HeaderMap,
        UrlPath(name): UrlPath<String>,
    ) -> Response {
        if headers.get("X-API-Key").and_then(|v| v.to_str().ok()) != Some("K") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        match integrations.get(&name) {
            Some(config) => Json(json!({"success": true, "integration": config})).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    let router = Router::new()
        .route("/integrations/{name}", get(integration))
        .with_state(Arc::new(integrations));
    serve(router).await
}

/// Write the local orchestrator config into `dir` and return its path.
pub fn write_orchestrator_config(dir: &Path, url: &str) -> PathBuf {
    let path = dir.join("integration_config.json");
    let body = json!({"secauto_url": url, "secauto_api_key": "K", "server_port": 8080});
    std::fs::write(&path, body.to_string()).expect("write orchestrator config");
    path
}

/// Run an automation binary the way the orchestrator does.
pub async fn dispatch(
    binary: &str,
    workdir: &Path,
    config_path: &Path,
    context: Value,
) -> AutomationOutput {
    let input = AutomationInput::new(context)
        .env("AUTOBRIDGE_CONFIG_PATHS", config_path.to_string_lossy())
        .env("AUTOBRIDGE_CACHE_TIMEOUT_SECS", "1")
        .env("AUTOBRIDGE_FETCH_TIMEOUT_SECS", "5")
        .working_directory(workdir)
        .timeout(Duration::from_secs(30));

    AutomationRuntime::Binary
        .run(Path::new(binary), input)
        .await
        .expect("dispatch automation")
}
