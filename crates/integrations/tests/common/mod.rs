#![allow(dead_code)]

use axum::Router;

/// Serve `router` on an ephemeral localhost port and return its base URL.
///
/// The server task lives until the test's runtime shuts down.
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

/// Write a local orchestrator config candidate pointing at `url`.
pub fn write_orchestrator_config(
    dir: &std::path::Path,
    url: &str,
    api_key: &str,
) -> std::path::PathBuf {
    let path = dir.join("integration_config.json");
    let body = serde_json::json!({
        "secauto_url": url,
        "secauto_api_key": api_key,
        "server_host": "127.0.0.1",
        "server_port": 8080,
    });
    std::fs::write(&path, body.to_string()).expect("write orchestrator config");
    path
}
