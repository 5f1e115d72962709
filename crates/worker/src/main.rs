use std::path::PathBuf;

use autobridge_core::telemetry::init_stderr_tracing;
use autobridge_runtime::CapabilitySupervisor;
use autobridge_worker::Worker;
use tokio::io::BufReader;

/// Settings file watched for capability reloads.
const DEFAULT_SETTINGS_FILE: &str = "autobridge.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_stderr_tracing(autobridge_automations::DEFAULT_LOG_DIRECTIVE);

    let settings_file: PathBuf = std::env::var("AUTOBRIDGE_SETTINGS_FILE")
        .unwrap_or_else(|_| DEFAULT_SETTINGS_FILE.to_string())
        .into();

    let supervisor = CapabilitySupervisor::from_settings_file(&settings_file);
    let mut worker = Worker::new(supervisor, autobridge_automations::registry());
    tracing::info!(
        settings = %settings_file.display(),
        automations = ?worker.automation_names(),
        "Worker starting"
    );

    worker
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    Ok(())
}
