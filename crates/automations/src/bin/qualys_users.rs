use std::process::ExitCode;

use autobridge_automations::{UserContext, UserSource, DEFAULT_LOG_DIRECTIVE};
use autobridge_core::telemetry::init_stderr_tracing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_stderr_tracing(DEFAULT_LOG_DIRECTIVE);

    autobridge_runtime::run_once(&UserContext::new(UserSource::Qualys)).await
}
