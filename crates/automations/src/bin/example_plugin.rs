use std::process::ExitCode;

use autobridge_automations::{ExamplePlugin, DEFAULT_LOG_DIRECTIVE};
use autobridge_core::telemetry::init_stderr_tracing;
use autobridge_runtime::plugin::run_plugin;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_stderr_tracing(DEFAULT_LOG_DIRECTIVE);

    run_plugin(&ExamplePlugin, std::env::args_os())
}
