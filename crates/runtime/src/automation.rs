//! The automation contract and its process entry point.

use std::panic::AssertUnwindSafe;
use std::process::ExitCode;

use async_trait::async_trait;
use autobridge_core::{return_context, Envelope};
use futures::FutureExt;

use crate::capabilities::Capabilities;

/// A unit of work run against one execution context.
///
/// `run` always produces an envelope, failure included; it never reports
/// through panics or process exit codes.
#[async_trait]
pub trait Automation: Send + Sync {
    /// Registry name. Panics are reported under this key.
    fn name(&self) -> &str;

    async fn run(&self, caps: &Capabilities) -> Envelope;
}

/// Run `automation`, turning a panic into a failure envelope under its name.
pub async fn execute(automation: &dyn Automation, caps: &Capabilities) -> Envelope {
    match AssertUnwindSafe(automation.run(caps)).catch_unwind().await {
        Ok(envelope) => envelope,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(automation = automation.name(), error = %message, "Automation panicked");
            Envelope::failure(automation.name(), message)
        }
    }
}

/// Standalone process entry: load the context, run, write the envelope.
///
/// The exit code is success whenever an envelope was produced; the
/// envelope's own `success` field carries the automation's outcome.
pub async fn run_once(automation: &dyn Automation) -> ExitCode {
    let caps = Capabilities::bootstrap();
    tracing::debug!(automation = automation.name(), "Running automation");
    let envelope = execute(automation, &caps).await;
    return_context(&envelope);
    ExitCode::SUCCESS
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "automation panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
