//! Warm worker: many automation runs in one process.
//!
//! Requests arrive one per line as `{"automation": name, "context": {...}}`
//! and each is answered with exactly one envelope line. Before every
//! dispatch the capability supervisor gets a chance to rebind; the
//! request's own context is never affected by a reload.

use std::collections::HashMap;
use std::sync::Arc;

use autobridge_core::Envelope;
use autobridge_runtime::{execute, Automation, Capabilities, CapabilitySupervisor, ReloadOutcome};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;
use uuid::Uuid;

/// Envelope key for failures the worker reports itself.
pub const WORKER_KEY: &str = "worker";

/// One line of worker input.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    pub automation: String,
    #[serde(default = "autobridge_core::base_context")]
    pub context: Value,
}

pub struct Worker {
    supervisor: CapabilitySupervisor,
    automations: HashMap<String, Arc<dyn Automation>>,
}

impl Worker {
    pub fn new(
        supervisor: CapabilitySupervisor,
        automations: impl IntoIterator<Item = Arc<dyn Automation>>,
    ) -> Self {
        let automations = automations
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect();
        Self {
            supervisor,
            automations,
        }
    }

    pub fn supervisor(&self) -> &CapabilitySupervisor {
        &self.supervisor
    }

    /// Registered automation names, sorted.
    pub fn automation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.automations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run one request and return its envelope.
    pub async fn dispatch(&mut self, request: DispatchRequest) -> Envelope {
        if self.supervisor.check_and_reload() == ReloadOutcome::Reloaded {
            tracing::info!(generation = self.supervisor.generation(), "Dispatching with reloaded capabilities");
        }

        let Some(automation) = self.automations.get(&request.automation).cloned() else {
            tracing::warn!(automation = %request.automation, "Unknown automation");
            return Envelope::failure(
                WORKER_KEY,
                format!("Unknown automation: {}", request.automation),
            )
            .with("automation", request.automation);
        };

        if !request.context.is_object() {
            return Envelope::failure(WORKER_KEY, "Execution context must be a JSON object")
                .with("automation", request.automation);
        }

        let caps = Capabilities::new(request.context, self.supervisor.bindings());
        let span = tracing::info_span!(
            "dispatch",
            dispatch_id = %Uuid::now_v7(),
            automation = %request.automation
        );
        execute(automation.as_ref(), &caps).instrument(span).await
    }

    /// Answer request lines from `reader` on `writer` until end of input.
    ///
    /// Blank lines are skipped. A malformed line yields a failure envelope
    /// and the loop continues. Returns the number of envelopes written.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut answered = 0;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let envelope = match serde_json::from_str::<DispatchRequest>(&line) {
                Ok(request) => self.dispatch(request).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed dispatch request");
                    Envelope::failure(WORKER_KEY, format!("Malformed request: {e}"))
                }
            };

            let mut out = serde_json::to_vec(&envelope)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
            answered += 1;
        }

        tracing::info!(answered, "Input closed, worker stopping");
        Ok(answered)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
