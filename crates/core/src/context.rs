//! Context protocol: the execution context in, the result envelope out.
//!
//! An automation process receives at most one JSON document on stdin and
//! writes at most one JSON document to stdout. Loading never fails: absent,
//! interactive or malformed input degrades to the empty context and the
//! cause is logged through `tracing` (which writes to stderr).

use std::io::{self, IsTerminal, Read, Write};

use serde_json::{Map, Value};

use crate::envelope::Envelope;
use crate::error::BridgeError;

/// Top-level mapping of an execution context.
pub type ContextMap = Map<String, Value>;

/// The canonical empty context (`{}`).
pub fn base_context() -> Value {
    Value::Object(Map::new())
}

/// Load the execution context from the process's stdin.
///
/// An interactive terminal is treated as "no input" so that running an
/// automation by hand does not block waiting for a document.
pub fn load_context() -> Value {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        tracing::debug!("stdin is a terminal, starting with an empty context");
        return base_context();
    }
    load_context_from(stdin.lock())
}

/// Load the execution context from any reader, degrading to `{}` on error.
pub fn load_context_from<R: Read>(reader: R) -> Value {
    match try_load_context(reader) {
        Ok(context) => context,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load execution context, using empty context");
            base_context()
        }
    }
}

/// Read and parse a context document, reporting why it was rejected.
///
/// Empty or whitespace-only input is not an error; it yields `{}`.
pub fn try_load_context<R: Read>(mut reader: R) -> Result<Value, BridgeError> {
    let mut raw = String::new();
    reader.read_to_string(&mut raw)?;

    if raw.trim().is_empty() {
        return Ok(base_context());
    }

    let value: Value = serde_json::from_str(&raw)?;
    if !value.is_object() {
        return Err(BridgeError::NotAMapping(value_kind(&value)));
    }
    Ok(value)
}

/// Shallow-merge `patch` into `context`.
///
/// Returns `None` when `context` is not a mapping. Keys present in both
/// take the value from `patch`; nested mappings are replaced, not merged.
pub fn update_context(context: Value, patch: ContextMap) -> Option<Value> {
    match context {
        Value::Object(mut map) => {
            for (key, value) in patch {
                map.insert(key, value);
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

/// Write `envelope` to stdout as the process's single result document.
///
/// Write failures are logged, not returned: the process has no other
/// channel left to report them on.
pub fn return_context(envelope: &Envelope) {
    if let Err(e) = ResultChannel::stdout().emit(envelope) {
        tracing::error!(error = %e, key = envelope.key(), "Failed to write result envelope");
    }
}

/// Exclusive handle on the result channel.
///
/// [`ResultChannel::emit`] consumes the handle, so a holder can write at
/// most one envelope through it.
pub struct ResultChannel<W: Write = io::Stdout> {
    writer: W,
}

impl ResultChannel<io::Stdout> {
    /// Result channel backed by the process's stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ResultChannel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `envelope` pretty-printed, followed by a newline, and
    /// flush. Hands the writer back so callers can inspect buffers.
    pub fn emit(mut self, envelope: &Envelope) -> Result<W, BridgeError> {
        serde_json::to_writer_pretty(&mut self.writer, envelope)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Short JSON type name used in diagnostics.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
