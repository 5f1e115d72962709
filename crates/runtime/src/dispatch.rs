//! Orchestrator-side automation dispatch.
//!
//! Spawns an automation process, pipes the execution context to its stdin
//! as JSON, captures stdout/stderr and enforces a timeout. The single
//! document the process leaves on stdout is validated as a result envelope
//! and can be folded back into the run context with [`merge_output`].

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use autobridge_core::context::ContextMap;
use autobridge_core::{merge_envelope, Envelope, EnvelopeError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Once a stream hits the cap its pipe is closed, so a process still
/// writing dies of SIGPIPE. The captured output is truncated and carries no
/// valid envelope.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Default wall-clock budget for one automation run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from dispatching an automation process.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Automation not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Automation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode execution context: {0}")]
    EncodeContext(serde_json::Error),

    #[error("Automation produced no result document (exit code {exit_code}): {stderr}")]
    MissingEnvelope { exit_code: i32, stderr: String },

    #[error("Automation output is not JSON: {0}")]
    MalformedOutput(serde_json::Error),

    #[error("Automation output is not a valid envelope: {0}")]
    InvalidEnvelope(#[from] EnvelopeError),
}

/// What an automation process is started with.
#[derive(Debug, Clone)]
pub struct AutomationInput {
    /// Execution context piped to stdin.
    pub context: Value,
    /// Additional environment variables for the child process.
    pub env_vars: Vec<(String, String)>,
    /// Working directory for the child (current dir if `None`).
    pub working_directory: Option<PathBuf>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

impl AutomationInput {
    pub fn new(context: Value) -> Self {
        Self {
            context,
            env_vars: Vec::new(),
            working_directory: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of one automation process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by a signal).
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Stdout validated as a result envelope, `None` if it is not one.
    pub envelope: Option<Envelope>,
}

impl AutomationOutput {
    /// The result envelope, or why stdout does not hold one.
    pub fn try_envelope(&self) -> Result<Envelope, DispatchError> {
        if let Some(envelope) = &self.envelope {
            return Ok(envelope.clone());
        }
        parse_envelope(&self.stdout).and_then(|parsed| {
            parsed.ok_or_else(|| DispatchError::MissingEnvelope {
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        })
    }
}

/// How an automation file is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationRuntime {
    /// Executed directly; must exist and be executable.
    Binary,
    /// Run by the given Python interpreter.
    Python { interpreter: PathBuf },
    /// Run by `bash`.
    Shell,
}

impl AutomationRuntime {
    /// Python from a virtual environment at `venv`.
    pub fn python_venv(venv: &Path) -> Self {
        Self::Python {
            interpreter: venv.join("bin").join("python"),
        }
    }

    /// Build the command that starts `path` under this runtime.
    pub async fn command(&self, path: &Path) -> Result<Command, DispatchError> {
        match self {
            Self::Binary => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|_| DispatchError::NotFound(path.display().to_string()))?;
                let mode = metadata.permissions().mode();
                if mode & 0o111 == 0 {
                    return Err(DispatchError::PermissionDenied(format!(
                        "{} is not executable (mode {mode:#o})",
                        path.display()
                    )));
                }
                Ok(Command::new(path))
            }
            Self::Python { interpreter } => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(path);
                Ok(cmd)
            }
            Self::Shell => {
                let mut cmd = Command::new("bash");
                cmd.arg(path);
                Ok(cmd)
            }
        }
    }

    /// Start `path` under this runtime with `input`.
    pub async fn run(
        &self,
        path: &Path,
        input: AutomationInput,
    ) -> Result<AutomationOutput, DispatchError> {
        let mut cmd = self.command(path).await?;
        run_automation(&mut cmd, input).await
    }
}

/// Spawn `cmd`, pipe the context in, capture output and enforce the
/// timeout.
///
/// A non-zero exit is not an error here; the output (and any envelope) is
/// returned either way.
pub async fn run_automation(
    cmd: &mut Command,
    input: AutomationInput,
) -> Result<AutomationOutput, DispatchError> {
    let payload = serde_json::to_vec(&input.context).map_err(DispatchError::EncodeContext)?;

    // `kill_on_drop` kills the child when it is dropped on timeout.
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &input.env_vars {
        cmd.env(key, value);
    }
    if let Some(dir) = &input.working_directory {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    // Written from a task so a child that never reads stdin is still
    // bounded by the timeout below.
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            let _ = stdin.write_all(&payload).await;
        });
    }

    match tokio::time::timeout(input.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
            let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
            let exit_code = status.code().unwrap_or(-1);

            let envelope = match parse_envelope(&stdout) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(exit_code, error = %e, "Automation output rejected");
                    None
                }
            };

            tracing::debug!(exit_code, duration_ms, has_envelope = envelope.is_some(), "Automation finished");
            Ok(AutomationOutput {
                stdout,
                stderr,
                exit_code,
                duration_ms,
                envelope,
            })
        }
        Ok(Err(e)) => Err(DispatchError::Io(e)),
        Err(_elapsed) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            tracing::warn!(elapsed_ms, "Automation timed out, killing");
            Err(DispatchError::Timeout { elapsed_ms })
        }
    }
}

/// Fold the run's envelope into `run_context`.
///
/// Returns the value previously stored under the envelope's key.
pub fn merge_output(
    run_context: &mut ContextMap,
    output: &AutomationOutput,
) -> Result<Option<Value>, DispatchError> {
    let envelope = output.try_envelope()?;
    Ok(merge_envelope(run_context, envelope))
}

/// `Ok(None)` for empty stdout; otherwise the parsed envelope or why it is
/// not one.
fn parse_envelope(stdout: &str) -> Result<Option<Envelope>, DispatchError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed).map_err(DispatchError::MalformedOutput)?;
    Ok(Some(Envelope::from_value(value)?))
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn write_temp_script(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/bash").expect("write shebang");
        write!(f, "{body}").expect("write body");
        f
    }

    fn input(context: Value) -> AutomationInput {
        AutomationInput::new(context).timeout(Duration::from_secs(5))
    }

    async fn run_shell(body: &str, input: AutomationInput) -> Result<AutomationOutput, DispatchError> {
        let script = write_temp_script(body);
        AutomationRuntime::Shell.run(script.path(), input).await
    }

    #[tokio::test]
    async fn context_is_piped_to_stdin() {
        let output = run_shell("cat\n", input(json!({"urls": ["https://example.com"]})))
            .await
            .expect("run");
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("https://example.com"));
        // Single key, but the body is an array.
        assert!(output.envelope.is_none());
    }

    #[tokio::test]
    async fn envelope_is_validated_and_merged() {
        let body = r#"echo '{"enrich": {"success": true, "score": 7}}'
echo "diagnostics" >&2
"#;
        let output = run_shell(body, input(json!({}))).await.expect("run");
        let envelope = output.envelope.clone().expect("envelope");
        assert_eq!(envelope.key(), "enrich");
        assert!(output.stderr.contains("diagnostics"));

        let mut run_context = ContextMap::new();
        run_context.insert("enrich".into(), json!("stale"));
        run_context.insert("other".into(), json!(1));

        let previous = merge_output(&mut run_context, &output).expect("merge");
        assert_eq!(previous, Some(json!("stale")));
        assert_eq!(
            Value::Object(run_context),
            json!({"enrich": {"success": true, "score": 7}, "other": 1})
        );
    }

    #[tokio::test]
    async fn invalid_envelopes_are_reported() {
        let output = run_shell(r#"echo '{"a": {"success": true}, "b": {}}'"#, input(json!({})))
            .await
            .expect("run");
        assert!(output.envelope.is_none());
        assert_matches!(
            merge_output(&mut ContextMap::new(), &output),
            Err(DispatchError::InvalidEnvelope(EnvelopeError::KeyCount(2)))
        );

        let output = run_shell("echo 'not json'\n", input(json!({}))).await.expect("run");
        assert_matches!(output.try_envelope(), Err(DispatchError::MalformedOutput(_)));

        let output = run_shell("echo boom >&2\nexit 3\n", input(json!({}))).await.expect("run");
        assert_eq!(output.exit_code, 3);
        assert_matches!(
            output.try_envelope(),
            Err(DispatchError::MissingEnvelope { exit_code: 3, ref stderr }) if stderr == "boom"
        );
    }

    #[tokio::test]
    async fn env_and_working_directory_are_applied() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let body = r#"printf '{"envcheck": {"success": true, "var": "%s", "cwd": "%s"}}' "$CHECK_VAR" "$(pwd -P)""#;
        let output = run_shell(
            body,
            input(json!({}))
                .env("CHECK_VAR", "hello_world")
                .working_directory(dir.path()),
        )
        .await
        .expect("run");

        let envelope = output.envelope.expect("envelope");
        assert_eq!(envelope.get("var"), Some(&json!("hello_world")));
        let expected = dir.path().canonicalize().expect("canonicalize dir");
        assert_eq!(
            envelope.get("cwd").and_then(Value::as_str),
            expected.to_str()
        );
    }

    #[tokio::test]
    async fn oversized_output_is_truncated_without_envelope() {
        let body = "head -c 12000000 /dev/zero | tr '\\0' 'a'\n";
        let output = run_shell(body, input(json!({}))).await.expect("run");
        assert_eq!(output.stdout.len(), MAX_OUTPUT_BYTES);
        assert!(output.envelope.is_none());
        assert_matches!(output.try_envelope(), Err(DispatchError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let result = run_shell(
            "sleep 60\n",
            AutomationInput::new(json!({})).timeout(Duration::from_millis(200)),
        )
        .await;
        assert_matches!(result, Err(DispatchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn binary_must_exist_and_be_executable() {
        let result = AutomationRuntime::Binary
            .run(Path::new("/nonexistent/automation"), input(json!({})))
            .await;
        assert_matches!(result, Err(DispatchError::NotFound(_)));

        let f = tempfile::NamedTempFile::new().expect("create temp file");
        let result = AutomationRuntime::Binary.run(f.path(), input(json!({}))).await;
        assert_matches!(result, Err(DispatchError::PermissionDenied(_)));
    }

    #[test]
    fn python_venv_interpreter_path() {
        assert_eq!(
            AutomationRuntime::python_venv(Path::new("/opt/venv")),
            AutomationRuntime::Python {
                interpreter: PathBuf::from("/opt/venv/bin/python")
            }
        );
    }
}
