//! Capability supervisor for long-lived worker processes.
//!
//! The supervisor owns the current [`Bindings`] and the settings file they
//! were loaded from. Calling [`CapabilitySupervisor::check_and_reload`]
//! before each dispatch rebinds when that file's modification time has
//! moved forward. Execution contexts are never touched: callers rebind an
//! existing [`crate::Capabilities`] with [`crate::Capabilities::rebind`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use autobridge_core::{BridgeError, BridgeSettings};

use crate::capabilities::Bindings;

/// Builds bindings from a settings file.
pub type BindingsLoader = Box<dyn Fn(&Path) -> Result<Bindings, BridgeError> + Send + Sync>;

/// Result of a [`CapabilitySupervisor::check_and_reload`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// File not newer than the last (attempted) load.
    Unchanged,
    /// File changed and new bindings are active.
    Reloaded,
    /// File absent or its modification time unreadable.
    Missing,
    /// File changed but loading it failed; previous bindings kept.
    Failed,
}

pub struct CapabilitySupervisor {
    source: PathBuf,
    loader: BindingsLoader,
    bindings: Arc<Bindings>,
    last_modified: Option<SystemTime>,
    generation: u64,
}

impl CapabilitySupervisor {
    /// Load bindings from `source` once.
    ///
    /// Never fails: a missing or unloadable file leaves environment-derived
    /// bindings in place, and the next change to the file is picked up by
    /// `check_and_reload`.
    pub fn activate(source: impl Into<PathBuf>, loader: BindingsLoader) -> Self {
        let source = source.into();
        let modified = modified_time(&source);

        let bindings = match modified {
            Some(_) => match loader(&source) {
                Ok(bindings) => {
                    tracing::info!(path = %source.display(), "Capabilities bound");
                    bindings
                }
                Err(e) => {
                    tracing::warn!(path = %source.display(), error = %e, "Failed to load capability settings, using environment");
                    Bindings::from_settings(BridgeSettings::from_env())
                }
            },
            None => {
                tracing::debug!(path = %source.display(), "Settings file absent, using environment");
                Bindings::from_settings(BridgeSettings::from_env())
            }
        };

        Self {
            source,
            loader,
            bindings: Arc::new(bindings),
            last_modified: modified,
            generation: 0,
        }
    }

    /// Supervisor whose bindings are built from a [`BridgeSettings`] JSON
    /// file.
    pub fn from_settings_file(source: impl Into<PathBuf>) -> Self {
        Self::activate(
            source,
            Box::new(|path: &Path| -> Result<Bindings, BridgeError> {
                Ok(Bindings::from_settings(BridgeSettings::from_file(path)?))
            }),
        )
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Currently active bindings.
    pub fn bindings(&self) -> Arc<Bindings> {
        Arc::clone(&self.bindings)
    }

    /// Number of successful reloads since activation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rebind if the settings file is newer than the last load attempt.
    ///
    /// Idempotent: a second call without a further file change returns
    /// [`ReloadOutcome::Unchanged`]. Failures are logged and never
    /// propagate.
    pub fn check_and_reload(&mut self) -> ReloadOutcome {
        let Some(modified) = modified_time(&self.source) else {
            return ReloadOutcome::Missing;
        };
        if self.last_modified.is_some_and(|last| modified <= last) {
            return ReloadOutcome::Unchanged;
        }

        // Recorded before loading so a broken file is not re-read on every
        // dispatch.
        self.last_modified = Some(modified);

        match (self.loader)(&self.source) {
            Ok(bindings) => {
                self.bindings = Arc::new(bindings);
                self.generation += 1;
                tracing::info!(
                    path = %self.source.display(),
                    generation = self.generation,
                    "Capabilities rebound"
                );
                ReloadOutcome::Reloaded
            }
            Err(e) => {
                tracing::warn!(path = %self.source.display(), error = %e, "Reload failed, keeping previous capabilities");
                ReloadOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for CapabilitySupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySupervisor")
            .field("source", &self.source)
            .field("last_modified", &self.last_modified)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::fs;

    use filetime::FileTime;
    use serde_json::json;

    use super::*;
    use crate::capabilities::Capabilities;

    fn write_settings(path: &Path, default_url: &str) {
        fs::write(
            path,
            json!({"default_url": default_url, "config_paths": []}).to_string(),
        )
        .expect("write settings");
    }

    /// Push the file's mtime `secs` into the future relative to now.
    fn bump_mtime(path: &Path, secs: i64) {
        let now = FileTime::now();
        let ft = FileTime::from_unix_time(now.unix_seconds() + secs, 0);
        filetime::set_file_mtime(path, ft).expect("set mtime");
    }

    #[test]
    fn reload_only_after_mtime_advances() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("autobridge.json");
        write_settings(&path, "http://first:1");

        let mut supervisor = CapabilitySupervisor::from_settings_file(&path);
        assert_eq!(supervisor.bindings().settings().default_url, "http://first:1");
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Unchanged);

        write_settings(&path, "http://second:2");
        bump_mtime(&path, 10);

        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Reloaded);
        assert_eq!(supervisor.bindings().settings().default_url, "http://second:2");
        assert_eq!(supervisor.generation(), 1);

        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Unchanged);
        assert_eq!(supervisor.generation(), 1);
    }

    #[test]
    fn failed_reload_keeps_previous_bindings() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("autobridge.json");
        write_settings(&path, "http://good:1");
        let mut supervisor = CapabilitySupervisor::from_settings_file(&path);

        fs::write(&path, "{ not json").expect("write");
        bump_mtime(&path, 10);

        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Failed);
        assert_eq!(supervisor.bindings().settings().default_url, "http://good:1");
        // Same broken file is not retried.
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Unchanged);

        write_settings(&path, "http://fixed:2");
        bump_mtime(&path, 20);
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Reloaded);
        assert_eq!(supervisor.bindings().settings().default_url, "http://fixed:2");
    }

    #[test]
    fn missing_file_is_a_noop() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("absent.json");

        let mut supervisor = CapabilitySupervisor::from_settings_file(&path);
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Missing);
        assert_eq!(supervisor.generation(), 0);

        write_settings(&path, "http://late:3");
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Reloaded);
        assert_eq!(supervisor.bindings().settings().default_url, "http://late:3");
    }

    #[test]
    fn unloadable_file_at_activation_falls_back() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("autobridge.json");
        fs::write(&path, "{ nope").expect("write");

        let mut supervisor = CapabilitySupervisor::from_settings_file(&path);
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Unchanged);
        assert_eq!(supervisor.generation(), 0);
    }

    #[test]
    fn rebinding_preserves_context() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("autobridge.json");
        write_settings(&path, "http://first:1");
        let mut supervisor = CapabilitySupervisor::from_settings_file(&path);

        let caps = Capabilities::new(json!({"urls": ["https://example.com"]}), supervisor.bindings());

        write_settings(&path, "http://second:2");
        bump_mtime(&path, 10);
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Reloaded);

        let rebound = caps.rebind(supervisor.bindings());
        assert_eq!(rebound.context(), caps.context());
        assert_eq!(rebound.orchestrator().url, "http://second:2");
        assert_eq!(caps.orchestrator().url, "http://first:1");
    }

    #[test]
    fn custom_loader_errors_are_contained() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("autobridge.json");
        write_settings(&path, "http://x:1");

        let mut supervisor = CapabilitySupervisor::activate(
            &path,
            Box::new(|_: &Path| Err(BridgeError::NotAMapping("array"))),
        );
        bump_mtime(&path, 10);
        assert_eq!(supervisor.check_and_reload(), ReloadOutcome::Failed);
        assert_eq!(supervisor.generation(), 0);
    }
}
