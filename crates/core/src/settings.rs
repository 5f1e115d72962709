//! Bridge settings: where to look for orchestrator coordinates and how long
//! to wait on remote collaborators.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Local candidates for the orchestrator config file, tried in order.
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "data/integration_config.json",
    "SoarAuto/data/integration_config.json",
    "../SoarAuto/data/integration_config.json",
];

/// Orchestrator address used when no config file supplies one.
pub const DEFAULT_ORCHESTRATOR_URL: &str = "http://localhost:8080";

/// Remote integration config fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Cache connect and command timeout.
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 5;

/// Errors reading a settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings shared by every capability the bridge hands to automations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Config Resolution Path: local orchestrator config candidates.
    pub config_paths: Vec<PathBuf>,
    /// Orchestrator address used when no candidate qualifies.
    pub default_url: String,
    /// Timeout for `GET {url}/integrations/{name}`.
    pub fetch_timeout_secs: u64,
    /// Timeout for cache connections and commands.
    pub cache_timeout_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            config_paths: DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect(),
            default_url: DEFAULT_ORCHESTRATOR_URL.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            cache_timeout_secs: DEFAULT_CACHE_TIMEOUT_SECS,
        }
    }
}

impl BridgeSettings {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var                          | Default                          |
    /// |----------------------------------|----------------------------------|
    /// | `AUTOBRIDGE_CONFIG_PATHS`        | [`DEFAULT_CONFIG_PATHS`], `:`-separated |
    /// | `AUTOBRIDGE_DEFAULT_URL`         | `http://localhost:8080`          |
    /// | `AUTOBRIDGE_FETCH_TIMEOUT_SECS`  | `10`                             |
    /// | `AUTOBRIDGE_CACHE_TIMEOUT_SECS`  | `5`                              |
    ///
    /// Unparsable numbers keep their default and are logged.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(raw) = std::env::var("AUTOBRIDGE_CONFIG_PATHS") {
            let paths: Vec<PathBuf> = std::env::split_paths(&raw)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                settings.config_paths = paths;
            }
        }

        if let Ok(url) = std::env::var("AUTOBRIDGE_DEFAULT_URL") {
            let url = url.trim();
            if !url.is_empty() {
                settings.default_url = url.to_string();
            }
        }

        settings.fetch_timeout_secs =
            env_secs("AUTOBRIDGE_FETCH_TIMEOUT_SECS", settings.fetch_timeout_secs);
        settings.cache_timeout_secs =
            env_secs("AUTOBRIDGE_CACHE_TIMEOUT_SECS", settings.cache_timeout_secs);

        settings
    }

    /// Load settings from a JSON document. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }
}

fn env_secs(var: &str, default: u64) -> u64 {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var, value = %raw, default, "Ignoring unparsable timeout");
            default
        }),
        Err(_) => default,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
