//! Integration config resolution.
//!
//! Orchestrator coordinates come from the first local candidate file that
//! carries both an address and an API key. With a key in hand the named
//! integration's settings are fetched from `GET {url}/integrations/{name}`;
//! without one no request is made at all. Every failure degrades to
//! `None`; [`IntegrationConfigResolver::try_get_integration_config`] keeps
//! the cause for callers that want it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autobridge_core::BridgeSettings;
use serde::Deserialize;
use serde_json::Value;

use crate::config::IntegrationConfig;

/// Header carrying the orchestrator API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Errors from resolving an integration's config.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("failed to read {path}: {source}")]
    LocalRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    LocalParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no orchestrator API key available")]
    MissingCredential,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("config endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("config endpoint returned no integration payload for '{0}'")]
    MissingPayload(String),
}

/// Where the orchestrator lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorEndpoint {
    pub url: String,
    pub api_key: Option<String>,
}

/// On-disk format of a local orchestrator config candidate.
///
/// This is the file the orchestrator itself writes; keys other than the
/// address and API key (`server_host`, `server_port`, ...) are ignored.
#[derive(Debug, Deserialize)]
struct LocalConfigFile {
    #[serde(default, alias = "orchestrator_url")]
    secauto_url: Option<String>,
    #[serde(default, alias = "orchestrator_api_key")]
    secauto_api_key: Option<String>,
}

/// Body of a `GET /integrations/{name}` response.
#[derive(Debug, Deserialize)]
struct IntegrationResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    integration: Option<Value>,
}

/// Resolve orchestrator coordinates from the local candidate files.
///
/// Candidates that are missing, unreadable, malformed or incomplete are
/// skipped. With no qualifying candidate the default address is returned
/// without an API key.
pub fn get_orchestrator_config(settings: &BridgeSettings) -> OrchestratorEndpoint {
    for path in &settings.config_paths {
        match read_candidate(path) {
            Ok(Some(endpoint)) => {
                tracing::debug!(path = %path.display(), "Using orchestrator config");
                return endpoint;
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "Skipping orchestrator config candidate"),
        }
    }

    tracing::debug!(url = %settings.default_url, "No orchestrator config found, using default");
    OrchestratorEndpoint {
        url: settings.default_url.clone(),
        api_key: None,
    }
}

fn read_candidate(path: &Path) -> Result<Option<OrchestratorEndpoint>, ResolverError> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ResolverError::LocalRead {
        path: path.to_path_buf(),
        source,
    })?;
    let file: LocalConfigFile =
        serde_json::from_str(&raw).map_err(|source| ResolverError::LocalParse {
            path: path.to_path_buf(),
            source,
        })?;

    let url = file.secauto_url.filter(|s| !s.trim().is_empty());
    let api_key = file.secauto_api_key.filter(|s| !s.trim().is_empty());

    Ok(match (url, api_key) {
        (Some(url), Some(api_key)) => Some(OrchestratorEndpoint {
            url,
            api_key: Some(api_key),
        }),
        _ => None,
    })
}

/// Anything that can hand out integration configs by name.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// The named integration's settings, or `None` when unresolved.
    async fn integration_config(&self, name: &str) -> Option<IntegrationConfig>;
}

/// Resolves integration configs through the orchestrator's config endpoint.
///
/// Nothing is cached: each call re-reads the local candidates and, when a
/// key is found, re-fetches.
pub struct IntegrationConfigResolver {
    client: reqwest::Client,
    settings: BridgeSettings,
}

impl IntegrationConfigResolver {
    pub fn new(settings: BridgeSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling across
    /// resolvers in one worker).
    pub fn with_client(client: reqwest::Client, settings: BridgeSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn orchestrator(&self) -> OrchestratorEndpoint {
        get_orchestrator_config(&self.settings)
    }

    /// Fetch `name`'s config, reporting why resolution failed.
    pub async fn try_get_integration_config(
        &self,
        name: &str,
    ) -> Result<IntegrationConfig, ResolverError> {
        let endpoint = self.orchestrator();
        let api_key = endpoint.api_key.ok_or(ResolverError::MissingCredential)?;

        let response = self
            .client
            .get(format!(
                "{}/integrations/{}",
                endpoint.url.trim_end_matches('/'),
                name
            ))
            .header(API_KEY_HEADER, api_key)
            .timeout(self.settings.fetch_timeout())
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ResolverError::HttpStatus(status.as_u16()));
        }

        let body: IntegrationResponse = response.json().await?;
        match body.integration {
            Some(Value::Object(fields)) if body.success && !fields.is_empty() => {
                Ok(IntegrationConfig::new(fields))
            }
            _ => Err(ResolverError::MissingPayload(name.to_string())),
        }
    }

    /// Fetch `name`'s config, or `None` on any failure.
    pub async fn get_integration_config(&self, name: &str) -> Option<IntegrationConfig> {
        match self.try_get_integration_config(name).await {
            Ok(config) => Some(config),
            Err(ResolverError::MissingCredential) => {
                tracing::debug!(integration = name, "No API key, integration config unresolved");
                None
            }
            Err(e) => {
                tracing::warn!(integration = name, error = %e, "Failed to resolve integration config");
                None
            }
        }
    }
}

#[async_trait]
impl ConfigSource for IntegrationConfigResolver {
    async fn integration_config(&self, name: &str) -> Option<IntegrationConfig> {
        self.get_integration_config(name).await
    }
}

/// Fixed, in-memory integration configs.
///
/// Used by offline runs and tests in place of the orchestrator endpoint.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    configs: HashMap<String, IntegrationConfig>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, config: IntegrationConfig) -> Self {
        self.configs.insert(name.into(), config);
        self
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn integration_config(&self, name: &str) -> Option<IntegrationConfig> {
        self.configs.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
