//! Threat-intel URL scanning client.
//!
//! Submits a URL for analysis and fetches the resulting verdict counts.
//! Results are always a [`ScanReport`]; failures are reported in it rather
//! than returned as errors so a batch scan yields one entry per URL.

use std::time::Duration;

use async_trait::async_trait;
use autobridge_core::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::IntegrationConfig;
use crate::resolver::ConfigSource;

/// Integration name, also the envelope key of scan results.
pub const INTEGRATION_NAME: &str = "virustotal";

pub const DEFAULT_BASE_URL: &str = "https://www.virustotal.com/api/v3";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETRIES: u32 = 3;

/// Header carrying the scanning service API key.
const API_KEY_HEADER: &str = "x-apikey";

/// Base delay between transport-level retries; grows linearly per attempt.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Errors from a single scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("VirusTotal API key not configured")]
    NotConfigured,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("No analysis ID returned from VirusTotal")]
    MissingAnalysisId,
}

/// Outcome of scanning one URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Verdict counts by engine category (`malicious`, `harmless`, ...).
    #[serde(default)]
    pub stats: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScanReport {
    pub fn failed(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of engines flagging the URL malicious, or `None` when the
    /// scan produced no verdicts.
    pub fn malicious_count(&self) -> Option<u64> {
        if self.stats.is_empty() {
            return None;
        }
        Some(
            self.stats
                .get("malicious")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        )
    }

    /// The report as a `"virustotal"` envelope.
    pub fn into_envelope(self) -> Envelope {
        let mut envelope = Envelope::new(INTEGRATION_NAME, self.success).with("url", self.url);
        if let Some(id) = self.analysis_id {
            envelope.insert("analysis_id", id);
        }
        if let Some(status) = self.status {
            envelope.insert("status", status);
        }
        if !self.stats.is_empty() {
            envelope.insert("stats", Value::Object(self.stats));
        }
        if let Some(message) = self.error_message {
            envelope.insert("error_message", message);
        }
        envelope
    }
}

/// Something that can scan a URL.
#[async_trait]
pub trait ScanService: Send + Sync {
    async fn scan_url(&self, url: &str) -> ScanReport;
}

/// Client settings read from the `"virustotal"` integration config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirusTotalSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for VirusTotalSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
        }
    }
}

impl VirusTotalSettings {
    /// `apikey`, `url`, `settings.timeout` and `settings.retries`, each
    /// defaulted when missing.
    pub fn from_config(config: Option<&IntegrationConfig>) -> Self {
        let defaults = Self::default();
        let Some(config) = config else {
            return defaults;
        };

        Self {
            api_key: config.str_field("apikey").map(str::to_string),
            base_url: config
                .str_field("url")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: config
                .setting_u64("timeout")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            retries: config
                .setting_u64("retries")
                .and_then(|r| u32::try_from(r).ok())
                .unwrap_or(defaults.retries),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    data: SubmitData,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitData {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    data: AnalysisData,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisData {
    #[serde(default)]
    attributes: AnalysisAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisAttributes {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    stats: Map<String, Value>,
}

/// HTTP client for the URL scanning API.
pub struct VirusTotalClient {
    client: reqwest::Client,
    settings: VirusTotalSettings,
}

impl VirusTotalClient {
    pub fn new(settings: VirusTotalSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// Build a client from the `"virustotal"` config, resolved on demand.
    pub async fn from_source(source: &dyn ConfigSource) -> Self {
        let config = source.integration_config(INTEGRATION_NAME).await;
        if config.is_none() {
            tracing::debug!("VirusTotal config unresolved, using defaults");
        }
        Self::new(VirusTotalSettings::from_config(config.as_ref()))
    }

    pub fn settings(&self) -> &VirusTotalSettings {
        &self.settings
    }

    /// Submit `url` and fetch its analysis.
    pub async fn try_scan(&self, url: &str) -> Result<ScanReport, ScanError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or(ScanError::NotConfigured)?;

        let analysis_id = self.submit(api_key, url).await?;
        let attributes = self.get_report(api_key, &analysis_id).await?;

        Ok(ScanReport {
            url: url.to_string(),
            success: true,
            analysis_id: Some(analysis_id),
            status: Some(attributes.status.unwrap_or_else(|| "unknown".to_string())),
            stats: attributes.stats,
            error_message: None,
        })
    }

    async fn submit(&self, api_key: &str, url: &str) -> Result<String, ScanError> {
        let response = self
            .send(|| {
                self.client
                    .post(format!("{}/urls", self.settings.base_url))
                    .header(API_KEY_HEADER, api_key)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .form(&[("url", url)])
            })
            .await?;

        let body: SubmitResponse = response.json().await?;
        if body.data.id.is_empty() {
            return Err(ScanError::MissingAnalysisId);
        }
        Ok(body.data.id)
    }

    async fn get_report(
        &self,
        api_key: &str,
        analysis_id: &str,
    ) -> Result<AnalysisAttributes, ScanError> {
        let response = self
            .send(|| {
                self.client
                    .get(format!("{}/analyses/{}", self.settings.base_url, analysis_id))
                    .header(API_KEY_HEADER, api_key)
                    .header(reqwest::header::ACCEPT, "application/json")
            })
            .await?;

        let body: AnalysisResponse = response.json().await?;
        Ok(body.data.attributes)
    }

    /// Send a request, retrying connect and timeout failures up to the
    /// configured retry count. Non-success statuses are not retried.
    async fn send(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ScanError> {
        let mut attempt: u32 = 0;
        loop {
            match build().timeout(self.settings.timeout).send().await {
                Ok(response) => return ensure_success(response).await,
                Err(e) if attempt < self.settings.retries && (e.is_connect() || e.is_timeout()) => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "Scan request failed, retrying");
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ScanError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ScanError::HttpStatus {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ScanService for VirusTotalClient {
    async fn scan_url(&self, url: &str) -> ScanReport {
        match self.try_scan(url).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(url, error = %e, "URL scan failed");
                ScanReport::failed(url, e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
