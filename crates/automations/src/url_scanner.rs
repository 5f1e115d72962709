//! URL reputation scan over the context's top-level `urls`.
//!
//! Produces one `"virustotal"` envelope with a result entry per URL and a
//! batch summary. Individual scan failures never abort the batch.

use std::sync::Arc;

use async_trait::async_trait;
use autobridge_core::Envelope;
use autobridge_integrations::virustotal::INTEGRATION_NAME;
use autobridge_integrations::{ScanReport, ScanService, VirusTotalClient};
use autobridge_runtime::{Automation, Capabilities};
use serde_json::{json, Map, Value};

/// Registry name.
pub const NAME: &str = "url_scanner";

/// Context field holding the URLs to scan.
pub const URLS_FIELD: &str = "urls";

/// Context `urls` split into scannable and rejected entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UrlBatch {
    pub valid: Vec<String>,
    pub invalid: Vec<InvalidUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUrl {
    pub raw: String,
    pub reason: String,
}

impl UrlBatch {
    /// Classify the entries of a `urls` value.
    ///
    /// A bare string counts as a one-entry list. Unresolved template
    /// variables (`{{...}}`), blank strings and non-strings are invalid. A
    /// string holding a JSON array is expanded into its string items.
    pub fn from_value(urls: Option<&Value>) -> Self {
        let entries: Vec<&Value> = match urls {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };

        let mut batch = Self::default();
        for entry in entries {
            match entry {
                Value::String(url) if is_template(url) => batch.invalid.push(InvalidUrl {
                    raw: url.clone(),
                    reason: format!("Template variable not resolved: {url}"),
                }),
                Value::String(url) if !url.trim().is_empty() => match expand_array(url) {
                    Some(items) => batch.valid.extend(items),
                    None => batch.valid.push(url.clone()),
                },
                other => {
                    let raw = match other {
                        Value::String(s) => s.clone(),
                        v => v.to_string(),
                    };
                    batch.invalid.push(InvalidUrl {
                        reason: format!("Invalid URL entry: {raw:?}"),
                        raw,
                    });
                }
            }
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.invalid.is_empty()
    }
}

fn is_template(url: &str) -> bool {
    url.starts_with("{{") && url.ends_with("}}")
}

/// `"[\"a\", \"b\"]"` into its non-blank string items; `None` when `url`
/// is not a JSON array.
fn expand_array(url: &str) -> Option<Vec<String>> {
    if !(url.starts_with('[') && url.ends_with(']')) {
        return None;
    }
    let items: Vec<Value> = serde_json::from_str(url).ok()?;
    Some(
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
    )
}

/// Batch counters reported under `summary`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanSummary {
    pub total_urls: usize,
    pub scanned_urls: usize,
    /// URLs flagged by at least one engine.
    pub malicious_urls: usize,
    pub clean_urls: usize,
    pub failed_scans: usize,
    pub invalid_urls: usize,
    /// Percentage of valid URLs scanned successfully.
    pub success_rate: f64,
}

impl ScanSummary {
    fn to_value(&self) -> Value {
        json!({
            "total_urls": self.total_urls,
            "scanned_urls": self.scanned_urls,
            "malicious_urls": self.malicious_urls,
            "clean_urls": self.clean_urls,
            "failed_scans": self.failed_scans,
            "invalid_urls": self.invalid_urls,
            "success_rate": self.success_rate,
        })
    }
}

/// Scans every URL in the context with the configured scanning service.
#[derive(Default)]
pub struct UrlScanner {
    scanner: Option<Arc<dyn ScanService>>,
}

impl UrlScanner {
    /// Scanner that builds its client from the `"virustotal"` config on
    /// each run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `scanner` instead of the configured client.
    pub fn with_scanner(scanner: Arc<dyn ScanService>) -> Self {
        Self {
            scanner: Some(scanner),
        }
    }

    async fn scanner(&self, caps: &Capabilities) -> Arc<dyn ScanService> {
        match &self.scanner {
            Some(scanner) => Arc::clone(scanner),
            None => Arc::new(VirusTotalClient::from_source(caps.bindings().config_source()).await),
        }
    }
}

#[async_trait]
impl Automation for UrlScanner {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self, caps: &Capabilities) -> Envelope {
        let batch = UrlBatch::from_value(caps.get(URLS_FIELD));

        if batch.is_empty() {
            tracing::info!("No URLs in context");
            return Envelope::failure(
                INTEGRATION_NAME,
                "No URLs provided in context. Expected \"urls\" key",
            )
            .with("results", Value::Array(Vec::new()))
            .with("summary", ScanSummary::default().to_value());
        }

        let mut results = Vec::new();
        let mut summary = ScanSummary {
            total_urls: batch.valid.len() + batch.invalid.len(),
            invalid_urls: batch.invalid.len(),
            failed_scans: batch.invalid.len(),
            ..ScanSummary::default()
        };

        if batch.valid.is_empty() {
            let raw: Vec<&str> = batch.invalid.iter().map(|i| i.raw.as_str()).collect();
            tracing::warn!(invalid = ?raw, "No valid URLs in context");
            results.extend(batch.invalid.iter().map(invalid_entry));
            return Envelope::failure(
                INTEGRATION_NAME,
                format!("No valid URLs provided. Invalid URLs: {raw:?}"),
            )
            .with("results", results)
            .with("summary", summary.to_value());
        }

        let scanner = self.scanner(caps).await;
        let mut failed_valid = 0;

        for url in &batch.valid {
            let report = scanner.scan_url(url).await;
            match report.malicious_count() {
                Some(malicious) if report.success => {
                    if malicious > 0 {
                        summary.malicious_urls += 1;
                    } else {
                        summary.clean_urls += 1;
                    }
                }
                _ => failed_valid += 1,
            }
            results.push(report_entry(report));
        }
        results.extend(batch.invalid.iter().map(invalid_entry));

        summary.failed_scans += failed_valid;
        summary.scanned_urls = batch.valid.len() - failed_valid;
        summary.success_rate = summary.scanned_urls as f64 / batch.valid.len() as f64 * 100.0;

        tracing::info!(
            total = summary.total_urls,
            malicious = summary.malicious_urls,
            failed = summary.failed_scans,
            "URL scan finished"
        );

        Envelope::new(INTEGRATION_NAME, summary.failed_scans == 0)
            .with("results", results)
            .with("summary", summary.to_value())
            .with("timestamp", chrono::Utc::now().to_rfc3339())
    }
}

fn report_entry(report: ScanReport) -> Value {
    json!({
        "url": report.url,
        "verdicts": Value::Object(report.stats),
        "success": report.success,
        "error_message": report.error_message.unwrap_or_default(),
    })
}

fn invalid_entry(invalid: &InvalidUrl) -> Value {
    json!({
        "url": invalid.raw,
        "verdicts": Value::Object(Map::new()),
        "success": false,
        "error_message": invalid.reason,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
