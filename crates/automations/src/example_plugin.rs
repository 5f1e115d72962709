//! Plugin that enriches an incident and the user attached to it.

use autobridge_runtime::plugin::{Plugin, PluginError, PluginInfo};
use serde_json::{json, Map, Value};

/// Confidence attached to every enriched incident.
const PLUGIN_CONFIDENCE: f64 = 0.85;

pub struct ExamplePlugin;

impl Plugin for ExamplePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "example_plugin".into(),
            version: "1.0.0".into(),
            description: "Example plugin for automation playbooks".into(),
            author: "Automation Team".into(),
            kind: "automation".into(),
            supported_operations: vec!["process_incident".into(), "enrich_data".into()],
        }
    }

    fn execute(&self, params: Value) -> Result<Value, PluginError> {
        let Value::Object(mut params) = params else {
            return Err(PluginError::Execution(
                "parameters must be a JSON object".into(),
            ));
        };
        tracing::debug!(fields = params.len(), "Example plugin executing");

        let mut incident = take_object(&mut params, "incident");
        incident.insert("enriched_by_plugin".into(), json!(true));
        incident.insert("plugin_confidence".into(), json!(PLUGIN_CONFIDENCE));
        incident.insert(
            "additional_indicators".into(),
            json!(["suspicious_activity_detected", "threat_level_elevated"]),
        );

        let mut user = take_object(&mut params, "user");
        user.insert("last_processed_by".into(), json!("example_plugin"));

        let now = chrono::Utc::now();
        Ok(json!({
            "plugin_processed": true,
            "processing_timestamp": now.timestamp_millis() as f64 / 1000.0,
            "incident": incident,
            "user": user,
        }))
    }

    fn cleanup(&self) {
        tracing::info!("Example plugin cleanup completed");
    }
}

/// Remove `field` from `params` as a mapping; anything else reads as empty.
fn take_object(params: &mut Map<String, Value>, field: &str) -> Map<String, Value> {
    match params.remove(field) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
