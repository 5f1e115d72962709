//! Resolved settings of one named integration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which integrations keep their numeric tunables.
pub const SETTINGS_FIELD: &str = "settings";

/// Settings mapping for one integration (host, port, credentials, tunables).
///
/// Resolved once per process and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationConfig(Map<String, Value>);

impl IntegrationConfig {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A string field, treating the empty string as unset.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// An unsigned integer field; numeric strings such as `"6379"` are accepted.
    pub fn u64_field(&self, field: &str) -> Option<u64> {
        self.0.get(field).and_then(as_u64_lenient)
    }

    /// An unsigned integer under the nested `settings` mapping.
    pub fn setting_u64(&self, name: &str) -> Option<u64> {
        self.0
            .get(SETTINGS_FIELD)
            .and_then(Value::as_object)
            .and_then(|settings| settings.get(name))
            .and_then(as_u64_lenient)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for IntegrationConfig {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
