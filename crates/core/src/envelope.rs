//! Result envelopes.
//!
//! An envelope is a single-key mapping: the key names the producing
//! automation or integration, the value is a mapping that carries at least
//! a boolean `success`. Because every producer owns a distinct key, the
//! orchestrator folds many envelopes into one run context by key union
//! (see [`merge_envelope`]).

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::context::{value_kind, ContextMap};

/// Field every envelope body must carry.
pub const SUCCESS_FIELD: &str = "success";

/// Field carrying the human-readable failure reason.
pub const ERROR_FIELD: &str = "error";

/// Alternate failure field used by integration-level envelopes.
pub const ERROR_MESSAGE_FIELD: &str = "error_message";

/// Reasons a JSON document is not a well-formed envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("envelope must have exactly one top-level key, found {0}")]
    KeyCount(usize),

    #[error("envelope body under '{key}' must be an object, found {found}")]
    BodyNotAnObject { key: String, found: &'static str },

    #[error("envelope body under '{key}' has no boolean 'success' field")]
    MissingSuccess { key: String },
}

/// A validated result envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    key: String,
    body: Map<String, Value>,
}

impl Envelope {
    /// Envelope with only the `success` flag set.
    pub fn new(key: impl Into<String>, success: bool) -> Self {
        let mut body = Map::new();
        body.insert(SUCCESS_FIELD.to_string(), Value::Bool(success));
        Self {
            key: key.into(),
            body,
        }
    }

    pub fn success(key: impl Into<String>) -> Self {
        Self::new(key, true)
    }

    /// Failed envelope carrying `message` under `error`.
    pub fn failure(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, false).with(ERROR_FIELD, Value::String(message.into()))
    }

    /// Builder-style [`Envelope::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a body field. Writing `success` with a non-boolean is ignored so
    /// the envelope stays valid.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        if field == SUCCESS_FIELD && !value.is_boolean() {
            tracing::warn!(key = %self.key, "Ignoring non-boolean 'success' value");
            return;
        }
        self.body.insert(field, value);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    pub fn is_success(&self) -> bool {
        self.body
            .get(SUCCESS_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The failure reason, from `error` or else `error_message`.
    pub fn error_message(&self) -> Option<&str> {
        self.body
            .get(ERROR_FIELD)
            .and_then(Value::as_str)
            .or_else(|| self.body.get(ERROR_MESSAGE_FIELD).and_then(Value::as_str))
    }

    /// Validate an arbitrary JSON document as an envelope.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(EnvelopeError::NotAnObject(value_kind(&other))),
        };
        if map.len() != 1 {
            return Err(EnvelopeError::KeyCount(map.len()));
        }
        let Some((key, body)) = map.into_iter().next() else {
            return Err(EnvelopeError::KeyCount(0));
        };
        let body = match body {
            Value::Object(body) => body,
            other => {
                return Err(EnvelopeError::BodyNotAnObject {
                    key,
                    found: value_kind(&other),
                })
            }
        };
        if !body.get(SUCCESS_FIELD).is_some_and(Value::is_boolean) {
            return Err(EnvelopeError::MissingSuccess { key });
        }
        Ok(Self { key, body })
    }

    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.key, self.body)
    }

    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(self.key, Value::Object(self.body));
        Value::Object(map)
    }
}

impl TryFrom<Value> for Envelope {
    type Error = EnvelopeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Envelope> for Value {
    fn from(envelope: Envelope) -> Self {
        envelope.into_value()
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, &self.body)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

/// Fold `envelope` into a run context by key union.
///
/// Returns the value previously stored under the envelope's key, if any.
pub fn merge_envelope(context: &mut ContextMap, envelope: Envelope) -> Option<Value> {
    let (key, body) = envelope.into_parts();
    context.insert(key, Value::Object(body))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
