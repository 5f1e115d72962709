//! Active/inactive user counts from vulnerability-management listings.
//!
//! Two listing formats are understood. Counts are returned in a
//! `"usercontext"` envelope and shared with other automations through the
//! cache under `{source}_user_count_{clientname}`.

use async_trait::async_trait;
use autobridge_core::{search_context_path, Envelope};
use autobridge_runtime::{Automation, Capabilities};
use serde_json::{json, Value};

/// Envelope key of every user-context result.
pub const ENVELOPE_KEY: &str = "usercontext";

/// Client name used in cache keys when the context has none.
const UNKNOWN_CLIENT: &str = "unknown";

/// Where the user listing in the context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSource {
    /// `users[]`, each with a boolean `enabled`.
    Tenable,
    /// `USER_LIST_OUTPUT.USER_LIST.USER`, each with `USER_STATUS.#text`.
    Qualys,
}

impl UserSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenable => "tenable",
            Self::Qualys => "qualys",
        }
    }

    /// `None` when the context holds no users in this format.
    fn count(&self, context: &Value) -> Option<UserCounts> {
        let users: Vec<&Value> = match self {
            Self::Tenable => context.get("users")?.as_array()?.iter().collect(),
            // Single-user listings arrive as an object rather than a list.
            Self::Qualys => match search_context_path(context, "USER_LIST_OUTPUT.USER_LIST.USER")? {
                Value::Array(users) => users.iter().collect(),
                user @ Value::Object(_) => vec![user],
                _ => return None,
            },
        };
        if users.is_empty() {
            return None;
        }

        let active = users.iter().filter(|user| self.is_active(user)).count();
        Some(UserCounts {
            active_users: active,
            inactive_users: users.len() - active,
        })
    }

    fn is_active(&self, user: &Value) -> bool {
        match self {
            Self::Tenable => user.get("enabled").and_then(Value::as_bool) == Some(true),
            Self::Qualys => {
                search_context_path(user, "USER_STATUS.#text").and_then(Value::as_str) == Some("Active")
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct UserCounts {
    active_users: usize,
    inactive_users: usize,
}

impl UserCounts {
    fn to_value(self) -> Value {
        json!({
            "active_users": self.active_users,
            "inactive_users": self.inactive_users,
        })
    }
}

/// Counts active and inactive users in one listing format.
pub struct UserContext {
    source: UserSource,
    name: String,
}

impl UserContext {
    pub fn new(source: UserSource) -> Self {
        Self {
            source,
            name: format!("{}_users", source.as_str()),
        }
    }

    /// Cache key the counts are stored under.
    pub fn cache_key(&self, clientname: &str) -> String {
        format!("{}_user_count_{}", self.source.as_str(), clientname)
    }
}

#[async_trait]
impl Automation for UserContext {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, caps: &Capabilities) -> Envelope {
        let Some(counts) = self.source.count(caps.context()) else {
            tracing::info!(source = self.source.as_str(), "No users in context");
            return Envelope::failure(ENVELOPE_KEY, "No users seen")
                .with("results", Value::Array(Vec::new()))
                .with("summary", UserCounts::default().to_value());
        };

        let clientname = caps
            .get("clientname")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_CLIENT);
        let key = self.cache_key(clientname);
        let summary = counts.to_value();

        match caps.cache().await {
            Some(cache) => {
                if let Err(e) = cache.set(&key, &summary.to_string()).await {
                    tracing::warn!(key = %key, error = %e, "Failed to cache user counts");
                }
            }
            None => tracing::warn!(key = %key, "No cache available, user counts not shared"),
        }

        tracing::info!(
            source = self.source.as_str(),
            active = counts.active_users,
            inactive = counts.inactive_users,
            "Users counted"
        );
        Envelope::success(ENVELOPE_KEY).with("summary", summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
