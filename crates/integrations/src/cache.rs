//! Keyed string cache shared between automations.
//!
//! Cross-automation coordination goes through this cache, never through
//! the bridge. Connection settings come from the `"redis"` integration
//! config and fall back to a local default when it is unresolved.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use autobridge_core::Envelope;
use redis::AsyncCommands;

use crate::config::IntegrationConfig;

/// Integration name the cache settings are resolved under; also the
/// envelope key of cache results.
pub const CACHE_INTEGRATION: &str = "redis";

pub const DEFAULT_CACHE_HOST: &str = "localhost";
pub const DEFAULT_CACHE_PORT: u16 = 6379;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache did not answer within {0:?}")]
    Timeout(Duration),
}

/// Get/set/delete of UTF-8 string values.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Where the cache lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_CACHE_HOST.to_string(),
            port: DEFAULT_CACHE_PORT,
            password: String::new(),
        }
    }
}

impl CacheSettings {
    /// Read `host`, `port` and `password` from a resolved config, defaulting
    /// each missing field. `None` yields all defaults.
    pub fn from_config(config: Option<&IntegrationConfig>) -> Self {
        let defaults = Self::default();
        let Some(config) = config else {
            return defaults;
        };

        Self {
            host: config
                .str_field("host")
                .map(str::to_string)
                .unwrap_or(defaults.host),
            port: config
                .u64_field("port")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.port),
            password: config
                .str_field("password")
                .map(str::to_string)
                .unwrap_or(defaults.password),
        }
    }

    /// Connection URL understood by [`redis::Client::open`].
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/", self.host, self.port)
        } else {
            format!("redis://:{}@{}:{}/", self.password, self.host, self.port)
        }
    }
}

/// Redis-backed [`CacheStore`].
///
/// Connects per operation; automations are short-lived and issue a handful
/// of commands at most.
pub struct RedisCache {
    client: redis::Client,
    timeout: Duration,
}

impl RedisCache {
    /// Build a client for `settings`. No connection is made until the first
    /// command.
    pub fn new(settings: &CacheSettings, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(settings.url())?;
        Ok(Self { client, timeout })
    }

    async fn connect(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.bounded(self.client.get_multiplexed_async_connection())
            .await
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
            .map_err(CacheError::from)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut con = self.connect().await?;
        self.bounded(con.get::<_, Option<String>>(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut con = self.connect().await?;
        self.bounded(con.set::<_, _, ()>(key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut con = self.connect().await?;
        self.bounded(con.del::<_, ()>(key)).await
    }
}

/// Process-local [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Envelope helpers
// ---------------------------------------------------------------------------

/// `get` as a `"redis"` envelope: `value` on a hit, `error_message` otherwise.
pub async fn get_cache(store: &dyn CacheStore, key: &str) -> Envelope {
    match store.get(key).await {
        Ok(Some(value)) => Envelope::success(CACHE_INTEGRATION).with("value", value),
        Ok(None) => Envelope::new(CACHE_INTEGRATION, false).with("error_message", "Key not found"),
        Err(e) => failed(&e),
    }
}

/// `set` as a `"redis"` envelope.
pub async fn set_cache(store: &dyn CacheStore, key: &str, value: &str) -> Envelope {
    match store.set(key, value).await {
        Ok(()) => Envelope::success(CACHE_INTEGRATION).with("message", "Value set"),
        Err(e) => failed(&e),
    }
}

/// `delete` as a `"redis"` envelope.
pub async fn delete_cache(store: &dyn CacheStore, key: &str) -> Envelope {
    match store.delete(key).await {
        Ok(()) => Envelope::success(CACHE_INTEGRATION).with("message", "Value deleted"),
        Err(e) => failed(&e),
    }
}

fn failed(error: &CacheError) -> Envelope {
    tracing::warn!(error = %error, "Cache operation failed");
    Envelope::new(CACHE_INTEGRATION, false).with("error_message", error.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn settings_default_without_config() {
        assert_eq!(CacheSettings::from_config(None), CacheSettings::default());
        assert_eq!(CacheSettings::default().url(), "redis://localhost:6379/");
    }

    #[test]
    fn settings_from_partial_config() {
        let config: IntegrationConfig =
            serde_json::from_value(json!({"host": "cache.internal", "port": 70000}))
                .expect("mapping");
        let settings = CacheSettings::from_config(Some(&config));
        assert_eq!(settings.host, "cache.internal");
        assert_eq!(settings.port, DEFAULT_CACHE_PORT, "out-of-range port falls back");
        assert_eq!(settings.password, "");
    }

    #[test]
    fn url_includes_password() {
        let settings = CacheSettings {
            host: "h".into(),
            port: 6380,
            password: "secret".into(),
        };
        assert_eq!(settings.url(), "redis://:secret@h:6380/");
    }

    #[test]
    fn redis_client_builds_without_connecting() {
        assert!(RedisCache::new(&CacheSettings::default(), Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn redis_unreachable_reports_failure_envelope() {
        let settings = CacheSettings {
            host: "127.0.0.1".into(),
            port: 1,
            password: String::new(),
        };
        let cache = RedisCache::new(&settings, Duration::from_millis(500)).expect("client");

        let envelope = get_cache(&cache, "anything").await;
        assert_eq!(envelope.key(), "redis");
        assert!(!envelope.is_success());
        assert!(envelope.error_message().is_some());
    }

    #[tokio::test]
    async fn memory_cache_round_trip_envelopes() {
        let cache = MemoryCache::new();

        let missing = get_cache(&cache, "tenable_user_count_acme").await;
        assert!(!missing.is_success());
        assert_eq!(missing.error_message(), Some("Key not found"));

        assert!(set_cache(&cache, "tenable_user_count_acme", "{\"active_users\":2}")
            .await
            .is_success());
        let hit = get_cache(&cache, "tenable_user_count_acme").await;
        assert_eq!(hit.get("value"), Some(&json!("{\"active_users\":2}")));

        assert!(delete_cache(&cache, "tenable_user_count_acme").await.is_success());
        assert!(!get_cache(&cache, "tenable_user_count_acme").await.is_success());
    }
}
