//! Capability bundle handed to an automation.
//!
//! An automation sees exactly two things: the execution context it was
//! started with, and a set of bound collaborators (integration configs and
//! the shared cache). Nothing is injected into a global namespace; the
//! bundle is passed explicitly to [`crate::Automation::run`].

use std::sync::Arc;

use autobridge_core::context::ContextMap;
use autobridge_core::{load_context, search_context, search_context_iterative, search_context_path};
use autobridge_core::BridgeSettings;
use autobridge_integrations::cache::{CacheSettings, CACHE_INTEGRATION};
use autobridge_integrations::{
    CacheStore, ConfigSource, IntegrationConfig, IntegrationConfigResolver, OrchestratorEndpoint,
    RedisCache,
};
use serde_json::Value;

/// Collaborators bound to a capability bundle.
///
/// A [`crate::CapabilitySupervisor`] swaps whole `Bindings` when its
/// settings file changes; an individual binding is never mutated in place.
pub struct Bindings {
    settings: BridgeSettings,
    config: Arc<dyn ConfigSource>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl Bindings {
    /// Resolve integration configs through the orchestrator described by
    /// `settings`, and use the Redis cache those configs point at.
    pub fn from_settings(settings: BridgeSettings) -> Self {
        let resolver = IntegrationConfigResolver::new(settings.clone());
        Self {
            settings,
            config: Arc::new(resolver),
            cache: None,
        }
    }

    /// Replace the integration config source (offline runs, tests).
    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config = source;
        self
    }

    /// Use `cache` instead of connecting to the configured Redis.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn config_source(&self) -> &dyn ConfigSource {
        self.config.as_ref()
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bindings")
            .field("settings", &self.settings)
            .field("cache_override", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Execution context plus bound collaborators.
///
/// Cheap to clone: both halves are reference counted.
#[derive(Debug, Clone)]
pub struct Capabilities {
    context: Arc<Value>,
    bindings: Arc<Bindings>,
}

impl Capabilities {
    pub fn new(context: Value, bindings: Arc<Bindings>) -> Self {
        Self {
            context: Arc::new(context),
            bindings,
        }
    }

    /// Capabilities for a standalone automation process: settings from the
    /// environment, context from stdin.
    pub fn bootstrap() -> Self {
        let bindings = Bindings::from_settings(BridgeSettings::from_env());
        Self::new(load_context(), Arc::new(bindings))
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    /// The top-level context mapping. Loaded contexts are always mappings;
    /// anything else reads as empty.
    pub fn context_map(&self) -> ContextMap {
        self.context.as_object().cloned().unwrap_or_default()
    }

    /// Top-level context field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// First value stored under `key` anywhere in the context.
    pub fn search(&self, key: &str) -> Option<&Value> {
        search_context(&self.context, key)
    }

    /// Like [`Capabilities::search`] without recursion, for deep documents.
    pub fn search_iterative(&self, key: &str) -> Option<&Value> {
        search_context_iterative(&self.context, key)
    }

    /// Value at a dot-separated path such as `"scan.target.url"`.
    pub fn search_path(&self, path: &str) -> Option<&Value> {
        search_context_path(&self.context, path)
    }

    pub fn bindings(&self) -> &Arc<Bindings> {
        &self.bindings
    }

    /// Same context, new collaborators.
    pub fn rebind(&self, bindings: Arc<Bindings>) -> Self {
        Self {
            context: Arc::clone(&self.context),
            bindings,
        }
    }

    pub fn orchestrator(&self) -> OrchestratorEndpoint {
        autobridge_integrations::get_orchestrator_config(self.bindings.settings())
    }

    /// Resolve the named integration's config, or `None`.
    pub async fn integration_config(&self, name: &str) -> Option<IntegrationConfig> {
        self.bindings.config_source().integration_config(name).await
    }

    /// The shared cache.
    ///
    /// Without an override this resolves the `"redis"` config and builds a
    /// client for it. `None` only when the client cannot be built at all;
    /// an unreachable server surfaces on the first command instead.
    pub async fn cache(&self) -> Option<Arc<dyn CacheStore>> {
        if let Some(cache) = &self.bindings.cache {
            return Some(Arc::clone(cache));
        }

        let config = self.integration_config(CACHE_INTEGRATION).await;
        let settings = CacheSettings::from_config(config.as_ref());
        match RedisCache::new(&settings, self.bindings.settings().cache_timeout()) {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                tracing::warn!(host = %settings.host, port = settings.port, error = %e, "Failed to build cache client");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use autobridge_integrations::{MemoryCache, StaticConfigSource};
    use serde_json::json;

    use super::*;

    fn offline_bindings() -> Bindings {
        let config: IntegrationConfig =
            serde_json::from_value(json!({"apikey": "K"})).expect("mapping");
        Bindings::from_settings(BridgeSettings::default())
            .with_config_source(Arc::new(StaticConfigSource::new().with("virustotal", config)))
    }

    #[test]
    fn searches_delegate_to_context() {
        let caps = Capabilities::new(
            json!({"scan": {"target": {"url": "https://example.com"}}}),
            Arc::new(offline_bindings()),
        );

        assert_eq!(caps.search("url"), Some(&json!("https://example.com")));
        assert_eq!(caps.search_iterative("url"), Some(&json!("https://example.com")));
        assert_eq!(
            caps.search_path("scan.target.url"),
            Some(&json!("https://example.com"))
        );
        assert!(caps.get("url").is_none());
        assert!(caps.get("scan").is_some());
    }

    #[test]
    fn non_mapping_context_reads_as_empty_map() {
        let caps = Capabilities::new(json!([1, 2]), Arc::new(offline_bindings()));
        assert!(caps.context_map().is_empty());
    }

    #[test]
    fn rebind_keeps_context() {
        let caps = Capabilities::new(json!({"clientname": "acme"}), Arc::new(offline_bindings()));
        let settings = BridgeSettings {
            default_url: "http://orchestrator.internal:9000".into(),
            config_paths: Vec::new(),
            ..BridgeSettings::default()
        };

        let rebound = caps.rebind(Arc::new(Bindings::from_settings(settings)));
        assert_eq!(rebound.get("clientname"), Some(&json!("acme")));
        assert_eq!(rebound.orchestrator().url, "http://orchestrator.internal:9000");
        assert!(Arc::ptr_eq(&caps.context, &rebound.context));
    }

    #[tokio::test]
    async fn integration_config_comes_from_bound_source() {
        let caps = Capabilities::new(json!({}), Arc::new(offline_bindings()));
        let config = caps.integration_config("virustotal").await.expect("bound");
        assert_eq!(config.str_field("apikey"), Some("K"));
        assert!(caps.integration_config("redis").await.is_none());
    }

    #[tokio::test]
    async fn cache_override_is_used() {
        let memory = Arc::new(MemoryCache::new());
        let bindings = offline_bindings().with_cache(memory.clone());
        let caps = Capabilities::new(json!({}), Arc::new(bindings));

        let cache = caps.cache().await.expect("override");
        cache.set("k", "v").await.expect("set");
        assert_eq!(memory.get("k").await.expect("get"), Some("v".into()));
    }

    #[tokio::test]
    async fn cache_defaults_to_redis_client() {
        let caps = Capabilities::new(json!({}), Arc::new(offline_bindings()));
        assert!(caps.cache().await.is_some());
    }
}
