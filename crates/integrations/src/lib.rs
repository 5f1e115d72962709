//! Integration plumbing shared by automations.
//!
//! [`resolver`] turns an integration name into its settings mapping, either
//! from the orchestrator's config endpoint or not at all. The remaining
//! modules are the integrations automations talk to, each configured
//! through the resolver and each reporting failures as values.

pub mod cache;
pub mod config;
pub mod resolver;
pub mod virustotal;

pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use config::IntegrationConfig;
pub use resolver::{
    get_orchestrator_config, ConfigSource, IntegrationConfigResolver, OrchestratorEndpoint,
    StaticConfigSource,
};
pub use virustotal::{ScanReport, ScanService, VirusTotalClient};
