//! Bundled automations.
//!
//! Each automation is usable in-process through [`registry`] (the warm
//! worker) and as a one-shot binary under `src/bin/`.

pub mod example_plugin;
pub mod url_scanner;
pub mod user_context;

use std::sync::Arc;

use autobridge_runtime::Automation;

pub use example_plugin::ExamplePlugin;
pub use url_scanner::UrlScanner;
pub use user_context::{UserContext, UserSource};

/// Default tracing directive for the automation binaries.
pub const DEFAULT_LOG_DIRECTIVE: &str = "autobridge=info";

/// Every bundled automation, keyed by [`Automation::name`].
pub fn registry() -> Vec<Arc<dyn Automation>> {
    vec![
        Arc::new(UrlScanner::new()),
        Arc::new(UserContext::new(UserSource::Tenable)),
        Arc::new(UserContext::new(UserSource::Qualys)),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
