//! Tracing setup for automation and worker processes.
//!
//! stdout belongs to the result envelope, so the subscriber always writes
//! to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"autobridge=info"`).
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init_stderr_tracing(default_directive: &str) {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
