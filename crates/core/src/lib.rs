//! Core of the automation execution bridge.
//!
//! Everything an automation process needs that does not talk to the
//! network: reading the execution context from stdin, searching it,
//! building and validating result envelopes, bridge settings and
//! stderr-only telemetry.

pub mod context;
pub mod envelope;
pub mod error;
pub mod search;
pub mod settings;
pub mod telemetry;

pub use context::{base_context, load_context, return_context, update_context, ResultChannel};
pub use envelope::{merge_envelope, Envelope, EnvelopeError};
pub use error::BridgeError;
pub use search::{search_context, search_context_iterative, search_context_path};
pub use settings::BridgeSettings;
