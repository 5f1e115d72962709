//! Runtime side of the automation bridge.
//!
//! Automations receive their ambient capabilities as one explicit
//! [`Capabilities`] value: the execution context, context search, the
//! integration config resolver and the shared cache. This crate builds
//! that bundle, runs automations against it, keeps it fresh in long-lived
//! workers, and launches automation processes on behalf of an
//! orchestrator.

pub mod automation;
pub mod capabilities;
pub mod dispatch;
pub mod plugin;
pub mod supervisor;

pub use automation::{execute, run_once, Automation};
pub use capabilities::{Bindings, Capabilities};
pub use supervisor::{CapabilitySupervisor, ReloadOutcome};
