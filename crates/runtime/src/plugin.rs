//! Plugin-style automation surface.
//!
//! A plugin binary is invoked as `<bin> info`, `<bin> execute '<json>'` or
//! `<bin> cleanup`. `info` and `execute` print one pretty JSON document on
//! stdout; everything else, errors included, goes to stderr.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors from a plugin invocation.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{0}")]
    Usage(#[from] clap::Error),

    #[error("No parameters provided for execute command")]
    MissingParams,

    #[error("Invalid JSON parameters: {0}")]
    InvalidParams(serde_json::Error),

    #[error("Plugin execution failed: {0}")]
    Execution(String),

    #[error("failed to write plugin output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("failed to write plugin output: {0}")]
    Io(#[from] io::Error),
}

/// Capability metadata printed by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub supported_operations: Vec<String>,
}

pub trait Plugin {
    fn info(&self) -> PluginInfo;

    /// Run with the decoded parameters and return the result document.
    fn execute(&self, params: Value) -> Result<Value, PluginError>;

    fn cleanup(&self) {}
}

#[derive(Debug, Parser)]
#[command(about = "Automation plugin")]
struct PluginCli {
    #[command(subcommand)]
    command: PluginCommand,
}

#[derive(Debug, Subcommand)]
enum PluginCommand {
    /// Print plugin metadata
    Info,
    /// Execute with JSON-encoded parameters
    Execute {
        /// Parameters as a JSON document
        params: Option<String>,
    },
    /// Release plugin resources
    Cleanup,
}

/// Process entry for a plugin binary.
pub fn run_plugin<I, T>(plugin: &dyn Plugin, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run_plugin_with(plugin, args, io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(PluginError::Usage(e)) => {
            let _ = e.print();
            if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!(plugin = %plugin.info().name, error = %e, "Plugin invocation failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// [`run_plugin`] writing its result document to `out`.
pub fn run_plugin_with<I, T, W>(plugin: &dyn Plugin, args: I, mut out: W) -> Result<(), PluginError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    let cli = PluginCli::try_parse_from(args)?;

    match cli.command {
        PluginCommand::Info => write_document(&mut out, &plugin.info())?,
        PluginCommand::Execute { params } => {
            let raw = params.ok_or(PluginError::MissingParams)?;
            tracing::debug!(raw_input = %raw, "Plugin parameters");
            let params: Value = serde_json::from_str(&raw).map_err(PluginError::InvalidParams)?;
            let result = plugin.execute(params)?;
            write_document(&mut out, &result)?;
        }
        PluginCommand::Cleanup => {
            plugin.cleanup();
            tracing::info!(plugin = %plugin.info().name, "Cleanup completed");
        }
    }
    Ok(())
}

fn write_document<W: Write, T: Serialize + ?Sized>(out: &mut W, doc: &T) -> Result<(), PluginError> {
    serde_json::to_writer_pretty(&mut *out, doc)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
