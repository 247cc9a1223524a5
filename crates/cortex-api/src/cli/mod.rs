//! CLI command definitions for the `cortex` binary.
//!
//! Uses clap derive macros. Each store gets a noun subcommand with its own
//! verbs (`cortex memory record`, `cortex failure check`), and the pipeline
//! runs through `cortex prepare`.

pub mod failure;
pub mod identity;
pub mod memory;
pub mod prepare;
pub mod status;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use serde::de::DeserializeOwned;

/// Identity, distilled memory, and failure-pattern engine.
#[derive(Parser)]
#[command(name = "cortex", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding cortex.db and config.toml.
    #[arg(long, global = true, env = "CORTEX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage versioned identities (create, update, show, history, list, delete).
    Identity {
        #[command(subcommand)]
        action: identity::IdentityCommand,
    },

    /// Manage distilled memories (record, list, show, reinforce, merge, decay, cleanup).
    #[command(alias = "mem")]
    Memory {
        #[command(subcommand)]
        action: memory::MemoryCommand,
    },

    /// Manage failure patterns (record, check, list, activate, deactivate, delete).
    Failure {
        #[command(subcommand)]
        action: failure::FailureCommand,
    },

    /// Run the pipeline for a request and print the outcome.
    Prepare(prepare::PrepareArgs),

    /// Apply memory decay, then delete expired memories.
    Maintain,

    /// System status dashboard.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse an entity id argument, naming the entity kind on failure.
pub(crate) fn parse_id<T>(raw: &str, kind: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid {kind} id '{raw}': {e}"))
}

/// Read and deserialize a JSON input file.
pub(crate) async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub(crate) fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Shorten `text` to at most `max` characters, marking the cut with "...".
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
