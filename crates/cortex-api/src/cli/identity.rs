//! Identity CLI commands: create, update, show, history, list, delete.
//!
//! Identity content is supplied as JSON files. Every update goes through
//! `IdentityService::update`, which writes a new version and snapshot.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use cortex_types::error::IdentityError;
use cortex_types::identity::{CreateIdentityRequest, Identity, IdentityId, UpdateIdentityRequest};

use super::{format_timestamp, parse_id, print_json, read_json_file, truncate};
use crate::state::AppState;

/// Identity subcommands.
#[derive(Subcommand)]
pub enum IdentityCommand {
    /// Create an identity from a JSON file.
    Create {
        /// Path to a JSON file with name, values, invariants, style_constraints, risk_posture.
        file: PathBuf,
    },

    /// Apply a JSON update as a new version.
    Update {
        /// Identity ID.
        id: String,

        /// Path to a JSON file with the fields to change.
        file: PathBuf,

        /// Change reason (overrides `change_reason` in the file).
        #[arg(long, short)]
        reason: Option<String>,
    },

    /// Show the current identity, or a past version.
    Show {
        /// Identity ID.
        id: String,

        /// Version number to show instead of the current one.
        #[arg(long)]
        version: Option<u32>,
    },

    /// Show version history.
    History {
        /// Identity ID.
        id: String,
    },

    /// List all identities.
    List,

    /// Delete an identity and its version history.
    Delete {
        /// Identity ID.
        id: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

/// Handle an identity subcommand.
pub async fn handle_identity_command(
    cmd: IdentityCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        IdentityCommand::Create { file } => create_identity(state, &file, json).await,
        IdentityCommand::Update { id, file, reason } => {
            update_identity(state, &id, &file, reason, json).await
        }
        IdentityCommand::Show { id, version } => show_identity(state, &id, version, json).await,
        IdentityCommand::History { id } => identity_history(state, &id, json).await,
        IdentityCommand::List => list_identities(state, json).await,
        IdentityCommand::Delete { id, force } => delete_identity(state, &id, force, json).await,
    }
}

async fn create_identity(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let request: CreateIdentityRequest = read_json_file(file).await?;
    let identity = state.identity_service.create(request).await?;

    if json {
        return print_json(&identity);
    }

    println!();
    println!(
        "  {} Identity created: {} (version {})",
        style("✓").green().bold(),
        style(&identity.name).cyan(),
        identity.version
    );
    println!("  {}  {}", style("ID:").bold(), style(identity.id.to_string()).dim());
    println!();
    Ok(())
}

/// Build the update request from the file, letting `--reason` fill or
/// replace `change_reason`.
async fn load_update_request(file: &Path, reason: Option<String>) -> Result<UpdateIdentityRequest> {
    let mut raw: serde_json::Value = read_json_file(file).await?;
    if let Some(reason) = reason {
        let object = raw
            .as_object_mut()
            .with_context(|| format!("{} must contain a JSON object", file.display()))?;
        object.insert("change_reason".to_string(), serde_json::Value::String(reason));
    }
    serde_json::from_value(raw)
        .with_context(|| format!("Invalid identity update in {}", file.display()))
}

async fn update_identity(
    state: &AppState,
    id: &str,
    file: &Path,
    reason: Option<String>,
    json: bool,
) -> Result<()> {
    let id: IdentityId = parse_id(id, "identity")?;
    let request = load_update_request(file, reason).await?;
    let identity = state.identity_service.update(&id, request).await?;

    if json {
        return print_json(&identity);
    }

    println!(
        "  {} '{}' updated to version {}",
        style("✓").green().bold(),
        style(&identity.name).cyan(),
        style(identity.version).bold()
    );
    Ok(())
}

async fn show_identity(state: &AppState, id: &str, version: Option<u32>, json: bool) -> Result<()> {
    let id: IdentityId = parse_id(id, "identity")?;

    let identity = match version {
        Some(v) => {
            state
                .identity_service
                .get_version(&id, v)
                .await?
                .ok_or_else(|| IdentityError::VersionNotFound {
                    id: id.to_string(),
                    version: v,
                })?
                .snapshot
        }
        None => state
            .identity_service
            .load(&id)
            .await?
            .with_context(|| format!("Identity '{id}' not found"))?,
    };

    if json {
        return print_json(&identity);
    }

    print_identity(&identity);
    Ok(())
}

fn print_identity(identity: &Identity) {
    println!();
    println!(
        "  {} {}",
        style(&identity.name).cyan().bold(),
        style(format!("v{}", identity.version)).dim()
    );
    if let Some(description) = &identity.description {
        println!("  {}", style(description).dim());
    }
    println!();

    println!("  {}", style("── Details ──").dim());
    println!("  {}          {}", style("ID:").bold(), style(identity.id.to_string()).dim());
    println!("  {} {}", style("Risk posture:").bold(), identity.risk_posture);
    println!("  {}     {}", style("Created:").bold(), format_timestamp(&identity.created_at));
    println!("  {}     {}", style("Updated:").bold(), format_timestamp(&identity.updated_at));
    println!();

    if !identity.values.is_empty() {
        println!("  {}", style("── Values ──").dim());
        for value in &identity.values {
            println!(
                "  {} {} {} {}",
                style("•").dim(),
                style(&value.name).bold(),
                style(format!("(priority {})", value.priority)).dim(),
                value.description
            );
        }
        println!();
    }

    if !identity.invariants.is_empty() {
        println!("  {}", style("── Invariants ──").dim());
        for invariant in &identity.invariants {
            println!("  {} {}", style("•").dim(), style(&invariant.rule).bold());
            println!("    {}", style(&invariant.rationale).dim());
        }
        println!();
    }

    if !identity.style_constraints.is_empty() {
        println!("  {}", style("── Style ──").dim());
        for constraint in &identity.style_constraints {
            println!(
                "  {} {}: {}",
                style("•").dim(),
                style(&constraint.aspect).bold(),
                constraint.constraint
            );
        }
        println!();
    }
}

async fn identity_history(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id: IdentityId = parse_id(id, "identity")?;
    let versions = state.identity_service.get_version_history(&id).await?;

    if json {
        return print_json(&versions);
    }

    if versions.is_empty() {
        println!("  No versions found for identity '{id}'.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Version").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Reason").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);

    for version in &versions {
        table.add_row(vec![
            Cell::new(version.version).fg(Color::Cyan),
            Cell::new(&version.snapshot.name),
            Cell::new(truncate(&version.change_reason, 60)),
            Cell::new(format_timestamp(&version.created_at)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn list_identities(state: &AppState, json: bool) -> Result<()> {
    let identities = state.identity_service.list().await?;

    if json {
        return print_json(&identities);
    }

    if identities.is_empty() {
        println!();
        println!(
            "  {} No identities found. Create one with: {}",
            style("i").blue().bold(),
            style("cortex identity create <file.json>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Version").fg(Color::White),
        Cell::new("Risk").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for identity in &identities {
        table.add_row(vec![
            Cell::new(identity.id.to_string()).fg(Color::DarkGrey),
            Cell::new(&identity.name).fg(Color::Cyan),
            Cell::new(identity.version),
            Cell::new(identity.risk_posture.to_string()),
            Cell::new(format_timestamp(&identity.updated_at)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn delete_identity(state: &AppState, id: &str, force: bool, json: bool) -> Result<()> {
    let id: IdentityId = parse_id(id, "identity")?;
    let identity = state
        .identity_service
        .load(&id)
        .await?
        .with_context(|| format!("Identity '{id}' not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently delete identity '{}' and all {} versions?",
                style(&identity.name).red().bold(),
                identity.version
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.identity_service.delete(&id).await?;

    if json {
        println!("{}", serde_json::json!({"deleted": true, "id": id.to_string()}));
    } else {
        println!(
            "  {} Identity '{}' deleted.",
            style("✓").red().bold(),
            identity.name
        );
    }
    Ok(())
}
