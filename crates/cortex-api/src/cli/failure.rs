//! Failure pattern CLI commands: record, check, list, show, activate,
//! deactivate, delete.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use cortex_core::dedup::Recorded;
use cortex_types::failure::{
    BlockingCheck, FailurePattern, PatternId, PatternQuery, RecordFailureRequest, Severity,
};

use super::{format_timestamp, parse_id, print_json, truncate};
use crate::state::AppState;

/// Failure pattern subcommands.
#[derive(Subcommand)]
pub enum FailureCommand {
    /// Record a failure; folds into a near-duplicate pattern when one exists.
    Record {
        /// Text of the failing request.
        pattern: String,

        /// Situation the failure occurred in.
        #[arg(long)]
        context: String,

        /// Why it failed.
        #[arg(long)]
        reason: String,

        /// Severity (hard blocks, soft warns).
        #[arg(long, default_value = "soft")]
        severity: String,

        /// Tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Check text against active patterns.
    Check {
        /// Text to check.
        text: String,

        /// Optional context for the request.
        #[arg(long)]
        context: Option<String>,
    },

    /// List patterns, optionally ranked against a query.
    #[command(alias = "ls")]
    List {
        /// Filter by severity.
        #[arg(long)]
        severity: Option<String>,

        /// Filter by active flag (true or false).
        #[arg(long)]
        active: Option<bool>,

        /// Required tag (repeatable, all must match).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Minimum occurrence count.
        #[arg(long)]
        min_occurrences: Option<u32>,

        /// Rank by similarity to this text.
        #[arg(long, short)]
        query: Option<String>,

        /// Similarity threshold for --query.
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum number of results.
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Show one pattern.
    Show {
        /// Pattern ID.
        id: String,
    },

    /// Re-enable a pattern for matching.
    Activate {
        /// Pattern ID.
        id: String,
    },

    /// Exclude a pattern from matching without deleting it.
    Deactivate {
        /// Pattern ID.
        id: String,
    },

    /// Delete a pattern.
    Delete {
        /// Pattern ID.
        id: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

/// Handle a failure subcommand.
pub async fn handle_failure_command(
    cmd: FailureCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        FailureCommand::Record {
            pattern,
            context,
            reason,
            severity,
            tags,
        } => {
            let request = RecordFailureRequest {
                pattern,
                context,
                severity: parse_severity(&severity)?,
                reason,
                tags,
            };
            record_failure(state, request, json).await
        }
        FailureCommand::Check { text, context } => {
            check_failure(state, &text, context.as_deref(), json).await
        }
        FailureCommand::List {
            severity,
            active,
            tags,
            min_occurrences,
            query,
            threshold,
            limit,
        } => {
            let query = PatternQuery {
                severity: severity.as_deref().map(parse_severity).transpose()?,
                tags,
                active,
                min_occurrences,
                query,
                similarity_threshold: threshold,
                limit,
            };
            list_failures(state, query, json).await
        }
        FailureCommand::Show { id } => show_failure(state, &id, json).await,
        FailureCommand::Activate { id } => set_active(state, &id, true, json).await,
        FailureCommand::Deactivate { id } => set_active(state, &id, false, json).await,
        FailureCommand::Delete { id, force } => delete_failure(state, &id, force, json).await,
    }
}

fn parse_severity(raw: &str) -> Result<Severity> {
    raw.parse::<Severity>().map_err(|e| anyhow::anyhow!(e))
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Hard => Cell::new("■ hard").fg(Color::Red),
        Severity::Soft => Cell::new("□ soft").fg(Color::Yellow),
    }
}

async fn record_failure(state: &AppState, request: RecordFailureRequest, json: bool) -> Result<()> {
    let recorded = state.failure_service.record(request).await?;

    if json {
        return print_json(&recorded);
    }

    let pattern = recorded.entity();
    match &recorded {
        Recorded::Created(_) => println!(
            "  {} Recorded new {} pattern {}",
            style("✓").green().bold(),
            pattern.severity,
            style(pattern.id.to_string()).dim()
        ),
        Recorded::Reinforced(_) => println!(
            "  {} Matched existing {} pattern {} (seen {} times)",
            style("↑").yellow().bold(),
            pattern.severity,
            style(pattern.id.to_string()).dim(),
            pattern.occurrence_count
        ),
    }
    Ok(())
}

async fn check_failure(
    state: &AppState,
    text: &str,
    context: Option<&str>,
    json: bool,
) -> Result<()> {
    let check = state.failure_service.check_blocking(text, context).await?;

    if json {
        return print_json(&check);
    }

    print_check(&check);
    Ok(())
}

fn print_check(check: &BlockingCheck) {
    println!();
    match check.severity {
        Some(Severity::Hard) => println!("  {} Blocked", style("✗").red().bold()),
        Some(Severity::Soft) => println!("  {} Allowed with warnings", style("!").yellow().bold()),
        None => println!("  {} No matching patterns", style("✓").green().bold()),
    }

    for m in &check.matches {
        println!(
            "    {} {:.2}  {}  {}",
            style(m.pattern.severity.to_string()).bold(),
            m.score,
            truncate(&m.pattern.pattern, 50),
            style(format!("({})", m.pattern.reason)).dim()
        );
    }
    println!();
}

async fn list_failures(state: &AppState, query: PatternQuery, json: bool) -> Result<()> {
    let retrieval = state.failure_service.retrieve(query).await?;

    if json {
        return print_json(&retrieval);
    }

    if retrieval.patterns.is_empty() {
        println!();
        println!("  {} No failure patterns found.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Severity").fg(Color::White),
        Cell::new("Pattern").fg(Color::White),
        Cell::new("Seen").fg(Color::White),
        Cell::new("Active").fg(Color::White),
        Cell::new("Score").fg(Color::White),
        Cell::new("Last Seen").fg(Color::White),
    ]);

    for scored in &retrieval.patterns {
        let pattern = &scored.pattern;
        let active_cell = if pattern.active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(pattern.id.to_string()).fg(Color::DarkGrey),
            severity_cell(pattern.severity),
            Cell::new(truncate(&pattern.pattern, 50)),
            Cell::new(pattern.occurrence_count),
            active_cell,
            Cell::new(
                scored
                    .score
                    .map(|s| format!("{s:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(format_timestamp(&pattern.last_occurred_at)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} of {} pattern{}",
        style(retrieval.patterns.len()).bold(),
        retrieval.total_count,
        if retrieval.total_count == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

async fn show_failure(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id: PatternId = parse_id(id, "pattern")?;
    let pattern = state
        .failure_service
        .get(&id)
        .await?
        .with_context(|| format!("Failure pattern '{id}' not found"))?;

    if json {
        return print_json(&pattern);
    }

    print_pattern(&pattern);
    Ok(())
}

fn print_pattern(pattern: &FailurePattern) {
    println!();
    println!(
        "  {} {}",
        style(pattern.severity.to_string()).red().bold(),
        style(pattern.id.to_string()).dim()
    );
    println!("  {}", pattern.pattern);
    println!();
    println!("  {}  {}", style("Context:").bold(), pattern.context);
    println!("  {}   {}", style("Reason:").bold(), pattern.reason);
    println!("  {}     {}", style("Seen:").bold(), pattern.occurrence_count);
    println!(
        "  {}   {}",
        style("Active:").bold(),
        if pattern.active { "yes" } else { "no" }
    );
    if !pattern.tags.is_empty() {
        println!("  {}     {}", style("Tags:").bold(), pattern.tags.join(", "));
    }
    println!("  {}  {}", style("Created:").bold(), format_timestamp(&pattern.created_at));
    println!("  {} {}", style("Last seen:").bold(), format_timestamp(&pattern.last_occurred_at));
    println!();
}

async fn set_active(state: &AppState, id: &str, active: bool, json: bool) -> Result<()> {
    let id: PatternId = parse_id(id, "pattern")?;
    let pattern = if active {
        state.failure_service.activate(&id).await?
    } else {
        state.failure_service.deactivate(&id).await?
    };

    if json {
        return print_json(&pattern);
    }

    println!(
        "  {} Pattern {} {}.",
        style("✓").green().bold(),
        style(pattern.id.to_string()).dim(),
        if active { "activated" } else { "deactivated" }
    );
    Ok(())
}

async fn delete_failure(state: &AppState, id: &str, force: bool, json: bool) -> Result<()> {
    let id: PatternId = parse_id(id, "pattern")?;
    let pattern = state
        .failure_service
        .get(&id)
        .await?
        .with_context(|| format!("Failure pattern '{id}' not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently delete pattern '{}'?",
                style(truncate(&pattern.pattern, 40)).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.failure_service.delete(&id).await?;

    if json {
        println!("{}", serde_json::json!({"deleted": true, "id": id.to_string()}));
    } else {
        println!("  {} Pattern deleted.", style("✓").red().bold());
    }
    Ok(())
}
