//! Distilled memory CLI commands: record, list, show, reinforce, merge, decay,
//! cleanup, plus the combined maintenance pass.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use cortex_core::dedup::Recorded;
use cortex_core::service::memory::is_expired;
use cortex_types::memory::{DistilledMemory, MemoryId, MemoryQuery, MemoryType, RecordMemoryRequest};

use super::{format_timestamp, parse_id, print_json, truncate};
use crate::state::AppState;

/// Distilled memory subcommands.
#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Record a memory; reinforces a near-duplicate instead when one exists.
    Record {
        /// The statement to remember.
        content: String,

        /// Memory type (lesson, preference, warning).
        #[arg(long = "type", short = 't', default_value = "lesson")]
        memory_type: String,

        /// Initial confidence in [0, 1] (default from config).
        #[arg(long)]
        confidence: Option<f64>,

        /// Tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Where the memory came from.
        #[arg(long)]
        source: Option<String>,
    },

    /// List memories, optionally ranked against a query.
    #[command(alias = "ls")]
    List {
        /// Filter by memory type.
        #[arg(long = "type", short = 't')]
        memory_type: Option<String>,

        /// Required tag (repeatable, all must match).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Minimum confidence.
        #[arg(long)]
        min_confidence: Option<f64>,

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

    /// Show one memory.
    Show {
        /// Memory ID.
        id: String,
    },

    /// Reinforce a memory (confidence boost, freshness reset).
    Reinforce {
        /// Memory ID.
        id: String,
    },

    /// Merge one memory into another and delete it.
    Merge {
        /// Memory ID to keep.
        keep: String,

        /// Memory ID to fold in and delete.
        remove: String,
    },

    /// Apply time-based decay to every memory.
    Decay,

    /// Delete expired memories.
    Cleanup {
        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

/// Handle a memory subcommand.
pub async fn handle_memory_command(cmd: MemoryCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        MemoryCommand::Record {
            content,
            memory_type,
            confidence,
            tags,
            source,
        } => {
            let memory_type = parse_memory_type(&memory_type)?;
            let request = RecordMemoryRequest {
                memory_type,
                content,
                confidence,
                tags,
                source_context: source,
            };
            record_memory(state, request, json).await
        }
        MemoryCommand::List {
            memory_type,
            tags,
            min_confidence,
            query,
            threshold,
            limit,
        } => {
            let query = MemoryQuery {
                memory_type: memory_type.as_deref().map(parse_memory_type).transpose()?,
                tags,
                min_confidence,
                query,
                similarity_threshold: threshold,
                limit,
            };
            list_memories(state, query, json).await
        }
        MemoryCommand::Show { id } => show_memory(state, &id, json).await,
        MemoryCommand::Reinforce { id } => reinforce_memory(state, &id, json).await,
        MemoryCommand::Merge { keep, remove } => merge_memories(state, &keep, &remove, json).await,
        MemoryCommand::Decay => apply_decay(state, json).await,
        MemoryCommand::Cleanup { force } => cleanup_memories(state, force, json).await,
    }
}

fn parse_memory_type(raw: &str) -> Result<MemoryType> {
    raw.parse::<MemoryType>().map_err(|e| anyhow::anyhow!(e))
}

async fn record_memory(state: &AppState, request: RecordMemoryRequest, json: bool) -> Result<()> {
    let recorded = state.memory_service.record(request).await?;

    if json {
        return print_json(&recorded);
    }

    let memory = recorded.entity();
    match &recorded {
        Recorded::Created(_) => println!(
            "  {} Recorded new {} {}",
            style("✓").green().bold(),
            memory.memory_type,
            style(memory.id.to_string()).dim()
        ),
        Recorded::Reinforced(_) => println!(
            "  {} Reinforced existing {} {} (confidence {:.2}, x{})",
            style("↑").cyan().bold(),
            memory.memory_type,
            style(memory.id.to_string()).dim(),
            memory.confidence,
            memory.reinforcement_count
        ),
    }
    Ok(())
}

async fn list_memories(state: &AppState, query: MemoryQuery, json: bool) -> Result<()> {
    let retrieval = state.memory_service.retrieve(query).await?;

    if json {
        return print_json(&retrieval);
    }

    if retrieval.memories.is_empty() {
        println!();
        println!(
            "  {} No memories found. Record one with: {}",
            style("i").blue().bold(),
            style("cortex memory record \"...\"").yellow()
        );
        println!();
        return Ok(());
    }

    let config = state.memory_service.config();
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Conf").fg(Color::White),
        Cell::new("Decay").fg(Color::White),
        Cell::new("Score").fg(Color::White),
        Cell::new("Tags").fg(Color::White),
    ]);

    for scored in &retrieval.memories {
        let memory = &scored.memory;
        let decay_cell = if is_expired(memory, config) {
            Cell::new(format!("{:.2}", memory.decay_factor)).fg(Color::Red)
        } else {
            Cell::new(format!("{:.2}", memory.decay_factor))
        };
        table.add_row(vec![
            Cell::new(memory.id.to_string()).fg(Color::DarkGrey),
            type_cell(memory.memory_type),
            Cell::new(truncate(&memory.content, 60)),
            Cell::new(format!("{:.2}", memory.confidence)),
            decay_cell,
            Cell::new(
                scored
                    .score
                    .map(|s| format!("{s:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(memory.tags.join(", ")).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} of {} memor{}",
        style(retrieval.memories.len()).bold(),
        retrieval.total_count,
        if retrieval.total_count == 1 { "y" } else { "ies" }
    );
    println!();
    Ok(())
}

fn type_cell(memory_type: MemoryType) -> Cell {
    let cell = Cell::new(memory_type.to_string());
    match memory_type {
        MemoryType::Lesson => cell.fg(Color::Green),
        MemoryType::Preference => cell.fg(Color::Cyan),
        MemoryType::Warning => cell.fg(Color::Yellow),
    }
}

async fn show_memory(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id: MemoryId = parse_id(id, "memory")?;
    let memory = state
        .memory_service
        .get(&id)
        .await?
        .with_context(|| format!("Memory '{id}' not found"))?;

    if json {
        return print_json(&memory);
    }

    print_memory(state, &memory);
    Ok(())
}

fn print_memory(state: &AppState, memory: &DistilledMemory) {
    println!();
    println!(
        "  {} {}",
        style(memory.memory_type.to_string()).cyan().bold(),
        style(memory.id.to_string()).dim()
    );
    println!("  {}", memory.content);
    println!();
    println!("  {}", style("── Strength ──").dim());
    println!("  {}     {:.2}", style("Confidence:").bold(), memory.confidence);
    println!("  {}   {:.2}", style("Decay factor:").bold(), memory.decay_factor);
    println!("  {}      {:.2}", style("Effective:").bold(), memory.effective_strength());
    println!("  {} {}", style("Reinforcements:").bold(), memory.reinforcement_count);
    if is_expired(memory, state.memory_service.config()) {
        println!("  {}", style("Expired: next cleanup will delete it").red());
    }
    println!();
    println!("  {}", style("── Timestamps ──").dim());
    println!("  {}     {}", style("Created:").bold(), format_timestamp(&memory.created_at));
    println!("  {}  {}", style("Reinforced:").bold(), format_timestamp(&memory.last_reinforced_at));
    println!("  {}     {}", style("Decayed:").bold(), format_timestamp(&memory.last_decay_at));
    if !memory.tags.is_empty() || memory.source_context.is_some() {
        println!();
        println!("  {}", style("── Context ──").dim());
        if !memory.tags.is_empty() {
            println!("  {}   {}", style("Tags:").bold(), memory.tags.join(", "));
        }
        if let Some(source) = &memory.source_context {
            println!("  {} {}", style("Source:").bold(), source);
        }
    }
    println!();
}

async fn reinforce_memory(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id: MemoryId = parse_id(id, "memory")?;
    let outcome = state.memory_service.reinforce(&id).await?;

    if json {
        return print_json(&outcome);
    }

    println!(
        "  {} Confidence {:.2} → {:.2} (reinforced {} times)",
        style("↑").cyan().bold(),
        outcome.previous_confidence,
        outcome.new_confidence,
        outcome.memory.reinforcement_count
    );
    Ok(())
}

async fn merge_memories(state: &AppState, keep: &str, remove: &str, json: bool) -> Result<()> {
    let keep: MemoryId = parse_id(keep, "memory")?;
    let remove: MemoryId = parse_id(remove, "memory")?;
    let outcome = state.memory_service.merge(&keep, &remove).await?;

    if json {
        return print_json(&outcome);
    }

    println!(
        "  {} Merged {} into {} (similarity {:.2}, confidence {:.2})",
        style("✓").green().bold(),
        style(outcome.removed_id.to_string()).dim(),
        style(outcome.memory.id.to_string()).cyan(),
        outcome.similarity,
        outcome.memory.confidence
    );
    Ok(())
}

async fn apply_decay(state: &AppState, json: bool) -> Result<()> {
    let decayed = state.memory_service.apply_decay().await?;

    if json {
        println!("{}", serde_json::json!({ "decayed": decayed }));
    } else {
        println!("  {} Decayed {} memories.", style("✓").green().bold(), decayed);
    }
    Ok(())
}

async fn cleanup_memories(state: &AppState, force: bool, json: bool) -> Result<()> {
    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt("Permanently delete all expired memories?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let deleted = state.memory_service.cleanup().await?;

    if json {
        return print_json(&serde_json::json!({ "deleted": deleted }));
    }

    println!(
        "  {} Deleted {} expired memories.",
        style("✓").red().bold(),
        deleted.len()
    );
    Ok(())
}

/// Run decay followed by cleanup.
pub async fn maintain(state: &AppState, json: bool) -> Result<()> {
    let report = state.memory_service.maintain().await?;

    if json {
        return print_json(&report);
    }

    println!();
    println!("  {} Maintenance complete", style("✓").green().bold());
    println!("  {}  {}", style("Decayed:").bold(), report.decayed);
    println!("  {}  {}", style("Deleted:").bold(), report.deleted.len());
    println!();
    Ok(())
}
