//! System status dashboard command.

use anyhow::Result;
use console::style;

use cortex_core::service::memory::is_expired;
use cortex_types::failure::{PatternQuery, Severity};
use cortex_types::memory::{MemoryQuery, MemoryType};

use crate::state::AppState;

/// Display system status dashboard.
///
/// Shows identity, memory, and failure-pattern counts plus the active thresholds.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let identities = state.identity_service.list().await?;
    let memories = state.memory_service.retrieve(MemoryQuery::default()).await?;
    let patterns = state.failure_service.retrieve(PatternQuery::default()).await?;

    let memory_config = state.memory_service.config();
    let count_type = |t: MemoryType| {
        memories
            .memories
            .iter()
            .filter(|m| m.memory.memory_type == t)
            .count()
    };
    let lessons = count_type(MemoryType::Lesson);
    let preferences = count_type(MemoryType::Preference);
    let warnings = count_type(MemoryType::Warning);
    let expired = memories
        .memories
        .iter()
        .filter(|m| is_expired(&m.memory, memory_config))
        .count();

    let active = patterns.patterns.iter().filter(|p| p.pattern.active).count();
    let hard = patterns
        .patterns
        .iter()
        .filter(|p| p.pattern.active && p.pattern.severity == Severity::Hard)
        .count();

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "identities": identities.len(),
            "memories": {
                "total": memories.total_count,
                "lessons": lessons,
                "preferences": preferences,
                "warnings": warnings,
                "expired": expired,
            },
            "failure_patterns": {
                "total": patterns.total_count,
                "active": active,
                "active_hard": hard,
            },
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  {} Cortex v{}", style("◆").cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!();

    println!("  {}", style("── Identities ──").dim());
    println!("  Total: {}", style(identities.len()).bold());
    println!();

    println!("  {}", style("── Memories ──").dim());
    println!("  Total:       {}", style(memories.total_count).bold());
    println!("  Lessons:     {}", style(lessons).green());
    println!("  Preferences: {}", style(preferences).cyan());
    println!("  Warnings:    {}", style(warnings).yellow());
    if expired > 0 {
        println!(
            "  Expired:     {} {}",
            style(expired).red(),
            style("(run `cortex maintain`)").dim()
        );
    }
    println!();

    println!("  {}", style("── Failure Patterns ──").dim());
    println!("  Total:       {}", style(patterns.total_count).bold());
    println!("  Active:      {}", active);
    println!("  Active hard: {}", style(hard).red());
    println!();

    println!("  {}", style("── Thresholds ──").dim());
    println!(
        "  Duplicate:   {:.2} (memory) / {:.2} (failure)",
        memory_config.duplicate_threshold, state.config.failure.duplicate_threshold
    );
    println!("  Blocking:    {:.2}", state.config.failure.blocking_threshold);
    println!(
        "  Decay:       {:.2} every {}h",
        memory_config.decay_rate, memory_config.decay_interval_hours
    );
    println!("  Deletion:    {:.2}", memory_config.deletion_threshold);
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!();

    Ok(())
}
