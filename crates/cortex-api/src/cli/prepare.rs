//! `cortex prepare`: run the pipeline for one request.
//!
//! Prints the identity, memory, and failure views of a successful run, the
//! refusal reason of a blocked run, or the error. Failed runs exit non-zero.

use anyhow::Result;
use clap::Args;
use console::style;

use cortex_types::context::{
    CortexContext, FailureOptions, MemoryItemView, MemoryOptions, PipelineOutcome, PrepareRequest,
};
use cortex_types::identity::IdentityId;

use super::{parse_id, print_json, truncate};
use crate::state::AppState;

#[derive(Args)]
pub struct PrepareArgs {
    /// Identity ID to prepare for.
    pub identity_id: String,

    /// The request text.
    pub query: String,

    /// Optional context for the request.
    #[arg(long)]
    pub context: Option<String>,

    /// Maximum memories per type.
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Minimum memory confidence.
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Memory similarity threshold.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Required memory tag (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Report hard blocks without stopping on them.
    #[arg(long)]
    pub skip_blocking_check: bool,
}

impl PrepareArgs {
    fn into_request(self) -> Result<PrepareRequest> {
        let identity_id: IdentityId = parse_id(&self.identity_id, "identity")?;

        let has_memory_options = self.limit.is_some()
            || self.min_confidence.is_some()
            || self.threshold.is_some()
            || !self.tags.is_empty();
        let memory_options = has_memory_options.then(|| MemoryOptions {
            limit: self.limit,
            min_confidence: self.min_confidence,
            similarity_threshold: self.threshold,
            tags: self.tags,
        });
        let failure_options = self.skip_blocking_check.then_some(FailureOptions {
            skip_blocking_check: true,
        });

        Ok(PrepareRequest {
            identity_id,
            query: self.query,
            context: self.context,
            memory_options,
            failure_options,
        })
    }
}

pub async fn prepare(state: &AppState, args: PrepareArgs, json: bool) -> Result<()> {
    let request = args.into_request()?;
    let outcome = state.pipeline.prepare(request).await;

    if json {
        print_json(&outcome)?;
    } else {
        match &outcome {
            PipelineOutcome::Success { context } => print_context(context),
            PipelineOutcome::Blocked {
                reason,
                matched_patterns,
            } => {
                println!();
                println!("  {} Blocked: {}", style("✗").red().bold(), reason);
                for pattern in matched_patterns {
                    println!(
                        "    {} {}  {}",
                        style(pattern.severity.to_string()).bold(),
                        truncate(&pattern.pattern, 50),
                        style(format!("(seen {} times)", pattern.occurrence_count)).dim()
                    );
                }
                println!();
            }
            PipelineOutcome::Error { .. } => {}
        }
    }

    if let PipelineOutcome::Error { error } = outcome {
        anyhow::bail!("Pipeline failed: {error}");
    }
    Ok(())
}

fn print_context(context: &CortexContext) {
    let identity = &context.identity_view;

    println!();
    println!(
        "  {} {} {}",
        style("✓").green().bold(),
        style(&identity.name).cyan().bold(),
        style(format!("v{} · {}", identity.version, identity.risk_posture)).dim()
    );
    println!();

    if !identity.values.is_empty() {
        println!("  {}", style("── Values ──").dim());
        for value in &identity.values {
            println!("  {} {} ({})", style("•").dim(), style(&value.name).bold(), value.priority);
        }
        println!();
    }

    if !identity.invariants.is_empty() {
        println!("  {}", style("── Invariants ──").dim());
        for invariant in &identity.invariants {
            println!("  {} {}", style("•").dim(), invariant.rule);
        }
        println!();
    }

    print_memory_group("Lessons", &context.memory_view.lessons);
    print_memory_group("Preferences", &context.memory_view.preferences);
    print_memory_group("Warnings", &context.memory_view.warnings);

    let failure = &context.failure_view;
    if !failure.hard_blocks.is_empty() || !failure.soft_blocks.is_empty() {
        println!("  {}", style("── Failure Patterns ──").dim());
        for block in &failure.hard_blocks {
            println!("  {} {} ({})", style("■").red(), block.pattern, block.reason);
        }
        for block in &failure.soft_blocks {
            println!("  {} {} ({})", style("□").yellow(), block.pattern, block.reason);
        }
        println!();
    }
}

fn print_memory_group(title: &str, items: &[MemoryItemView]) {
    if items.is_empty() {
        return;
    }
    println!("  {}", style(format!("── {title} ──")).dim());
    for item in items {
        println!(
            "  {} {} {}",
            style("•").dim(),
            item.content,
            style(format!("{:.2}", item.confidence)).dim()
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(identity_id: String) -> PrepareArgs {
        PrepareArgs {
            identity_id,
            query: "deploy the service".to_string(),
            context: None,
            limit: None,
            min_confidence: None,
            threshold: None,
            tags: Vec::new(),
            skip_blocking_check: false,
        }
    }

    #[test]
    fn test_into_request_omits_unset_options() {
        let id = IdentityId::new();
        let request = args(id.to_string()).into_request().unwrap();
        assert_eq!(request.identity_id, id);
        assert!(request.memory_options.is_none());
        assert!(request.failure_options.is_none());
    }

    #[test]
    fn test_into_request_carries_overrides() {
        let mut args = args(IdentityId::new().to_string());
        args.limit = Some(3);
        args.tags = vec!["deploy".to_string()];
        args.skip_blocking_check = true;

        let request = args.into_request().unwrap();
        let memory = request.memory_options.unwrap();
        assert_eq!(memory.limit, Some(3));
        assert_eq!(memory.tags, vec!["deploy".to_string()]);
        assert!(memory.min_confidence.is_none());
        assert!(request.failure_options.unwrap().skip_blocking_check);
    }

    #[test]
    fn test_into_request_rejects_bad_id() {
        assert!(args("not-a-uuid".to_string()).into_request().is_err());
    }
}
