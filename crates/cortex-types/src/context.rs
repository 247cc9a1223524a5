//! Pipeline request, result, and the per-request context bundle.
//!
//! A [`CortexContext`] is built fresh on every pipeline run and owned by the
//! caller that receives it. It is never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::PipelineError;
use crate::failure::{BlockingCheck, FailurePattern, PatternId, Severity};
use crate::identity::{Identity, IdentityId, RiskPosture};
use crate::memory::MemoryRetrieval;

/// Entry point input for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub identity_id: IdentityId,
    pub query: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub memory_options: Option<MemoryOptions>,
    #[serde(default)]
    pub failure_options: Option<FailureOptions>,
}

/// Per-request overrides for memory retrieval. Absent fields fall back to engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryOptions {
    pub limit: Option<usize>,
    pub min_confidence: Option<f64>,
    pub similarity_threshold: Option<f64>,
    /// All-of tag filter applied to every memory type.
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureOptions {
    /// Still run the check and report it, but do not stop on a hard block.
    #[serde(default)]
    pub skip_blocking_check: bool,
}

/// Value projected for the identity view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueView {
    pub name: String,
    pub description: String,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantView {
    pub rule: String,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleView {
    pub aspect: String,
    pub constraint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityView {
    pub name: String,
    pub description: Option<String>,
    pub risk_posture: RiskPosture,
    pub version: u32,
    /// Sorted by descending priority.
    pub values: Vec<ValueView>,
    pub invariants: Vec<InvariantView>,
    pub style: Vec<StyleView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItemView {
    pub content: String,
    pub confidence: f64,
}

/// Retrieved memories grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryView {
    pub lessons: Vec<MemoryItemView>,
    pub preferences: Vec<MemoryItemView>,
    pub warnings: Vec<MemoryItemView>,
}

impl MemoryView {
    pub fn total(&self) -> usize {
        self.lessons.len() + self.preferences.len() + self.warnings.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockView {
    pub pattern_id: PatternId,
    pub pattern: String,
    pub reason: String,
    pub occurrence_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureView {
    pub blocked: bool,
    /// Set only when `blocked` is true.
    pub block_reason: Option<String>,
    pub hard_blocks: Vec<BlockView>,
    pub soft_blocks: Vec<BlockView>,
}

/// Unprojected retrieval results for advanced callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRetrieval {
    pub lessons: MemoryRetrieval,
    pub preferences: MemoryRetrieval,
    pub warnings: MemoryRetrieval,
    pub blocking: BlockingCheck,
}

/// The per-request output of a successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CortexContext {
    pub identity: Identity,
    pub identity_view: IdentityView,
    pub memory_view: MemoryView,
    pub failure_view: FailureView,
    pub raw: RawRetrieval,
    pub prepared_at: DateTime<Utc>,
}

/// The three mutually exclusive outcomes of a pipeline run.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success {
        context: Box<CortexContext>,
    },
    /// Policy refusal: a hard failure pattern matched. Memory was never read.
    Blocked {
        reason: String,
        matched_patterns: Vec<FailurePattern>,
    },
    Error {
        #[serde(serialize_with = "serialize_display")]
        error: PipelineError,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, PipelineOutcome::Blocked { .. })
    }
}

fn serialize_display<S: Serializer>(err: &PipelineError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(err)
}

/// Fallback reason when no hard-blocking pattern carries one.
pub const DEFAULT_BLOCK_REASON: &str = "request matches a known hard failure pattern";

impl BlockView {
    pub fn from_pattern(pattern: &FailurePattern) -> Self {
        Self {
            pattern_id: pattern.id.clone(),
            pattern: pattern.pattern.clone(),
            reason: pattern.reason.clone(),
            occurrence_count: pattern.occurrence_count,
        }
    }
}

impl FailureView {
    /// Project a blocking check into hard/soft block lists.
    pub fn from_check(check: &BlockingCheck) -> Self {
        let hard_blocks: Vec<BlockView> = check
            .hard_matches()
            .map(|m| BlockView::from_pattern(&m.pattern))
            .collect();
        let soft_blocks = check
            .soft_matches()
            .map(|m| BlockView::from_pattern(&m.pattern))
            .collect();
        let block_reason = check.blocked.then(|| block_reason(check));

        Self {
            blocked: check.blocked,
            block_reason,
            hard_blocks,
            soft_blocks,
        }
    }
}

/// Reason of the first hard-blocking pattern, or the generic fallback.
pub fn block_reason(check: &BlockingCheck) -> String {
    check
        .matches
        .iter()
        .find(|m| m.pattern.severity == Severity::Hard && !m.pattern.reason.trim().is_empty())
        .map(|m| m.pattern.reason.clone())
        .unwrap_or_else(|| DEFAULT_BLOCK_REASON.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::PatternMatch;

    fn pattern(severity: Severity, reason: &str, occurrences: u32) -> FailurePattern {
        let now = Utc::now();
        FailurePattern {
            id: PatternId::new(),
            pattern: "rm -rf /".to_string(),
            context: "shell".to_string(),
            severity,
            occurrence_count: occurrences,
            created_at: now,
            last_occurred_at: now,
            reason: reason.to_string(),
            tags: vec![],
            active: true,
        }
    }

    #[test]
    fn test_failure_view_splits_hard_and_soft() {
        let check = BlockingCheck {
            blocked: true,
            severity: Some(Severity::Hard),
            matches: vec![
                PatternMatch { pattern: pattern(Severity::Soft, "slow", 5), score: 0.9 },
                PatternMatch { pattern: pattern(Severity::Hard, "destroys data", 2), score: 0.8 },
            ],
        };
        let view = FailureView::from_check(&check);
        assert!(view.blocked);
        assert_eq!(view.hard_blocks.len(), 1);
        assert_eq!(view.soft_blocks.len(), 1);
        assert_eq!(view.block_reason.as_deref(), Some("destroys data"));
    }

    #[test]
    fn test_block_reason_falls_back_when_blank() {
        let check = BlockingCheck {
            blocked: true,
            severity: Some(Severity::Hard),
            matches: vec![PatternMatch { pattern: pattern(Severity::Hard, "  ", 1), score: 1.0 }],
        };
        assert_eq!(block_reason(&check), DEFAULT_BLOCK_REASON);
    }

    #[test]
    fn test_unblocked_view_has_no_reason() {
        let check = BlockingCheck {
            blocked: false,
            severity: Some(Severity::Soft),
            matches: vec![PatternMatch { pattern: pattern(Severity::Soft, "slow", 1), score: 0.75 }],
        };
        let view = FailureView::from_check(&check);
        assert!(!view.blocked);
        assert!(view.block_reason.is_none());
        assert_eq!(view.soft_blocks.len(), 1);
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = PipelineOutcome::Error {
            error: PipelineError::IdentityNotFound("abc".to_string()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "error");
        assert_eq!(json["error"], "identity not found: abc");
    }
}
