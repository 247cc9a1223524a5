//! Distilled memory types.
//!
//! A distilled memory is one statement of learned knowledge. Confidence and
//! decay factor are independent axes: confidence is accumulated belief,
//! decay factor is staleness. Cleanup looks at their product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::entity::Entity;

/// Unique identifier for a distilled memory, wrapping a UUID v7.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of distilled knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Lesson,
    Preference,
    Warning,
}

impl MemoryType {
    pub const ALL: [MemoryType; 3] = [MemoryType::Lesson, MemoryType::Preference, MemoryType::Warning];
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryType::Lesson => write!(f, "lesson"),
            MemoryType::Preference => write!(f, "preference"),
            MemoryType::Warning => write!(f, "warning"),
        }
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lesson" => Ok(MemoryType::Lesson),
            "preference" => Ok(MemoryType::Preference),
            "warning" => Ok(MemoryType::Warning),
            other => Err(format!("invalid memory type: '{other}'")),
        }
    }
}

/// One distilled statement of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistilledMemory {
    pub id: MemoryId,
    pub memory_type: MemoryType,
    pub content: String,
    /// Accumulated belief strength in `[0, 1]`.
    pub confidence: f64,
    pub reinforcement_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_reinforced_at: DateTime<Utc>,
    pub last_decay_at: DateTime<Utc>,
    /// Freshness in `[0, 1]`; starts at 1.0 and is reset by reinforcement.
    pub decay_factor: f64,
    /// Sorted, unique.
    pub tags: Vec<String>,
    pub source_context: Option<String>,
}

impl DistilledMemory {
    /// Strength used by cleanup: `confidence * decay_factor`.
    pub fn effective_strength(&self) -> f64 {
        self.confidence * self.decay_factor
    }

    /// True if every tag in `required` is present.
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.binary_search(t).is_ok())
    }
}

impl Entity for DistilledMemory {
    type Id = MemoryId;

    fn id(&self) -> &MemoryId {
        &self.id
    }
}

/// Request to record a memory (reinforces a near-duplicate instead when one exists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMemoryRequest {
    pub memory_type: MemoryType,
    pub content: String,
    /// Defaults to the configured default confidence (0.5).
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_context: Option<String>,
}

/// Retrieval filters. All present filters must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub memory_type: Option<MemoryType>,
    /// All-of tag match.
    #[serde(default)]
    pub tags: Vec<String>,
    pub min_confidence: Option<f64>,
    /// Free-text semantic query; ranks results by similarity when present.
    pub query: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub limit: Option<usize>,
}

/// A retrieved memory with its similarity score when a semantic query ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: DistilledMemory,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryRetrieval {
    pub memories: Vec<ScoredMemory>,
    /// Matches before the limit was applied.
    pub total_count: usize,
}

/// Result of reinforcing a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinforceOutcome {
    pub memory: DistilledMemory,
    pub previous_confidence: f64,
    pub new_confidence: f64,
    pub previous_reinforcement_count: u32,
}

/// Result of merging two memories into one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub memory: DistilledMemory,
    pub removed_id: MemoryId,
    /// Content similarity between the two records; reported, not gating.
    pub similarity: f64,
}
