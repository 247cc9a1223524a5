//! Failure pattern types.
//!
//! A failure pattern records a past mistake. Hard patterns block matching
//! requests; soft patterns are surfaced without blocking. Severity is only
//! ever upgraded (soft -> hard), never downgraded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::entity::Entity;

/// Unique identifier for a failure pattern, wrapping a UUID v7.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PatternId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the pipeline.
    Hard,
    /// Surfaced, does not block.
    Soft,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hard => write!(f, "hard"),
            Severity::Soft => write!(f, "soft"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hard" => Ok(Severity::Hard),
            "soft" => Ok(Severity::Soft),
            other => Err(format!("invalid severity: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    pub id: PatternId,
    pub pattern: String,
    pub context: String,
    pub severity: Severity,
    /// At least 1.
    pub occurrence_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_occurred_at: DateTime<Utc>,
    pub reason: String,
    /// Sorted, unique.
    pub tags: Vec<String>,
    /// Inactive patterns stay stored but are excluded from matching.
    pub active: bool,
}

impl FailurePattern {
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.binary_search(t).is_ok())
    }

    /// Register one more occurrence.
    ///
    /// Refreshes `last_occurred_at`, reactivates the pattern, and upgrades
    /// severity when the new occurrence is hard.
    pub fn record_occurrence(&mut self, severity: Severity, now: DateTime<Utc>) {
        self.occurrence_count = self.occurrence_count.saturating_add(1);
        self.last_occurred_at = now;
        self.active = true;
        if severity == Severity::Hard {
            self.severity = Severity::Hard;
        }
    }
}

impl Entity for FailurePattern {
    type Id = PatternId;

    fn id(&self) -> &PatternId {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFailureRequest {
    pub pattern: String,
    pub context: String,
    pub severity: Severity,
    pub reason: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Retrieval filters for failure patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternQuery {
    pub severity: Option<Severity>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub active: Option<bool>,
    pub min_occurrences: Option<u32>,
    pub query: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPattern {
    pub pattern: FailurePattern,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternRetrieval {
    pub patterns: Vec<ScoredPattern>,
    pub total_count: usize,
}

/// An active pattern whose effective score reached the blocking threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: FailurePattern,
    pub score: f64,
}

/// Outcome of checking a request against active failure patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockingCheck {
    /// True iff at least one matched pattern is hard.
    pub blocked: bool,
    /// `Hard` if any hard match exists, `Soft` if only soft matches, `None` without matches.
    pub severity: Option<Severity>,
    /// Sorted by occurrence count, most frequent first.
    pub matches: Vec<PatternMatch>,
}

impl BlockingCheck {
    pub fn hard_matches(&self) -> impl Iterator<Item = &PatternMatch> {
        self.matches
            .iter()
            .filter(|m| m.pattern.severity == Severity::Hard)
    }

    pub fn soft_matches(&self) -> impl Iterator<Item = &PatternMatch> {
        self.matches
            .iter()
            .filter(|m| m.pattern.severity == Severity::Soft)
    }
}
