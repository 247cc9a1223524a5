//! Engine configuration types.
//!
//! `EngineConfig` represents the top-level `config.toml` that tunes scoring,
//! decay, deduplication, and blocking thresholds. Every field has a default,
//! so an empty file (or no file) yields the stock engine.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub failure: FailureConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Check every threshold, rate, and confidence lies in `[0, 1]` and the
    /// decay interval is at least one hour. Collects all violations.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();

        let memory = &self.memory;
        err.require_unit_range("memory.duplicate_threshold", memory.duplicate_threshold);
        err.require_unit_range("memory.reinforcement_boost", memory.reinforcement_boost);
        err.require_unit_range("memory.max_confidence", memory.max_confidence);
        err.require_unit_range("memory.default_confidence", memory.default_confidence);
        err.require_unit_range("memory.decay_rate", memory.decay_rate);
        err.require_unit_range("memory.deletion_threshold", memory.deletion_threshold);
        err.require_unit_range("memory.decay_factor_threshold", memory.decay_factor_threshold);
        err.require_unit_range("memory.similarity_threshold", memory.similarity_threshold);
        if memory.decay_interval_hours == 0 {
            err.push("memory.decay_interval_hours", "must be at least 1");
        }
        if memory.default_confidence > memory.max_confidence {
            err.push(
                "memory.default_confidence",
                format!("must not exceed max_confidence ({})", memory.max_confidence),
            );
        }

        let failure = &self.failure;
        err.require_unit_range("failure.duplicate_threshold", failure.duplicate_threshold);
        err.require_unit_range("failure.blocking_threshold", failure.blocking_threshold);
        err.require_unit_range("failure.similarity_threshold", failure.similarity_threshold);

        let pipeline = &self.pipeline;
        err.require_unit_range("pipeline.default_min_confidence", pipeline.default_min_confidence);
        err.require_unit_range(
            "pipeline.default_similarity_threshold",
            pipeline.default_similarity_threshold,
        );

        err.into_result()
    }
}

/// Distilled memory tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Similarity at or above which `record` reinforces instead of creating.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    /// Confidence added per reinforcement.
    #[serde(default = "default_reinforcement_boost")]
    pub reinforcement_boost: f64,
    #[serde(default = "default_max_confidence")]
    pub max_confidence: f64,
    /// Confidence given to new memories recorded without one.
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
    /// Decay factor lost per elapsed interval.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_decay_interval_hours")]
    pub decay_interval_hours: u32,
    /// Cleanup deletes below this confidence or effective strength.
    #[serde(default = "default_deletion_threshold")]
    pub deletion_threshold: f64,
    /// Cleanup deletes below this decay factor.
    #[serde(default = "default_decay_factor_threshold")]
    pub decay_factor_threshold: f64,
    /// Default semantic retrieval threshold.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl MemoryConfig {
    pub fn decay_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.decay_interval_hours))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: default_duplicate_threshold(),
            reinforcement_boost: default_reinforcement_boost(),
            max_confidence: default_max_confidence(),
            default_confidence: default_confidence(),
            decay_rate: default_decay_rate(),
            decay_interval_hours: default_decay_interval_hours(),
            deletion_threshold: default_deletion_threshold(),
            decay_factor_threshold: default_decay_factor_threshold(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Failure memory tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    /// Effective score at or above which an active pattern matches.
    #[serde(default = "default_blocking_threshold")]
    pub blocking_threshold: f64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: default_duplicate_threshold(),
            blocking_threshold: default_blocking_threshold(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Defaults applied when a pipeline request omits memory options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_min_confidence")]
    pub default_min_confidence: f64,
    #[serde(default = "default_similarity_threshold")]
    pub default_similarity_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_min_confidence: default_min_confidence(),
            default_similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_duplicate_threshold() -> f64 {
    0.8
}

fn default_reinforcement_boost() -> f64 {
    0.1
}

fn default_max_confidence() -> f64 {
    1.0
}

fn default_confidence() -> f64 {
    0.5
}

fn default_decay_rate() -> f64 {
    0.05
}

fn default_decay_interval_hours() -> u32 {
    24
}

fn default_deletion_threshold() -> f64 {
    0.2
}

fn default_decay_factor_threshold() -> f64 {
    0.1
}

fn default_similarity_threshold() -> f64 {
    0.5
}

fn default_blocking_threshold() -> f64 {
    0.7
}

fn default_limit() -> usize {
    10
}

fn default_min_confidence() -> f64 {
    0.3
}
