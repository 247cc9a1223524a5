use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single violated field in a create/record/update input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field, e.g. `values[2].name`.
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Malformed input. Lists every violated field, not just the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("validation failed: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an error with a single violation.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record a violation if `value` is empty or whitespace-only.
    pub fn require_non_empty(&mut self, field: impl Into<String>, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "must not be empty");
        }
    }

    /// Record a violation if `value` falls outside `[0.0, 1.0]` or is NaN.
    pub fn require_unit_range(&mut self, field: impl Into<String>, value: f64) {
        if !(0.0..=1.0).contains(&value) {
            self.push(field, format!("must be between 0 and 1, got {value}"));
        }
    }

    /// Record a violation for every blank tag.
    pub fn require_tags(&mut self, field: &str, tags: &[String]) {
        for (i, tag) in tags.iter().enumerate() {
            if tag.trim().is_empty() {
                self.push(format!("{field}[{i}]"), "tag must not be empty");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Errors from repository operations (used by trait definitions in cortex-core).
///
/// Storage adapters surface these unmodified; the core never retries.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors related to identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("identity not found: {0}")]
    NotFound(String),

    #[error("identity {id} has no version {version}")]
    VersionNotFound { id: String, version: u32 },

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Errors related to distilled memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("memory not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Errors related to failure pattern operations.
#[derive(Debug, Error)]
pub enum FailureError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failure pattern not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Payload of a pipeline run that ended in error (as opposed to a block).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl From<IdentityError> for PipelineError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Validation(v) => PipelineError::Validation(v),
            IdentityError::Storage(s) => PipelineError::Storage(s),
            IdentityError::NotFound(id) | IdentityError::VersionNotFound { id, .. } => {
                PipelineError::IdentityNotFound(id)
            }
        }
    }
}

impl From<MemoryError> for PipelineError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Validation(v) => PipelineError::Validation(v),
            MemoryError::Storage(s) => PipelineError::Storage(s),
            MemoryError::NotFound(id) => {
                PipelineError::Storage(RepositoryError::Query(format!("memory vanished: {id}")))
            }
        }
    }
}

impl From<FailureError> for PipelineError {
    fn from(err: FailureError) -> Self {
        match err {
            FailureError::Validation(v) => PipelineError::Validation(v),
            FailureError::Storage(s) => PipelineError::Storage(s),
            FailureError::NotFound(id) => {
                PipelineError::Storage(RepositoryError::Query(format!("pattern vanished: {id}")))
            }
        }
    }
}
