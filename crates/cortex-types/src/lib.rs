//! Shared domain types for Cortex.
//!
//! This crate contains the core domain types of the memory-and-policy engine:
//! Identity, DistilledMemory, FailurePattern, the per-request CortexContext,
//! engine configuration, and the associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod failure;
pub mod identity;
pub mod memory;

/// Trim, sort, and deduplicate a tag list.
///
/// Stored tag lists are always sorted and unique so that set comparisons
/// and unions are order-independent.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags_sorts_and_dedups() {
        let tags = normalize_tags(["rust", " async ", "rust", "", "api"]);
        assert_eq!(tags, vec!["api", "async", "rust"]);
    }
}
