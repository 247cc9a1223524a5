//! Text similarity capability.
//!
//! The stores only need a symmetric score in `[0.0, 1.0]` between two texts.
//! Swapping in an embedding-backed scorer is a matter of implementing
//! [`SimilarityScorer`]; the default is a token-overlap (Jaccard) metric.

use std::collections::HashSet;
use std::sync::Arc;

/// A candidate that met the similarity threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate<'a> {
    /// Position of the candidate in the input slice.
    pub index: usize,
    pub score: f64,
    pub text: &'a str,
}

/// Scores how alike two texts are.
///
/// Implementations must be symmetric and return values in `[0.0, 1.0]`,
/// where `1.0` means identical.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;

    /// Candidates scoring at or above `threshold`, best first.
    ///
    /// Ties keep their input order.
    fn rank<'a>(&self, query: &str, candidates: &[&'a str], threshold: f64) -> Vec<RankedCandidate<'a>> {
        let mut ranked: Vec<RankedCandidate<'a>> = candidates
            .iter()
            .enumerate()
            .map(|(index, &text)| RankedCandidate {
                index,
                score: self.score(query, text),
                text,
            })
            .filter(|c| c.score >= threshold)
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}

impl<S: SimilarityScorer + ?Sized> SimilarityScorer for Arc<S> {
    fn score(&self, a: &str, b: &str) -> f64 {
        (**self).score(a, b)
    }
}

/// Rank owned items by how closely their text matches `query`.
///
/// Same filtering and ordering as [`SimilarityScorer::rank`], but hands back
/// the items themselves paired with their scores.
pub fn rank_items<T, S>(
    scorer: &S,
    query: &str,
    items: Vec<T>,
    text_of: fn(&T) -> &str,
    threshold: f64,
) -> Vec<(T, f64)>
where
    S: SimilarityScorer + ?Sized,
{
    let ranked: Vec<(usize, f64)> = {
        let texts: Vec<&str> = items.iter().map(text_of).collect();
        scorer
            .rank(query, &texts, threshold)
            .into_iter()
            .map(|c| (c.index, c.score))
            .collect()
    };

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    ranked
        .into_iter()
        .filter_map(|(index, score)| {
            slots
                .get_mut(index)
                .and_then(Option::take)
                .map(|item| (item, score))
        })
        .collect()
}

/// Jaccard similarity over lowercase alphanumeric word tokens.
///
/// `|A ∩ B| / |A ∪ B|`. Two texts with no tokens score 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlapScorer;

impl TokenOverlapScorer {
    pub fn new() -> Self {
        Self
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl SimilarityScorer for TokenOverlapScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        let left = tokenize(a);
        let right = tokenize(b);
        let union = left.union(&right).count();
        if union == 0 {
            return 0.0;
        }
        let intersection = left.intersection(&right).count();
        intersection as f64 / union as f64
    }
}
