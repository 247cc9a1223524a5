//! Find-or-create on text similarity.
//!
//! Both learned-memory stores deduplicate on write: an incoming text that is
//! similar enough to an existing record reinforces that record instead of
//! creating a new one. This module holds that shared step.

use serde::Serialize;

use cortex_types::entity::Entity;
use cortex_types::error::RepositoryError;

use crate::repository::EntityRepository;
use crate::similarity::SimilarityScorer;

/// Whether a write created a new record or reinforced an existing one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "entity", rename_all = "snake_case")]
pub enum Recorded<T> {
    Created(T),
    Reinforced(T),
}

impl<T> Recorded<T> {
    pub fn entity(&self) -> &T {
        match self {
            Recorded::Created(e) | Recorded::Reinforced(e) => e,
        }
    }

    pub fn into_entity(self) -> T {
        match self {
            Recorded::Created(e) | Recorded::Reinforced(e) => e,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Recorded::Created(_))
    }
}

/// Index and score of the existing record most similar to `incoming`,
/// if any reaches `threshold`. Ties go to the earliest record.
pub fn most_similar<T, S>(
    scorer: &S,
    incoming: &str,
    existing: &[T],
    text_of: fn(&T) -> &str,
    threshold: f64,
) -> Option<(usize, f64)>
where
    S: SimilarityScorer + ?Sized,
{
    let texts: Vec<&str> = existing.iter().map(text_of).collect();
    scorer
        .rank(incoming, &texts, threshold)
        .first()
        .map(|c| (c.index, c.score))
}

/// Reinforce the most similar stored record, or persist a new one.
///
/// Scans every record in the store. `reinforce` receives the matched record
/// and returns its updated form; `create` builds the new record otherwise.
pub async fn find_or_create<R, S, T>(
    repo: &R,
    scorer: &S,
    incoming: &str,
    threshold: f64,
    text_of: fn(&T) -> &str,
    reinforce: impl FnOnce(T) -> T,
    create: impl FnOnce() -> T,
) -> Result<Recorded<T>, RepositoryError>
where
    R: EntityRepository<Entity = T>,
    S: SimilarityScorer + ?Sized,
    T: Entity,
{
    let mut existing = repo.list_all().await?;

    if let Some((index, _score)) = most_similar(scorer, incoming, &existing, text_of, threshold) {
        let matched = existing.swap_remove(index);
        let updated = reinforce(matched);
        repo.save(&updated).await?;
        return Ok(Recorded::Reinforced(updated));
    }

    let created = create();
    repo.save(&created).await?;
    Ok(Recorded::Created(created))
}
