//! Distilled memory service.
//!
//! Records deduplicate on write: similar content reinforces the existing
//! memory instead of creating a new one. Decay and cleanup never run
//! implicitly; callers trigger them through [`DistilledMemoryService::maintain`]
//! or the individual passes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use cortex_types::config::MemoryConfig;
use cortex_types::error::{MemoryError, ValidationError};
use cortex_types::memory::{
    DistilledMemory, MemoryId, MemoryQuery, MemoryRetrieval, MergeOutcome, RecordMemoryRequest,
    ReinforceOutcome, ScoredMemory,
};
use cortex_types::normalize_tags;

use crate::dedup::{Recorded, find_or_create};
use crate::repository::memory::DistilledMemoryRepository;
use crate::similarity::{SimilarityScorer, rank_items};

/// Result of one maintenance pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    /// Memories whose decay factor was lowered.
    pub decayed: usize,
    pub deleted: Vec<MemoryId>,
}

fn memory_text(memory: &DistilledMemory) -> &str {
    &memory.content
}

/// Raise confidence (capped, never lowered) and erase accumulated decay.
fn apply_reinforcement(memory: &mut DistilledMemory, config: &MemoryConfig, now: DateTime<Utc>) {
    let boosted = (memory.confidence + config.reinforcement_boost).min(config.max_confidence);
    memory.confidence = boosted.max(memory.confidence);
    memory.reinforcement_count = memory.reinforcement_count.saturating_add(1);
    memory.decay_factor = 1.0;
    memory.last_reinforced_at = now;
    memory.last_decay_at = now;
}

/// Whether cleanup should remove this memory.
pub fn is_expired(memory: &DistilledMemory, config: &MemoryConfig) -> bool {
    memory.confidence < config.deletion_threshold
        || memory.decay_factor < config.decay_factor_threshold
        || memory.effective_strength() < config.deletion_threshold
}

pub struct DistilledMemoryService<M: DistilledMemoryRepository, S: SimilarityScorer> {
    repo: M,
    scorer: S,
    config: MemoryConfig,
}

impl<M: DistilledMemoryRepository, S: SimilarityScorer> DistilledMemoryService<M, S> {
    pub fn new(repo: M, scorer: S, config: MemoryConfig) -> Self {
        Self {
            repo,
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Record a memory, reinforcing the most similar existing one instead
    /// when it reaches the duplicate threshold.
    pub async fn record(
        &self,
        request: RecordMemoryRequest,
    ) -> Result<Recorded<DistilledMemory>, MemoryError> {
        let mut err = ValidationError::new();
        err.require_non_empty("content", &request.content);
        if let Some(confidence) = request.confidence {
            err.require_unit_range("confidence", confidence);
        }
        err.require_tags("tags", &request.tags);
        err.into_result()?;

        let now = Utc::now();
        let content = request.content.trim().to_string();
        let tags = normalize_tags(request.tags);
        let confidence = request.confidence.unwrap_or(self.config.default_confidence);

        let recorded = find_or_create(
            &self.repo,
            &self.scorer,
            &content,
            self.config.duplicate_threshold,
            memory_text,
            |mut existing| {
                apply_reinforcement(&mut existing, &self.config, now);
                existing
            },
            || DistilledMemory {
                id: MemoryId::new(),
                memory_type: request.memory_type,
                content: content.clone(),
                confidence,
                reinforcement_count: 0,
                created_at: now,
                last_reinforced_at: now,
                last_decay_at: now,
                decay_factor: 1.0,
                tags,
                source_context: request.source_context,
            },
        )
        .await?;

        match &recorded {
            Recorded::Created(m) => {
                info!(memory_id = %m.id, memory_type = %m.memory_type, "recorded new memory")
            }
            Recorded::Reinforced(m) => debug!(
                memory_id = %m.id,
                confidence = m.confidence,
                count = m.reinforcement_count,
                "record reinforced existing memory"
            ),
        }
        Ok(recorded)
    }

    pub async fn get(&self, id: &MemoryId) -> Result<Option<DistilledMemory>, MemoryError> {
        Ok(self.repo.get(id).await?)
    }

    async fn require(&self, id: &MemoryId) -> Result<DistilledMemory, MemoryError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    pub async fn reinforce(&self, id: &MemoryId) -> Result<ReinforceOutcome, MemoryError> {
        let mut memory = self.require(id).await?;
        let previous_confidence = memory.confidence;
        let previous_reinforcement_count = memory.reinforcement_count;

        apply_reinforcement(&mut memory, &self.config, Utc::now());
        self.repo.save(&memory).await?;
        debug!(memory_id = %id, previous_confidence, confidence = memory.confidence, "reinforced memory");

        Ok(ReinforceOutcome {
            new_confidence: memory.confidence,
            memory,
            previous_confidence,
            previous_reinforcement_count,
        })
    }

    /// Fold `remove_id` into `keep_id` and delete it.
    pub async fn merge(
        &self,
        keep_id: &MemoryId,
        remove_id: &MemoryId,
    ) -> Result<MergeOutcome, MemoryError> {
        if keep_id == remove_id {
            return Err(ValidationError::single("remove_id", "must differ from keep_id").into());
        }
        let mut keep = self.require(keep_id).await?;
        let remove = self.require(remove_id).await?;

        let similarity = self.scorer.score(&keep.content, &remove.content);
        let now = Utc::now();

        keep.confidence = (keep.confidence.max(remove.confidence) + self.config.reinforcement_boost)
            .min(self.config.max_confidence);
        keep.reinforcement_count = keep
            .reinforcement_count
            .saturating_add(remove.reinforcement_count)
            .saturating_add(1);
        keep.created_at = keep.created_at.min(remove.created_at);
        keep.tags = normalize_tags(keep.tags.iter().chain(remove.tags.iter()));
        keep.last_reinforced_at = now;

        self.repo.save(&keep).await?;
        self.repo.delete(remove_id).await?;
        info!(keep = %keep_id, removed = %remove_id, similarity, "merged memories");

        Ok(MergeOutcome {
            memory: keep,
            removed_id: remove_id.clone(),
            similarity,
        })
    }

    /// Lower the decay factor of every memory at least one interval past its last decay.
    pub async fn apply_decay(&self) -> Result<usize, MemoryError> {
        self.apply_decay_at(Utc::now()).await
    }

    async fn apply_decay_at(&self, now: DateTime<Utc>) -> Result<usize, MemoryError> {
        let interval_secs = self.config.decay_interval().num_seconds().max(1);
        let mut touched = 0;

        for mut memory in self.repo.list_all().await? {
            let elapsed = (now - memory.last_decay_at).num_seconds();
            let intervals = elapsed / interval_secs;
            if intervals < 1 {
                continue;
            }
            memory.decay_factor =
                (memory.decay_factor - self.config.decay_rate * intervals as f64).clamp(0.0, 1.0);
            memory.last_decay_at = now;
            self.repo.save(&memory).await?;
            debug!(memory_id = %memory.id, intervals, decay_factor = memory.decay_factor, "decayed memory");
            touched += 1;
        }

        Ok(touched)
    }

    /// Delete every expired memory. Returns the removed ids.
    pub async fn cleanup(&self) -> Result<Vec<MemoryId>, MemoryError> {
        let mut deleted = Vec::new();
        for memory in self.repo.list_all().await? {
            if is_expired(&memory, &self.config) && self.repo.delete(&memory.id).await? {
                deleted.push(memory.id);
            }
        }
        if !deleted.is_empty() {
            info!(count = deleted.len(), "cleaned up expired memories");
        }
        Ok(deleted)
    }

    /// Decay, then clean up.
    pub async fn maintain(&self) -> Result<MaintenanceReport, MemoryError> {
        let decayed = self.apply_decay().await?;
        let deleted = self.cleanup().await?;
        Ok(MaintenanceReport { decayed, deleted })
    }

    pub async fn retrieve(&self, query: MemoryQuery) -> Result<MemoryRetrieval, MemoryError> {
        let mut err = ValidationError::new();
        if let Some(min) = query.min_confidence {
            err.require_unit_range("min_confidence", min);
        }
        if let Some(threshold) = query.similarity_threshold {
            err.require_unit_range("similarity_threshold", threshold);
        }
        err.require_tags("tags", &query.tags);
        err.into_result()?;

        let tags = normalize_tags(&query.tags);
        let candidates = match query.memory_type {
            Some(memory_type) => self.repo.list_by_type(memory_type).await?,
            None if !tags.is_empty() => self.repo.list_by_tags(&tags).await?,
            None => self.repo.list_all().await?,
        };
        let filtered: Vec<DistilledMemory> = candidates
            .into_iter()
            .filter(|m| m.has_all_tags(&tags))
            .filter(|m| query.min_confidence.is_none_or(|min| m.confidence >= min))
            .collect();

        let mut memories: Vec<ScoredMemory> = match query.query.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let threshold = query
                    .similarity_threshold
                    .unwrap_or(self.config.similarity_threshold);
                rank_items(&self.scorer, text, filtered, memory_text, threshold)
                    .into_iter()
                    .map(|(memory, score)| ScoredMemory {
                        memory,
                        score: Some(score),
                    })
                    .collect()
            }
            _ => filtered
                .into_iter()
                .map(|memory| ScoredMemory { memory, score: None })
                .collect(),
        };

        let total_count = memories.len();
        if let Some(limit) = query.limit {
            memories.truncate(limit);
        }
        debug!(
            memory_type = ?query.memory_type,
            total_count,
            returned = memories.len(),
            "retrieved memories"
        );

        Ok(MemoryRetrieval {
            memories,
            total_count,
        })
    }
}
