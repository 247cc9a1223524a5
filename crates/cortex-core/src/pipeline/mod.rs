//! Orchestration pipeline.
//!
//! One request runs four stages in order: load the identity, check the
//! request against active failure patterns, retrieve memories, and assemble
//! the context. A hard block ends the run after stage two, so blocked
//! requests never read memory. The pipeline is read-only against every store.

pub mod view;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use cortex_types::config::PipelineConfig;
use cortex_types::context::{
    CortexContext, FailureView, MemoryOptions, PipelineOutcome, PrepareRequest, RawRetrieval,
    block_reason,
};
use cortex_types::error::{PipelineError, ValidationError};
use cortex_types::memory::{MemoryQuery, MemoryType};

use crate::repository::failure::FailurePatternRepository;
use crate::repository::identity::IdentityRepository;
use crate::repository::memory::DistilledMemoryRepository;
use crate::service::failure::FailureMemoryService;
use crate::service::identity::IdentityService;
use crate::service::memory::DistilledMemoryService;
use crate::similarity::SimilarityScorer;

/// Composes the identity, memory, and failure services into one read cycle.
pub struct CortexPipeline<I, M, F, S>
where
    I: IdentityRepository,
    M: DistilledMemoryRepository,
    F: FailurePatternRepository,
    S: SimilarityScorer,
{
    identities: Arc<IdentityService<I>>,
    memories: Arc<DistilledMemoryService<M, S>>,
    failures: Arc<FailureMemoryService<F, S>>,
    config: PipelineConfig,
}

impl<I, M, F, S> CortexPipeline<I, M, F, S>
where
    I: IdentityRepository,
    M: DistilledMemoryRepository,
    F: FailurePatternRepository,
    S: SimilarityScorer,
{
    pub fn new(
        identities: Arc<IdentityService<I>>,
        memories: Arc<DistilledMemoryService<M, S>>,
        failures: Arc<FailureMemoryService<F, S>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            identities,
            memories,
            failures,
            config,
        }
    }

    /// Run the pipeline for one request.
    ///
    /// Never fails: errors come back as [`PipelineOutcome::Error`].
    #[tracing::instrument(skip(self, request), fields(identity_id = %request.identity_id))]
    pub async fn prepare(&self, request: PrepareRequest) -> PipelineOutcome {
        match self.run(request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "pipeline run failed");
                PipelineOutcome::Error { error }
            }
        }
    }

    async fn run(&self, request: PrepareRequest) -> Result<PipelineOutcome, PipelineError> {
        validate(&request)?;

        // 1. Load identity
        let identity = self
            .identities
            .load(&request.identity_id)
            .await?
            .ok_or_else(|| PipelineError::IdentityNotFound(request.identity_id.to_string()))?;

        // 2. Check blocking
        let query = request.query.trim();
        let blocking = self
            .failures
            .check_blocking(query, request.context.as_deref())
            .await?;
        let skip_blocking = request
            .failure_options
            .as_ref()
            .is_some_and(|o| o.skip_blocking_check);

        if blocking.blocked && !skip_blocking {
            let reason = block_reason(&blocking);
            info!(%reason, matched = blocking.matches.len(), "request blocked");
            return Ok(PipelineOutcome::Blocked {
                reason,
                matched_patterns: blocking.matches.into_iter().map(|m| m.pattern).collect(),
            });
        }

        // 3. Retrieve memories, one query per type, concurrently
        let options = request.memory_options.unwrap_or_default();
        let (lessons, preferences, warnings) = tokio::try_join!(
            self.memories
                .retrieve(self.memory_query(MemoryType::Lesson, query, &options)),
            self.memories
                .retrieve(self.memory_query(MemoryType::Preference, query, &options)),
            self.memories
                .retrieve(self.memory_query(MemoryType::Warning, query, &options)),
        )?;

        // 4. Assemble context
        let context = CortexContext {
            identity_view: view::identity_view(&identity),
            memory_view: view::memory_view(&lessons, &preferences, &warnings),
            failure_view: FailureView::from_check(&blocking),
            identity,
            raw: RawRetrieval {
                lessons,
                preferences,
                warnings,
                blocking,
            },
            prepared_at: Utc::now(),
        };
        debug!(
            memories = context.memory_view.total(),
            soft_blocks = context.failure_view.soft_blocks.len(),
            "prepared context"
        );

        Ok(PipelineOutcome::Success {
            context: Box::new(context),
        })
    }

    /// Request overrides with engine defaults filling the gaps.
    fn memory_query(&self, memory_type: MemoryType, query: &str, options: &MemoryOptions) -> MemoryQuery {
        MemoryQuery {
            memory_type: Some(memory_type),
            tags: options.tags.clone(),
            min_confidence: Some(
                options
                    .min_confidence
                    .unwrap_or(self.config.default_min_confidence),
            ),
            query: Some(query.to_string()),
            similarity_threshold: Some(
                options
                    .similarity_threshold
                    .unwrap_or(self.config.default_similarity_threshold),
            ),
            limit: Some(options.limit.unwrap_or(self.config.default_limit)),
        }
    }
}

fn validate(request: &PrepareRequest) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();
    err.require_non_empty("query", &request.query);
    if let Some(options) = &request.memory_options {
        if let Some(min) = options.min_confidence {
            err.require_unit_range("memory_options.min_confidence", min);
        }
        if let Some(threshold) = options.similarity_threshold {
            err.require_unit_range("memory_options.similarity_threshold", threshold);
        }
        err.require_tags("memory_options.tags", &options.tags);
    }
    err.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cortex_types::config::{FailureConfig, MemoryConfig};
    use cortex_types::context::FailureOptions;
    use cortex_types::error::RepositoryError;
    use cortex_types::failure::{FailurePattern, RecordFailureRequest, Severity};
    use cortex_types::identity::{
        CreateIdentityRequest, Identity, IdentityId, RiskPosture, ValueInput,
    };
    use cortex_types::memory::{DistilledMemory, MemoryId, RecordMemoryRequest};

    use crate::repository::EntityRepository;
    use crate::repository::in_memory::{InMemoryIdentityRepository, InMemoryRepository};
    use crate::similarity::TokenOverlapScorer;

    /// Memory store that counts reads and can be switched to fail.
    #[derive(Clone, Default)]
    struct ProbeMemoryRepo {
        inner: InMemoryRepository<DistilledMemory>,
        reads: Arc<AtomicUsize>,
        fail_reads: bool,
    }

    impl EntityRepository for ProbeMemoryRepo {
        type Entity = DistilledMemory;

        async fn save(&self, entity: &DistilledMemory) -> Result<(), RepositoryError> {
            self.inner.save(entity).await
        }

        async fn get(&self, id: &MemoryId) -> Result<Option<DistilledMemory>, RepositoryError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(id).await
        }

        async fn list_all(&self) -> Result<Vec<DistilledMemory>, RepositoryError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads {
                return Err(RepositoryError::Query("disk unavailable".to_string()));
            }
            self.inner.list_all().await
        }

        async fn delete(&self, id: &MemoryId) -> Result<bool, RepositoryError> {
            self.inner.delete(id).await
        }
    }

    impl DistilledMemoryRepository for ProbeMemoryRepo {}

    type TestPipeline = CortexPipeline<
        InMemoryIdentityRepository,
        ProbeMemoryRepo,
        InMemoryRepository<FailurePattern>,
        TokenOverlapScorer,
    >;

    struct Fixture {
        pipeline: TestPipeline,
        identities: Arc<IdentityService<InMemoryIdentityRepository>>,
        memories: Arc<DistilledMemoryService<ProbeMemoryRepo, TokenOverlapScorer>>,
        failures: Arc<FailureMemoryService<InMemoryRepository<FailurePattern>, TokenOverlapScorer>>,
        reads: Arc<AtomicUsize>,
    }

    fn fixture_with(memory_repo: ProbeMemoryRepo) -> Fixture {
        let reads = Arc::clone(&memory_repo.reads);
        let identities = Arc::new(IdentityService::new(InMemoryIdentityRepository::new()));
        let memories = Arc::new(DistilledMemoryService::new(
            memory_repo,
            TokenOverlapScorer::new(),
            MemoryConfig::default(),
        ));
        let failures = Arc::new(FailureMemoryService::new(
            InMemoryRepository::new(),
            TokenOverlapScorer::new(),
            FailureConfig::default(),
        ));
        let pipeline = CortexPipeline::new(
            Arc::clone(&identities),
            Arc::clone(&memories),
            Arc::clone(&failures),
            PipelineConfig::default(),
        );
        Fixture {
            pipeline,
            identities,
            memories,
            failures,
            reads,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ProbeMemoryRepo::default())
    }

    async fn create_identity(f: &Fixture) -> Identity {
        f.identities
            .create(CreateIdentityRequest {
                name: "Atlas".to_string(),
                description: None,
                values: vec![
                    ValueInput {
                        name: "speed".to_string(),
                        description: "Ship small changes".to_string(),
                        priority: 2,
                    },
                    ValueInput {
                        name: "safety".to_string(),
                        description: "Protect user data".to_string(),
                        priority: 8,
                    },
                ],
                invariants: vec![],
                style_constraints: vec![],
                risk_posture: RiskPosture::Moderate,
            })
            .await
            .unwrap()
    }

    async fn record_memory(f: &Fixture, memory_type: MemoryType, content: &str) {
        f.memories
            .record(RecordMemoryRequest {
                memory_type,
                content: content.to_string(),
                confidence: Some(0.8),
                tags: vec![],
                source_context: None,
            })
            .await
            .unwrap();
    }

    async fn record_failure(f: &Fixture, pattern: &str, severity: Severity, reason: &str) {
        f.failures
            .record(RecordFailureRequest {
                pattern: pattern.to_string(),
                context: "shell".to_string(),
                severity,
                reason: reason.to_string(),
                tags: vec![],
            })
            .await
            .unwrap();
    }

    fn request(identity_id: &IdentityId, query: &str) -> PrepareRequest {
        PrepareRequest {
            identity_id: identity_id.clone(),
            query: query.to_string(),
            context: None,
            memory_options: None,
            failure_options: None,
        }
    }

    #[tokio::test]
    async fn test_success_groups_memories_by_type() {
        let f = fixture();
        let identity = create_identity(&f).await;
        record_memory(&f, MemoryType::Lesson, "validate input early").await;
        record_memory(&f, MemoryType::Preference, "validate input strictly").await;
        record_memory(&f, MemoryType::Warning, "unrelated warning about caches").await;

        let outcome = f.pipeline.prepare(request(&identity.id, "validate input")).await;
        let PipelineOutcome::Success { context } = outcome else {
            panic!("expected success");
        };

        assert_eq!(context.memory_view.lessons.len(), 1);
        assert_eq!(context.memory_view.preferences.len(), 1);
        assert!(context.memory_view.warnings.is_empty());
        assert_eq!(context.identity_view.values[0].name, "safety");
        assert!(!context.failure_view.blocked);
        assert_eq!(context.identity, identity);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_error_not_block() {
        let f = fixture();
        record_failure(&f, "anything at all", Severity::Hard, "never").await;

        let outcome = f.pipeline.prepare(request(&IdentityId::new(), "anything at all")).await;
        assert!(matches!(
            outcome,
            PipelineOutcome::Error {
                error: PipelineError::IdentityNotFound(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_blank_query_is_validation_error() {
        let f = fixture();
        let identity = create_identity(&f).await;
        let mut req = request(&identity.id, "  ");
        req.memory_options = Some(MemoryOptions {
            min_confidence: Some(2.0),
            ..Default::default()
        });

        let outcome = f.pipeline.prepare(req).await;
        let PipelineOutcome::Error {
            error: PipelineError::Validation(v),
        } = outcome
        else {
            panic!("expected validation error");
        };
        assert_eq!(v.violations.len(), 2);
    }

    #[tokio::test]
    async fn test_hard_block_short_circuits_memory() {
        let f = fixture();
        let identity = create_identity(&f).await;
        record_memory(&f, MemoryType::Lesson, "drop the staging database").await;
        record_failure(&f, "drop the staging database", Severity::Hard, "irreversible").await;
        record_failure(&f, "drop staging database", Severity::Soft, "slow restore").await;
        let reads_before = f.reads.load(Ordering::SeqCst);

        let outcome = f
            .pipeline
            .prepare(request(&identity.id, "drop the staging database"))
            .await;

        let PipelineOutcome::Blocked {
            reason,
            matched_patterns,
        } = outcome
        else {
            panic!("expected block");
        };
        assert_eq!(reason, "irreversible");
        assert_eq!(matched_patterns.len(), 2);
        assert_eq!(f.reads.load(Ordering::SeqCst), reads_before);
    }

    #[tokio::test]
    async fn test_skip_blocking_check_still_reports() {
        let f = fixture();
        let identity = create_identity(&f).await;
        record_memory(&f, MemoryType::Warning, "format the disk only after backup").await;
        record_failure(&f, "format the disk", Severity::Hard, "wipes data").await;

        let mut req = request(&identity.id, "format the disk");
        req.failure_options = Some(FailureOptions {
            skip_blocking_check: true,
        });
        let outcome = f.pipeline.prepare(req).await;
        let PipelineOutcome::Success { context } = outcome else {
            panic!("expected success when skipping");
        };

        assert!(context.failure_view.blocked);
        assert_eq!(context.failure_view.block_reason.as_deref(), Some("wipes data"));
        assert_eq!(context.failure_view.hard_blocks.len(), 1);
        assert_eq!(context.memory_view.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_soft_match_surfaces_without_blocking() {
        let f = fixture();
        let identity = create_identity(&f).await;
        record_failure(&f, "deploy on friday", Severity::Soft, "weekend pages").await;

        let outcome = f.pipeline.prepare(request(&identity.id, "deploy on friday")).await;
        let PipelineOutcome::Success { context } = outcome else {
            panic!("expected success");
        };
        assert!(!context.failure_view.blocked);
        assert!(context.failure_view.block_reason.is_none());
        assert_eq!(context.failure_view.soft_blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_options_override_defaults() {
        let f = fixture();
        let identity = create_identity(&f).await;
        record_memory(&f, MemoryType::Lesson, "cache dependencies in ci").await;
        record_memory(&f, MemoryType::Lesson, "cache docker layers").await;

        let mut req = request(&identity.id, "cache");
        req.memory_options = Some(MemoryOptions {
            limit: Some(1),
            similarity_threshold: Some(0.2),
            ..Default::default()
        });
        let PipelineOutcome::Success { context } = f.pipeline.prepare(req).await else {
            panic!("expected success");
        };
        assert_eq!(context.memory_view.lessons.len(), 1);
        assert_eq!(context.raw.lessons.total_count, 2);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_unmodified() {
        let f = fixture_with(ProbeMemoryRepo {
            fail_reads: true,
            ..Default::default()
        });
        let identity = create_identity(&f).await;

        let outcome = f.pipeline.prepare(request(&identity.id, "anything")).await;
        let PipelineOutcome::Error {
            error: PipelineError::Storage(RepositoryError::Query(msg)),
        } = outcome
        else {
            panic!("expected storage error");
        };
        assert_eq!(msg, "disk unavailable");
    }

    #[tokio::test]
    async fn test_pipeline_never_mutates_identity() {
        let f = fixture();
        let identity = create_identity(&f).await;
        record_failure(&f, "leak secrets", Severity::Hard, "credentials").await;

        f.pipeline.prepare(request(&identity.id, "summarize logs")).await;
        f.pipeline.prepare(request(&identity.id, "leak secrets")).await;
        f.pipeline.prepare(request(&identity.id, " ")).await;

        let loaded = f.identities.load(&identity.id).await.unwrap().unwrap();
        assert_eq!(loaded, identity);
        assert_eq!(f.identities.get_version_history(&identity.id).await.unwrap().len(), 1);
    }
}
