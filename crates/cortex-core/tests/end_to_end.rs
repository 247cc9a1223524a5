//! Full request cycle against the in-memory stores.

use std::sync::Arc;

use cortex_core::pipeline::CortexPipeline;
use cortex_core::repository::in_memory::{InMemoryIdentityRepository, InMemoryRepository};
use cortex_core::service::failure::FailureMemoryService;
use cortex_core::service::identity::IdentityService;
use cortex_core::service::memory::DistilledMemoryService;
use cortex_core::similarity::TokenOverlapScorer;
use cortex_types::config::EngineConfig;
use cortex_types::context::{PipelineOutcome, PrepareRequest};
use cortex_types::failure::{FailurePattern, RecordFailureRequest, Severity};
use cortex_types::identity::{CreateIdentityRequest, IdentityId, RiskPosture, ValueInput};
use cortex_types::memory::{DistilledMemory, MemoryType, RecordMemoryRequest};

type Memories = DistilledMemoryService<InMemoryRepository<DistilledMemory>, TokenOverlapScorer>;
type Failures = FailureMemoryService<InMemoryRepository<FailurePattern>, TokenOverlapScorer>;

struct Engine {
    identities: Arc<IdentityService<InMemoryIdentityRepository>>,
    memories: Arc<Memories>,
    failures: Arc<Failures>,
    pipeline: CortexPipeline<
        InMemoryIdentityRepository,
        InMemoryRepository<DistilledMemory>,
        InMemoryRepository<FailurePattern>,
        TokenOverlapScorer,
    >,
}

fn engine() -> Engine {
    let config = EngineConfig::default();
    let identities = Arc::new(IdentityService::new(InMemoryIdentityRepository::new()));
    let memories = Arc::new(DistilledMemoryService::new(
        InMemoryRepository::new(),
        TokenOverlapScorer::new(),
        config.memory.clone(),
    ));
    let failures = Arc::new(FailureMemoryService::new(
        InMemoryRepository::new(),
        TokenOverlapScorer::new(),
        config.failure.clone(),
    ));
    let pipeline = CortexPipeline::new(
        Arc::clone(&identities),
        Arc::clone(&memories),
        Arc::clone(&failures),
        config.pipeline,
    );
    Engine {
        identities,
        memories,
        failures,
        pipeline,
    }
}

fn prepare(identity_id: &IdentityId, query: &str) -> PrepareRequest {
    PrepareRequest {
        identity_id: identity_id.clone(),
        query: query.to_string(),
        context: None,
        memory_options: None,
        failure_options: None,
    }
}

#[tokio::test]
async fn lesson_is_served_until_a_hard_failure_blocks_it() {
    let engine = engine();

    let identity = engine
        .identities
        .create(CreateIdentityRequest {
            name: "Reviewer".to_string(),
            description: None,
            values: vec![ValueInput {
                name: "correctness".to_string(),
                description: "Prefer correct over fast".to_string(),
                priority: 5,
            }],
            invariants: vec![],
            style_constraints: vec![],
            risk_posture: RiskPosture::Moderate,
        })
        .await
        .unwrap();

    engine
        .memories
        .record(RecordMemoryRequest {
            memory_type: MemoryType::Lesson,
            content: "Always validate input".to_string(),
            confidence: Some(0.8),
            tags: vec![],
            source_context: None,
        })
        .await
        .unwrap();

    let outcome = engine.pipeline.prepare(prepare(&identity.id, "validate input")).await;
    let PipelineOutcome::Success { context } = outcome else {
        panic!("expected success");
    };
    assert_eq!(context.memory_view.lessons.len(), 1);
    assert_eq!(context.memory_view.lessons[0].content, "Always validate input");
    assert_eq!(context.memory_view.lessons[0].confidence, 0.8);
    assert_eq!(context.identity_view.values[0].priority, 5);

    engine
        .failures
        .record(RecordFailureRequest {
            pattern: "validate input".to_string(),
            context: "review".to_string(),
            severity: Severity::Hard,
            reason: "validation step was skipped in production".to_string(),
            tags: vec![],
        })
        .await
        .unwrap();

    let outcome = engine.pipeline.prepare(prepare(&identity.id, "validate input")).await;
    assert!(outcome.is_blocked(), "expected block, got {outcome:?}");

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "blocked");
    assert_eq!(json["reason"], "validation step was skipped in production");

    // Serving the context never reinforces memory or touches the identity.
    let stored = engine
        .memories
        .retrieve(Default::default())
        .await
        .unwrap();
    assert_eq!(stored.memories[0].memory.confidence, 0.8);
    assert_eq!(stored.memories[0].memory.reinforcement_count, 0);
    let loaded = engine.identities.load(&identity.id).await.unwrap().unwrap();
    assert_eq!(loaded, identity);
}

#[tokio::test]
async fn merge_then_load_reflects_union() {
    let engine = engine();
    let keep = engine
        .memories
        .record(RecordMemoryRequest {
            memory_type: MemoryType::Preference,
            content: "answer in short paragraphs".to_string(),
            confidence: None,
            tags: vec!["style".to_string()],
            source_context: None,
        })
        .await
        .unwrap()
        .into_entity();
    let remove = engine
        .memories
        .record(RecordMemoryRequest {
            memory_type: MemoryType::Preference,
            content: "keep replies brief".to_string(),
            confidence: Some(0.6),
            tags: vec!["brevity".to_string(), "style".to_string()],
            source_context: None,
        })
        .await
        .unwrap()
        .into_entity();

    engine.memories.merge(&keep.id, &remove.id).await.unwrap();

    assert!(engine.memories.get(&remove.id).await.unwrap().is_none());
    let merged = engine.memories.get(&keep.id).await.unwrap().unwrap();
    assert_eq!(merged.tags, vec!["brevity".to_string(), "style".to_string()]);
    assert_eq!(merged.reinforcement_count, 1);
}
