//! Application state wiring all services together.
//!
//! Services are generic over repository and scorer traits; AppState pins them
//! to the SQLite repositories and the token-overlap scorer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use cortex_core::pipeline::CortexPipeline;
use cortex_core::service::failure::FailureMemoryService;
use cortex_core::service::identity::IdentityService;
use cortex_core::service::memory::DistilledMemoryService;
use cortex_core::similarity::TokenOverlapScorer;
use cortex_infra::config::load_engine_config;
use cortex_infra::filesystem::ensure_data_dir;
use cortex_infra::sqlite::failure::SqliteFailurePatternRepository;
use cortex_infra::sqlite::identity::SqliteIdentityRepository;
use cortex_infra::sqlite::memory::SqliteDistilledMemoryRepository;
use cortex_infra::sqlite::pool::{DatabasePool, database_url};
use cortex_types::config::EngineConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteIdentityService = IdentityService<SqliteIdentityRepository>;

pub type ConcreteMemoryService =
    DistilledMemoryService<SqliteDistilledMemoryRepository, TokenOverlapScorer>;

pub type ConcreteFailureService =
    FailureMemoryService<SqliteFailurePatternRepository, TokenOverlapScorer>;

pub type ConcretePipeline = CortexPipeline<
    SqliteIdentityRepository,
    SqliteDistilledMemoryRepository,
    SqliteFailurePatternRepository,
    TokenOverlapScorer,
>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub identity_service: Arc<ConcreteIdentityService>,
    pub memory_service: Arc<ConcreteMemoryService>,
    pub failure_service: Arc<ConcreteFailureService>,
    pub pipeline: Arc<ConcretePipeline>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init(data_dir: PathBuf) -> anyhow::Result<Self> {
        ensure_data_dir(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;

        let db_url = format!("{}?mode=rwc", database_url(&data_dir));
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("Failed to open database at {db_url}"))?;

        let scorer = TokenOverlapScorer::new();

        let identity_service = Arc::new(IdentityService::new(SqliteIdentityRepository::new(
            db_pool.clone(),
        )));
        let memory_service = Arc::new(DistilledMemoryService::new(
            SqliteDistilledMemoryRepository::new(db_pool.clone()),
            scorer,
            config.memory.clone(),
        ));
        let failure_service = Arc::new(FailureMemoryService::new(
            SqliteFailurePatternRepository::new(db_pool),
            scorer,
            config.failure.clone(),
        ));

        let pipeline = CortexPipeline::new(
            identity_service.clone(),
            memory_service.clone(),
            failure_service.clone(),
            config.pipeline.clone(),
        );

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");

        Ok(Self {
            identity_service,
            memory_service,
            failure_service,
            pipeline: Arc::new(pipeline),
            config,
            data_dir,
        })
    }
}
