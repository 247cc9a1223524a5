//! Distilled memory repository trait definition.

use std::future::Future;

use cortex_types::error::RepositoryError;
use cortex_types::memory::{DistilledMemory, MemoryType};

use super::EntityRepository;

/// Repository for distilled memories.
///
/// The indexed lookups are retrieval optimizations; the defaults scan `list_all`.
pub trait DistilledMemoryRepository: EntityRepository<Entity = DistilledMemory> {
    fn list_by_type(
        &self,
        memory_type: MemoryType,
    ) -> impl Future<Output = Result<Vec<DistilledMemory>, RepositoryError>> + Send {
        async move {
            let all = self.list_all().await?;
            Ok(all
                .into_iter()
                .filter(|m| m.memory_type == memory_type)
                .collect())
        }
    }

    /// Memories carrying every tag in `tags`.
    fn list_by_tags(
        &self,
        tags: &[String],
    ) -> impl Future<Output = Result<Vec<DistilledMemory>, RepositoryError>> + Send {
        async move {
            let all = self.list_all().await?;
            Ok(all.into_iter().filter(|m| m.has_all_tags(tags)).collect())
        }
    }
}
