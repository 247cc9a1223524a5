//! DashMap-backed default repositories.
//!
//! Each store is the sole owner of its entity map; clones share the same map.
//! Suitable for tests, embedding, and short-lived processes. Durable storage
//! lives in cortex-infra.

use std::sync::Arc;

use dashmap::DashMap;

use cortex_types::entity::Entity;
use cortex_types::error::RepositoryError;
use cortex_types::failure::FailurePattern;
use cortex_types::identity::{Identity, IdentityId, IdentityVersion};
use cortex_types::memory::DistilledMemory;

use super::failure::FailurePatternRepository;
use super::identity::IdentityRepository;
use super::memory::DistilledMemoryRepository;
use super::EntityRepository;

/// Hash-map store for any [`Entity`].
pub struct InMemoryRepository<T: Entity> {
    entries: Arc<DashMap<T::Id, T>>,
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Entity> EntityRepository for InMemoryRepository<T> {
    type Entity = T;

    async fn save(&self, entity: &T) -> Result<(), RepositoryError> {
        self.entries.insert(entity.id().clone(), entity.clone());
        Ok(())
    }

    async fn get(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_all(&self) -> Result<Vec<T>, RepositoryError> {
        let mut all: Vec<T> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        // UUID v7 ids sort by creation time.
        all.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(all)
    }

    async fn delete(&self, id: &T::Id) -> Result<bool, RepositoryError> {
        Ok(self.entries.remove(id).is_some())
    }
}

impl DistilledMemoryRepository for InMemoryRepository<DistilledMemory> {}

impl FailurePatternRepository for InMemoryRepository<FailurePattern> {}

/// In-memory identity store with a parallel version history map.
#[derive(Clone, Default)]
pub struct InMemoryIdentityRepository {
    identities: InMemoryRepository<Identity>,
    versions: Arc<DashMap<IdentityId, Vec<IdentityVersion>>>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityRepository for InMemoryIdentityRepository {
    type Entity = Identity;

    async fn save(&self, identity: &Identity) -> Result<(), RepositoryError> {
        self.identities.save(identity).await
    }

    async fn get(&self, id: &IdentityId) -> Result<Option<Identity>, RepositoryError> {
        self.identities.get(id).await
    }

    async fn list_all(&self) -> Result<Vec<Identity>, RepositoryError> {
        self.identities.list_all().await
    }

    async fn delete(&self, id: &IdentityId) -> Result<bool, RepositoryError> {
        let had_history = self.versions.remove(id).is_some();
        let had_record = self.identities.delete(id).await?;
        Ok(had_record || had_history)
    }
}

impl IdentityRepository for InMemoryIdentityRepository {
    async fn save_version(&self, version: &IdentityVersion) -> Result<(), RepositoryError> {
        let mut history = self
            .versions
            .entry(version.identity_id.clone())
            .or_default();
        if history.iter().any(|v| v.version == version.version) {
            return Err(RepositoryError::Conflict(format!(
                "identity version {} already exists for identity {}",
                version.version, version.identity_id
            )));
        }
        history.push(version.clone());
        history.sort_by_key(|v| v.version);
        Ok(())
    }

    async fn get_version(
        &self,
        id: &IdentityId,
        version: u32,
    ) -> Result<Option<IdentityVersion>, RepositoryError> {
        Ok(self
            .versions
            .get(id)
            .and_then(|history| history.iter().find(|v| v.version == version).cloned()))
    }

    async fn list_versions(&self, id: &IdentityId) -> Result<Vec<IdentityVersion>, RepositoryError> {
        Ok(self
            .versions
            .get(id)
            .map(|history| history.value().clone())
            .unwrap_or_default())
    }
}
