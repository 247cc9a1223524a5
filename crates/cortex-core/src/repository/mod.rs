//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (cortex-infra) implements. The core crate never depends on any specific
//! storage technology. Every store supports at least save/get/list_all/delete;
//! entity-specific traits add indexed lookups with default implementations
//! that fall back to `list_all`, so a minimal adapter is always correct.

pub mod failure;
pub mod identity;
pub mod in_memory;
pub mod memory;

use std::future::Future;

use cortex_types::entity::Entity;
use cortex_types::error::RepositoryError;

/// Minimal persistence contract shared by every entity kind.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait EntityRepository: Send + Sync {
    type Entity: Entity;

    /// Idempotent upsert by id.
    fn save(
        &self,
        entity: &Self::Entity,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &<Self::Entity as Entity>::Id,
    ) -> impl Future<Output = Result<Option<Self::Entity>, RepositoryError>> + Send;

    /// All entities in creation order.
    fn list_all(&self) -> impl Future<Output = Result<Vec<Self::Entity>, RepositoryError>> + Send;

    /// Returns `false` if the id was unknown.
    fn delete(
        &self,
        id: &<Self::Entity as Entity>::Id,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}
