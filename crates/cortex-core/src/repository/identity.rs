//! Identity repository trait definition.

use std::future::Future;

use cortex_types::error::RepositoryError;
use cortex_types::identity::{Identity, IdentityId, IdentityVersion};

use super::EntityRepository;

/// Repository for live identity records plus their append-only version history.
///
/// `delete` removes the live record and its entire history.
pub trait IdentityRepository: EntityRepository<Entity = Identity> {
    /// Persist a new version: the snapshot plus the live record it mirrors.
    ///
    /// The `(identity_id, version)` key is the optimistic lock. When the
    /// snapshot conflicts the live record must be left untouched.
    fn commit_version(
        &self,
        identity: &Identity,
        version: &IdentityVersion,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        async move {
            self.save_version(version).await?;
            self.save(identity).await
        }
    }

    /// Append a version snapshot. Fails with `Conflict` if that version already exists.
    fn save_version(
        &self,
        version: &IdentityVersion,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get_version(
        &self,
        id: &IdentityId,
        version: u32,
    ) -> impl Future<Output = Result<Option<IdentityVersion>, RepositoryError>> + Send;

    /// All versions of an identity, ascending by version number.
    fn list_versions(
        &self,
        id: &IdentityId,
    ) -> impl Future<Output = Result<Vec<IdentityVersion>, RepositoryError>> + Send;
}
