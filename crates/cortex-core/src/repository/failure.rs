//! Failure pattern repository trait definition.

use std::future::Future;

use cortex_types::error::RepositoryError;
use cortex_types::failure::{FailurePattern, Severity};

use super::EntityRepository;

/// Repository for failure patterns.
///
/// The indexed lookups are retrieval optimizations; the defaults scan `list_all`.
pub trait FailurePatternRepository: EntityRepository<Entity = FailurePattern> {
    fn list_by_severity(
        &self,
        severity: Severity,
    ) -> impl Future<Output = Result<Vec<FailurePattern>, RepositoryError>> + Send {
        async move {
            let all = self.list_all().await?;
            Ok(all.into_iter().filter(|p| p.severity == severity).collect())
        }
    }

    /// Patterns eligible for matching.
    fn list_active(&self) -> impl Future<Output = Result<Vec<FailurePattern>, RepositoryError>> + Send {
        async move {
            let all = self.list_all().await?;
            Ok(all.into_iter().filter(|p| p.active).collect())
        }
    }
}
