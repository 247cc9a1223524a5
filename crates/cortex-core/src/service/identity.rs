//! Identity management service.
//!
//! Creates identities at version 1 and applies updates as new versions,
//! each paired with an immutable snapshot. Nested elements always receive
//! fresh identifiers, even when their content is unchanged.

use chrono::Utc;
use tracing::info;

use cortex_types::error::{IdentityError, ValidationError};
use cortex_types::identity::{
    CreateIdentityRequest, INITIAL_CHANGE_REASON, Identity, IdentityId, IdentityVersion,
    UpdateIdentityRequest,
};

use crate::repository::identity::IdentityRepository;

/// Check every field of a full identity record, collecting all violations.
pub fn validate_identity(identity: &Identity) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();
    err.require_non_empty("name", &identity.name);

    for (i, value) in identity.values.iter().enumerate() {
        err.require_non_empty(format!("values[{i}].name"), &value.name);
        err.require_non_empty(format!("values[{i}].description"), &value.description);
    }
    for (i, invariant) in identity.invariants.iter().enumerate() {
        err.require_non_empty(format!("invariants[{i}].description"), &invariant.description);
        err.require_non_empty(format!("invariants[{i}].rule"), &invariant.rule);
        err.require_non_empty(format!("invariants[{i}].rationale"), &invariant.rationale);
    }
    for (i, style) in identity.style_constraints.iter().enumerate() {
        err.require_non_empty(format!("style_constraints[{i}].aspect"), &style.aspect);
        err.require_non_empty(format!("style_constraints[{i}].constraint"), &style.constraint);
    }

    err.into_result()
}

/// Service owning the identity lifecycle.
pub struct IdentityService<I: IdentityRepository> {
    repo: I,
}

impl<I: IdentityRepository> IdentityService<I> {
    pub fn new(repo: I) -> Self {
        Self { repo }
    }

    /// Create a new identity at version 1 with an "initial" snapshot.
    pub async fn create(&self, request: CreateIdentityRequest) -> Result<Identity, IdentityError> {
        let now = Utc::now();
        let identity = Identity {
            id: IdentityId::new(),
            name: request.name.trim().to_string(),
            description: request.description,
            values: request.values.into_iter().map(|v| v.into_value()).collect(),
            invariants: request
                .invariants
                .into_iter()
                .map(|i| i.into_invariant())
                .collect(),
            style_constraints: request
                .style_constraints
                .into_iter()
                .map(|s| s.into_style_constraint())
                .collect(),
            risk_posture: request.risk_posture,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        validate_identity(&identity)?;

        self.commit(&identity, INITIAL_CHANGE_REASON).await?;
        info!(identity_id = %identity.id, name = %identity.name, "created identity");
        Ok(identity)
    }

    /// Apply an update as a new version.
    ///
    /// Omitted fields carry over; present collections are replaced wholesale.
    pub async fn update(
        &self,
        id: &IdentityId,
        request: UpdateIdentityRequest,
    ) -> Result<Identity, IdentityError> {
        let mut err = ValidationError::new();
        err.require_non_empty("change_reason", &request.change_reason);
        err.into_result()?;

        let current = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;

        let mut next = current.clone();
        if let Some(name) = request.name {
            next.name = name.trim().to_string();
        }
        if let Some(description) = request.description {
            next.description = description;
        }
        if let Some(values) = request.values {
            next.values = values.into_iter().map(|v| v.into_value()).collect();
        }
        if let Some(invariants) = request.invariants {
            next.invariants = invariants.into_iter().map(|i| i.into_invariant()).collect();
        }
        if let Some(style) = request.style_constraints {
            next.style_constraints = style
                .into_iter()
                .map(|s| s.into_style_constraint())
                .collect();
        }
        if let Some(posture) = request.risk_posture {
            next.risk_posture = posture;
        }
        next.version = current.version + 1;
        next.updated_at = Utc::now();
        validate_identity(&next)?;

        self.commit(&next, request.change_reason.trim()).await?;
        info!(
            identity_id = %next.id,
            version = next.version,
            reason = %request.change_reason.trim(),
            "updated identity"
        );
        Ok(next)
    }

    /// Persist the snapshot and live record together. A concurrent update
    /// that already claimed this version number surfaces as `Conflict`.
    async fn commit(&self, identity: &Identity, reason: &str) -> Result<(), IdentityError> {
        let snapshot = IdentityVersion {
            identity_id: identity.id.clone(),
            version: identity.version,
            snapshot: identity.clone(),
            change_reason: reason.to_string(),
            created_at: identity.updated_at,
        };
        self.repo.commit_version(identity, &snapshot).await?;
        Ok(())
    }

    pub async fn load(&self, id: &IdentityId) -> Result<Option<Identity>, IdentityError> {
        Ok(self.repo.get(id).await?)
    }

    /// The snapshot at `version`, or `None` if that version was never written.
    pub async fn get_version(
        &self,
        id: &IdentityId,
        version: u32,
    ) -> Result<Option<IdentityVersion>, IdentityError> {
        Ok(self.repo.get_version(id, version).await?)
    }

    /// All snapshots, oldest first.
    pub async fn get_version_history(
        &self,
        id: &IdentityId,
    ) -> Result<Vec<IdentityVersion>, IdentityError> {
        Ok(self.repo.list_versions(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Identity>, IdentityError> {
        Ok(self.repo.list_all().await?)
    }

    /// Remove the live record and its entire version history.
    pub async fn delete(&self, id: &IdentityId) -> Result<(), IdentityError> {
        if !self.repo.delete(id).await? {
            return Err(IdentityError::NotFound(id.to_string()));
        }
        info!(identity_id = %id, "deleted identity");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::EntityRepository;
    use crate::repository::in_memory::InMemoryIdentityRepository;
    use cortex_types::error::RepositoryError;
    use cortex_types::identity::{InvariantInput, RiskPosture, StyleConstraintInput, ValueInput};

    fn service() -> IdentityService<InMemoryIdentityRepository> {
        IdentityService::new(InMemoryIdentityRepository::new())
    }

    fn request() -> CreateIdentityRequest {
        CreateIdentityRequest {
            name: "Atlas".to_string(),
            description: Some("Careful infrastructure assistant".to_string()),
            values: vec![ValueInput {
                name: "safety".to_string(),
                description: "Never take irreversible actions silently".to_string(),
                priority: 5,
            }],
            invariants: vec![InvariantInput {
                description: "Backups first".to_string(),
                rule: "Take a backup before destructive changes".to_string(),
                rationale: "Restores must always be possible".to_string(),
            }],
            style_constraints: vec![StyleConstraintInput {
                aspect: "tone".to_string(),
                constraint: "concise".to_string(),
            }],
            risk_posture: RiskPosture::Conservative,
        }
    }

    fn reason(text: &str) -> UpdateIdentityRequest {
        UpdateIdentityRequest {
            change_reason: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_starts_at_version_one() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();
        assert_eq!(identity.version, 1);

        let history = svc.get_version_history(&identity.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].change_reason, "initial");
        assert_eq!(history[0].snapshot, identity);
    }

    #[tokio::test]
    async fn test_create_reports_every_violation() {
        let svc = service();
        let mut req = request();
        req.name = "  ".to_string();
        req.values[0].description = String::new();
        req.invariants[0].rationale = String::new();
        req.style_constraints[0].aspect = String::new();

        let err = svc.create(req).await.unwrap_err();
        let IdentityError::Validation(v) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = v.violations.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "name",
                "values[0].description",
                "invariants[0].rationale",
                "style_constraints[0].aspect"
            ]
        );
        assert!(svc.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_increments_version_and_history() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();

        let v2 = svc.update(&identity.id, reason("first tweak")).await.unwrap();
        let v3 = svc.update(&identity.id, reason("second tweak")).await.unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v3.version, 3);

        let history = svc.get_version_history(&identity.id).await.unwrap();
        let versions: Vec<u32> = history.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(history[2].change_reason, "second tweak");
    }

    #[tokio::test]
    async fn test_update_carries_over_and_replaces() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();

        let mut update = reason("swap values");
        update.values = Some(vec![ValueInput {
            name: "safety".to_string(),
            description: "Never take irreversible actions silently".to_string(),
            priority: 5,
        }]);
        let next = svc.update(&identity.id, update).await.unwrap();

        // Identical content still gets a fresh id.
        assert_eq!(next.values[0].name, identity.values[0].name);
        assert_ne!(next.values[0].id, identity.values[0].id);
        // Omitted collections keep their ids.
        assert_eq!(next.invariants, identity.invariants);
        assert_eq!(next.style_constraints, identity.style_constraints);
        assert_eq!(next.risk_posture, RiskPosture::Conservative);
        assert_eq!(next.created_at, identity.created_at);
    }

    #[tokio::test]
    async fn test_update_clears_description() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();

        let mut update = reason("drop blurb");
        update.description = Some(None);
        let next = svc.update(&identity.id, update).await.unwrap();
        assert!(next.description.is_none());

        let kept = svc.update(&identity.id, reason("no change")).await.unwrap();
        assert!(kept.description.is_none());

        let v1 = svc.get_version(&identity.id, 1).await.unwrap().unwrap();
        assert_eq!(
            v1.snapshot.description.as_deref(),
            Some("Careful infrastructure assistant")
        );
    }

    #[tokio::test]
    async fn test_update_requires_reason() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();
        let err = svc.update(&identity.id, reason("   ")).await.unwrap_err();
        assert!(matches!(err, IdentityError::Validation(_)));
        assert_eq!(svc.load(&identity.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_update_revalidates_result() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();
        let mut update = reason("bad name");
        update.name = Some(String::new());
        let err = svc.update(&identity.id, update).await.unwrap_err();
        assert!(matches!(err, IdentityError::Validation(_)));
        assert_eq!(svc.get_version_history(&identity.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let svc = service();
        let err = svc.update(&IdentityId::new(), reason("x")).await.unwrap_err();
        assert!(matches!(err, IdentityError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_past_versions_are_unchanged() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();
        let mut update = reason("go aggressive");
        update.risk_posture = Some(RiskPosture::Aggressive);
        svc.update(&identity.id, update).await.unwrap();

        let v1 = svc.get_version(&identity.id, 1).await.unwrap().unwrap();
        assert_eq!(v1.snapshot.risk_posture, RiskPosture::Conservative);
        assert!(svc.get_version(&identity.id, 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_history() {
        let svc = service();
        let identity = svc.create(request()).await.unwrap();
        svc.delete(&identity.id).await.unwrap();

        assert!(svc.load(&identity.id).await.unwrap().is_none());
        assert!(svc.get_version_history(&identity.id).await.unwrap().is_empty());
        let err = svc.delete(&identity.id).await.unwrap_err();
        assert!(matches!(err, IdentityError::NotFound(_)));
    }

    /// Yields after every read so concurrent updates interleave.
    #[derive(Clone, Default)]
    struct YieldingRepo(InMemoryIdentityRepository);

    impl EntityRepository for YieldingRepo {
        type Entity = Identity;

        async fn save(&self, identity: &Identity) -> Result<(), RepositoryError> {
            self.0.save(identity).await
        }

        async fn get(&self, id: &IdentityId) -> Result<Option<Identity>, RepositoryError> {
            let found = self.0.get(id).await;
            tokio::task::yield_now().await;
            found
        }

        async fn list_all(&self) -> Result<Vec<Identity>, RepositoryError> {
            self.0.list_all().await
        }

        async fn delete(&self, id: &IdentityId) -> Result<bool, RepositoryError> {
            self.0.delete(id).await
        }
    }

    impl IdentityRepository for YieldingRepo {
        async fn save_version(&self, version: &IdentityVersion) -> Result<(), RepositoryError> {
            self.0.save_version(version).await
        }

        async fn get_version(
            &self,
            id: &IdentityId,
            version: u32,
        ) -> Result<Option<IdentityVersion>, RepositoryError> {
            self.0.get_version(id, version).await
        }

        async fn list_versions(
            &self,
            id: &IdentityId,
        ) -> Result<Vec<IdentityVersion>, RepositoryError> {
            self.0.list_versions(id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_live_and_snapshot_in_step() {
        let svc = IdentityService::new(YieldingRepo::default());
        let identity = svc.create(request()).await.unwrap();

        let mut first = reason("rename to A");
        first.name = Some("A".to_string());
        let mut second = reason("rename to B");
        second.name = Some("B".to_string());

        let (a, b) = tokio::join!(
            svc.update(&identity.id, first),
            svc.update(&identity.id, second)
        );
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(
            loser.unwrap_err(),
            IdentityError::Storage(RepositoryError::Conflict(_))
        ));

        let live = svc.load(&identity.id).await.unwrap().unwrap();
        let history = svc.get_version_history(&identity.id).await.unwrap();
        assert_eq!(live.version, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].snapshot, live);
    }
}
