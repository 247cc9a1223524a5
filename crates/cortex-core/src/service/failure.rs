//! Failure memory service.
//!
//! Records past mistakes as patterns and checks incoming requests against
//! the active ones. Hard matches block; soft matches are only surfaced.

use chrono::Utc;
use tracing::{debug, info, warn};

use cortex_types::config::FailureConfig;
use cortex_types::error::{FailureError, ValidationError};
use cortex_types::failure::{
    BlockingCheck, FailurePattern, PatternId, PatternMatch, PatternQuery, PatternRetrieval,
    RecordFailureRequest, ScoredPattern, Severity,
};
use cortex_types::normalize_tags;

use crate::dedup::{Recorded, find_or_create};
use crate::repository::failure::FailurePatternRepository;
use crate::similarity::{SimilarityScorer, rank_items};

fn pattern_text(pattern: &FailurePattern) -> &str {
    &pattern.pattern
}

pub struct FailureMemoryService<F: FailurePatternRepository, S: SimilarityScorer> {
    repo: F,
    scorer: S,
    config: FailureConfig,
}

impl<F: FailurePatternRepository, S: SimilarityScorer> FailureMemoryService<F, S> {
    pub fn new(repo: F, scorer: S, config: FailureConfig) -> Self {
        Self {
            repo,
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &FailureConfig {
        &self.config
    }

    /// Record an occurrence, folding it into the most similar stored pattern
    /// (active or not) when one reaches the duplicate threshold.
    pub async fn record(
        &self,
        request: RecordFailureRequest,
    ) -> Result<Recorded<FailurePattern>, FailureError> {
        let mut err = ValidationError::new();
        err.require_non_empty("pattern", &request.pattern);
        err.require_non_empty("context", &request.context);
        err.require_non_empty("reason", &request.reason);
        err.require_tags("tags", &request.tags);
        err.into_result()?;

        let now = Utc::now();
        let text = request.pattern.trim().to_string();
        let severity = request.severity;

        let recorded = find_or_create(
            &self.repo,
            &self.scorer,
            &text,
            self.config.duplicate_threshold,
            pattern_text,
            |mut existing| {
                existing.record_occurrence(severity, now);
                existing
            },
            || FailurePattern {
                id: PatternId::new(),
                pattern: text.clone(),
                context: request.context.trim().to_string(),
                severity,
                occurrence_count: 1,
                created_at: now,
                last_occurred_at: now,
                reason: request.reason.trim().to_string(),
                tags: normalize_tags(&request.tags),
                active: true,
            },
        )
        .await?;

        match &recorded {
            Recorded::Created(p) => {
                info!(pattern_id = %p.id, severity = %p.severity, "recorded new failure pattern")
            }
            Recorded::Reinforced(p) => debug!(
                pattern_id = %p.id,
                occurrences = p.occurrence_count,
                severity = %p.severity,
                "record matched existing failure pattern"
            ),
        }
        Ok(recorded)
    }

    /// Check `text` (and optional `context`) against every active pattern.
    pub async fn check_blocking(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> Result<BlockingCheck, FailureError> {
        let mut matches: Vec<PatternMatch> = Vec::new();

        for pattern in self.repo.list_active().await? {
            let pattern_score = self.scorer.score(text, &pattern.pattern);
            let score = match context {
                Some(ctx) => {
                    let context_score = self.scorer.score(ctx, &pattern.context);
                    pattern_score.max((pattern_score + context_score) / 2.0)
                }
                None => pattern_score,
            };
            if score >= self.config.blocking_threshold {
                matches.push(PatternMatch { pattern, score });
            }
        }

        // Most frequent first; stable for equal counts.
        matches.sort_by(|a, b| b.pattern.occurrence_count.cmp(&a.pattern.occurrence_count));

        let has_hard = matches.iter().any(|m| m.pattern.severity == Severity::Hard);
        let severity = match (has_hard, matches.is_empty()) {
            (true, _) => Some(Severity::Hard),
            (false, false) => Some(Severity::Soft),
            (false, true) => None,
        };

        if has_hard {
            warn!(matched = matches.len(), "request matches a hard failure pattern");
        } else if !matches.is_empty() {
            debug!(matched = matches.len(), "request matches soft failure patterns");
        }

        Ok(BlockingCheck {
            blocked: has_hard,
            severity,
            matches,
        })
    }

    /// Active patterns whose text alone reaches the blocking threshold, best first.
    ///
    /// Inspection only; nothing is blocked.
    pub async fn get_matching_patterns(&self, text: &str) -> Result<Vec<PatternMatch>, FailureError> {
        let active = self.repo.list_active().await?;
        Ok(
            rank_items(&self.scorer, text, active, pattern_text, self.config.blocking_threshold)
                .into_iter()
                .map(|(pattern, score)| PatternMatch { pattern, score })
                .collect(),
        )
    }

    pub async fn get(&self, id: &PatternId) -> Result<Option<FailurePattern>, FailureError> {
        Ok(self.repo.get(id).await?)
    }

    async fn require(&self, id: &PatternId) -> Result<FailurePattern, FailureError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| FailureError::NotFound(id.to_string()))
    }

    async fn set_active(&self, id: &PatternId, active: bool) -> Result<FailurePattern, FailureError> {
        let mut pattern = self.require(id).await?;
        if pattern.active != active {
            pattern.active = active;
            self.repo.save(&pattern).await?;
        }
        info!(pattern_id = %id, active, "set failure pattern state");
        Ok(pattern)
    }

    pub async fn activate(&self, id: &PatternId) -> Result<FailurePattern, FailureError> {
        self.set_active(id, true).await
    }

    pub async fn deactivate(&self, id: &PatternId) -> Result<FailurePattern, FailureError> {
        self.set_active(id, false).await
    }

    pub async fn delete(&self, id: &PatternId) -> Result<(), FailureError> {
        if !self.repo.delete(id).await? {
            return Err(FailureError::NotFound(id.to_string()));
        }
        info!(pattern_id = %id, "deleted failure pattern");
        Ok(())
    }

    pub async fn retrieve(&self, query: PatternQuery) -> Result<PatternRetrieval, FailureError> {
        let mut err = ValidationError::new();
        if let Some(threshold) = query.similarity_threshold {
            err.require_unit_range("similarity_threshold", threshold);
        }
        err.require_tags("tags", &query.tags);
        err.into_result()?;

        let candidates = match (query.severity, query.active) {
            (Some(severity), _) => self.repo.list_by_severity(severity).await?,
            (None, Some(true)) => self.repo.list_active().await?,
            (None, _) => self.repo.list_all().await?,
        };
        let tags = normalize_tags(&query.tags);
        let filtered: Vec<FailurePattern> = candidates
            .into_iter()
            .filter(|p| p.has_all_tags(&tags))
            .filter(|p| query.active.is_none_or(|active| p.active == active))
            .filter(|p| query.min_occurrences.is_none_or(|min| p.occurrence_count >= min))
            .collect();

        let mut patterns: Vec<ScoredPattern> = match query.query.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let threshold = query
                    .similarity_threshold
                    .unwrap_or(self.config.similarity_threshold);
                rank_items(&self.scorer, text, filtered, pattern_text, threshold)
                    .into_iter()
                    .map(|(pattern, score)| ScoredPattern {
                        pattern,
                        score: Some(score),
                    })
                    .collect()
            }
            _ => filtered
                .into_iter()
                .map(|pattern| ScoredPattern {
                    pattern,
                    score: None,
                })
                .collect(),
        };

        let total_count = patterns.len();
        if let Some(limit) = query.limit {
            patterns.truncate(limit);
        }

        Ok(PatternRetrieval {
            patterns,
            total_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::EntityRepository;
    use crate::repository::in_memory::InMemoryRepository;
    use crate::similarity::TokenOverlapScorer;

    type Service = FailureMemoryService<InMemoryRepository<FailurePattern>, TokenOverlapScorer>;

    fn setup() -> (Service, InMemoryRepository<FailurePattern>) {
        let repo = InMemoryRepository::new();
        let svc = FailureMemoryService::new(
            repo.clone(),
            TokenOverlapScorer::new(),
            FailureConfig::default(),
        );
        (svc, repo)
    }

    fn request(pattern: &str, severity: Severity) -> RecordFailureRequest {
        RecordFailureRequest {
            pattern: pattern.to_string(),
            context: "deploy".to_string(),
            severity,
            reason: format!("{pattern} caused an outage"),
            tags: vec![],
        }
    }

    async fn record(svc: &Service, pattern: &str, severity: Severity) -> FailurePattern {
        svc.record(request(pattern, severity)).await.unwrap().into_entity()
    }

    #[tokio::test]
    async fn test_record_creates_active_pattern() {
        let (svc, _) = setup();
        let out = svc
            .record(request("skip database migrations", Severity::Soft))
            .await
            .unwrap();
        assert!(out.is_created());
        let p = out.entity();
        assert_eq!(p.occurrence_count, 1);
        assert!(p.active);
        assert_eq!(p.severity, Severity::Soft);
    }

    #[tokio::test]
    async fn test_record_rejects_blank_fields() {
        let (svc, _) = setup();
        let mut req = request(" ", Severity::Hard);
        req.context = String::new();
        req.reason = String::new();
        let err = svc.record(req).await.unwrap_err();
        let FailureError::Validation(v) = err else {
            panic!("expected validation error");
        };
        assert_eq!(v.violations.len(), 3);
    }

    #[tokio::test]
    async fn test_rerecord_increments_reactivates_and_upgrades() {
        let (svc, repo) = setup();
        let original = record(&svc, "delete the production bucket", Severity::Soft).await;
        svc.deactivate(&original.id).await.unwrap();

        let out = svc
            .record(request("Delete the production bucket", Severity::Hard))
            .await
            .unwrap();

        assert!(!out.is_created());
        let p = out.entity();
        assert_eq!(p.id, original.id);
        assert_eq!(p.occurrence_count, 2);
        assert!(p.active);
        assert_eq!(p.severity, Severity::Hard);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_soft_rerecord_does_not_downgrade() {
        let (svc, _) = setup();
        record(&svc, "force push to main", Severity::Hard).await;
        let p = record(&svc, "force push to main", Severity::Soft).await;
        assert_eq!(p.severity, Severity::Hard);
    }

    #[tokio::test]
    async fn test_hard_pattern_blocks_identical_text() {
        let (svc, _) = setup();
        record(&svc, "drop the users table", Severity::Hard).await;

        let check = svc.check_blocking("drop the users table", None).await.unwrap();
        assert!(check.blocked);
        assert_eq!(check.severity, Some(Severity::Hard));
        assert_eq!(check.matches.len(), 1);
    }

    #[tokio::test]
    async fn test_soft_pattern_matches_without_blocking() {
        let (svc, _) = setup();
        record(&svc, "deploy on friday afternoon", Severity::Soft).await;

        let check = svc
            .check_blocking("deploy on friday afternoon", None)
            .await
            .unwrap();
        assert!(!check.blocked);
        assert_eq!(check.severity, Some(Severity::Soft));
        assert_eq!(check.matches.len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_clean() {
        let (svc, _) = setup();
        record(&svc, "drop the users table", Severity::Hard).await;

        let check = svc.check_blocking("write release notes", None).await.unwrap();
        assert!(!check.blocked);
        assert!(check.severity.is_none());
        assert!(check.matches.is_empty());
    }

    #[tokio::test]
    async fn test_context_can_lift_score_over_threshold() {
        let (svc, _) = setup();
        // "rotate keys" vs "rotate api keys now": 2/4 = 0.5 on text alone.
        record(&svc, "rotate api keys now", Severity::Hard).await;

        let without = svc.check_blocking("rotate keys", None).await.unwrap();
        assert!(!without.blocked);

        // Identical context scores 1.0, lifting the average to 0.75.
        let with = svc.check_blocking("rotate keys", Some("deploy")).await.unwrap();
        assert!(with.blocked);
        assert!((with.matches[0].score - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_context_never_lowers_score() {
        let (svc, _) = setup();
        record(&svc, "drop the users table", Severity::Hard).await;
        let check = svc
            .check_blocking("drop the users table", Some("unrelated context"))
            .await
            .unwrap();
        assert!(check.blocked);
        assert_eq!(check.matches[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_matches_sorted_by_occurrence() {
        let (svc, repo) = setup();
        let rare = record(&svc, "truncate audit log", Severity::Soft).await;
        let mut frequent = record(&svc, "truncate audit log table", Severity::Hard).await;
        frequent.occurrence_count = 7;
        repo.save(&frequent).await.unwrap();

        let check = svc.check_blocking("truncate audit log", None).await.unwrap();
        assert_eq!(check.matches.len(), 2);
        assert_eq!(check.matches[0].pattern.id, frequent.id);
        assert_eq!(check.matches[1].pattern.id, rare.id);
        assert!(check.blocked);
    }

    #[tokio::test]
    async fn test_inactive_patterns_are_ignored() {
        let (svc, _) = setup();
        let p = record(&svc, "drop the users table", Severity::Hard).await;
        svc.deactivate(&p.id).await.unwrap();

        let check = svc.check_blocking("drop the users table", None).await.unwrap();
        assert!(!check.blocked);
        assert!(svc.get_matching_patterns("drop the users table").await.unwrap().is_empty());

        let reactivated = svc.activate(&p.id).await.unwrap();
        assert!(reactivated.active);
        assert_eq!(reactivated.occurrence_count, 1);
        assert!(svc.check_blocking("drop the users table", None).await.unwrap().blocked);
    }

    #[tokio::test]
    async fn test_get_matching_patterns_ranks_by_score() {
        let (svc, _) = setup();
        record(&svc, "disable tls verification globally", Severity::Soft).await;
        record(&svc, "disable tls verification", Severity::Hard).await;

        let matches = svc
            .get_matching_patterns("disable tls verification")
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].score, 1.0);
        assert_eq!(matches[0].pattern.pattern, "disable tls verification");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let (svc, _) = setup();
        let id = PatternId::new();
        assert!(matches!(svc.activate(&id).await, Err(FailureError::NotFound(_))));
        assert!(matches!(svc.deactivate(&id).await, Err(FailureError::NotFound(_))));
        assert!(matches!(svc.delete(&id).await, Err(FailureError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_retrieve_filters() {
        let (svc, repo) = setup();
        let hard = record(&svc, "rm -rf on the home directory", Severity::Hard).await;
        let soft = record(&svc, "skip code review", Severity::Soft).await;
        let mut frequent = record(&svc, "merge without green ci", Severity::Soft).await;
        frequent.occurrence_count = 4;
        repo.save(&frequent).await.unwrap();
        svc.deactivate(&soft.id).await.unwrap();

        let hard_only = svc
            .retrieve(PatternQuery {
                severity: Some(Severity::Hard),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hard_only.total_count, 1);
        assert_eq!(hard_only.patterns[0].pattern.id, hard.id);

        let active = svc
            .retrieve(PatternQuery {
                active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.total_count, 2);

        let inactive_soft = svc
            .retrieve(PatternQuery {
                severity: Some(Severity::Soft),
                active: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(inactive_soft.total_count, 1);
        assert_eq!(inactive_soft.patterns[0].pattern.id, soft.id);

        let repeated = svc
            .retrieve(PatternQuery {
                min_occurrences: Some(2),
                limit: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(repeated.patterns.len(), 1);
        assert_eq!(repeated.patterns[0].pattern.id, frequent.id);
    }
}
