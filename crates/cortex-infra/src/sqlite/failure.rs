//! SQLite failure pattern repository implementation.
//!
//! Implements `FailurePatternRepository` from `cortex-core`. Severity and the
//! active flag are indexed, so both lookups are overridden with direct queries.

use cortex_core::repository::EntityRepository;
use cortex_core::repository::failure::FailurePatternRepository;
use cortex_types::error::RepositoryError;
use cortex_types::failure::{FailurePattern, PatternId, Severity};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json};

/// SQLite-backed implementation of `FailurePatternRepository`.
pub struct SqliteFailurePatternRepository {
    pool: DatabasePool,
}

impl SqliteFailurePatternRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct PatternRow {
    id: String,
    pattern: String,
    context: String,
    severity: String,
    occurrence_count: i64,
    created_at: String,
    last_occurred_at: String,
    reason: String,
    tags: String,
    active: i64,
}

impl PatternRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            pattern: row.try_get("pattern")?,
            context: row.try_get("context")?,
            severity: row.try_get("severity")?,
            occurrence_count: row.try_get("occurrence_count")?,
            created_at: row.try_get("created_at")?,
            last_occurred_at: row.try_get("last_occurred_at")?,
            reason: row.try_get("reason")?,
            tags: row.try_get("tags")?,
            active: row.try_get("active")?,
        })
    }

    fn into_pattern(self) -> Result<FailurePattern, RepositoryError> {
        Ok(FailurePattern {
            id: self
                .id
                .parse::<PatternId>()
                .map_err(|e| RepositoryError::Query(format!("invalid pattern id: {e}")))?,
            pattern: self.pattern,
            context: self.context,
            severity: self
                .severity
                .parse()
                .map_err(|e: String| RepositoryError::Query(e))?,
            occurrence_count: u32::try_from(self.occurrence_count)
                .map_err(|e| RepositoryError::Query(format!("invalid occurrence_count: {e}")))?,
            created_at: parse_datetime(&self.created_at)?,
            last_occurred_at: parse_datetime(&self.last_occurred_at)?,
            reason: self.reason,
            tags: from_json("tags", &self.tags)?,
            active: self.active != 0,
        })
    }
}

fn rows_to_patterns(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<FailurePattern>, RepositoryError> {
    rows.iter()
        .map(|row| PatternRow::from_row(row).map_err(query_error)?.into_pattern())
        .collect()
}

impl EntityRepository for SqliteFailurePatternRepository {
    type Entity = FailurePattern;

    async fn save(&self, pattern: &FailurePattern) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO failure_patterns
                   (id, pattern, context, severity, occurrence_count, created_at,
                    last_occurred_at, reason, tags, active)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (id) DO UPDATE SET
                   pattern = excluded.pattern,
                   context = excluded.context,
                   severity = excluded.severity,
                   occurrence_count = excluded.occurrence_count,
                   last_occurred_at = excluded.last_occurred_at,
                   reason = excluded.reason,
                   tags = excluded.tags,
                   active = excluded.active"#,
        )
        .bind(pattern.id.to_string())
        .bind(&pattern.pattern)
        .bind(&pattern.context)
        .bind(pattern.severity.to_string())
        .bind(i64::from(pattern.occurrence_count))
        .bind(format_datetime(&pattern.created_at))
        .bind(format_datetime(&pattern.last_occurred_at))
        .bind(&pattern.reason)
        .bind(to_json(&pattern.tags)?)
        .bind(i64::from(pattern.active))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get(&self, id: &PatternId) -> Result<Option<FailurePattern>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM failure_patterns WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(PatternRow::from_row(&row).map_err(query_error)?.into_pattern()?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<FailurePattern>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM failure_patterns ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows_to_patterns(&rows)
    }

    async fn delete(&self, id: &PatternId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM failure_patterns WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

impl FailurePatternRepository for SqliteFailurePatternRepository {
    async fn list_by_severity(&self, severity: Severity) -> Result<Vec<FailurePattern>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM failure_patterns WHERE severity = ? ORDER BY id ASC")
            .bind(severity.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows_to_patterns(&rows)
    }

    async fn list_active(&self) -> Result<Vec<FailurePattern>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM failure_patterns WHERE active = 1 ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows_to_patterns(&rows)
    }
}
