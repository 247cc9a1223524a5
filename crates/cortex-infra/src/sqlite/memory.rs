//! SQLite distilled memory repository implementation.
//!
//! Implements `DistilledMemoryRepository` from `cortex-core` using sqlx with
//! split read/write pools. `list_by_type` uses the memory_type index; tag
//! filtering stays on the default scan.

use cortex_core::repository::EntityRepository;
use cortex_core::repository::memory::DistilledMemoryRepository;
use cortex_types::error::RepositoryError;
use cortex_types::memory::{DistilledMemory, MemoryId, MemoryType};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json};

/// SQLite-backed implementation of `DistilledMemoryRepository`.
pub struct SqliteDistilledMemoryRepository {
    pool: DatabasePool,
}

impl SqliteDistilledMemoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct MemoryRow {
    id: String,
    memory_type: String,
    content: String,
    confidence: f64,
    reinforcement_count: i64,
    created_at: String,
    last_reinforced_at: String,
    last_decay_at: String,
    decay_factor: f64,
    tags: String,
    source_context: Option<String>,
}

impl MemoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            memory_type: row.try_get("memory_type")?,
            content: row.try_get("content")?,
            confidence: row.try_get("confidence")?,
            reinforcement_count: row.try_get("reinforcement_count")?,
            created_at: row.try_get("created_at")?,
            last_reinforced_at: row.try_get("last_reinforced_at")?,
            last_decay_at: row.try_get("last_decay_at")?,
            decay_factor: row.try_get("decay_factor")?,
            tags: row.try_get("tags")?,
            source_context: row.try_get("source_context")?,
        })
    }

    fn into_memory(self) -> Result<DistilledMemory, RepositoryError> {
        Ok(DistilledMemory {
            id: self
                .id
                .parse::<MemoryId>()
                .map_err(|e| RepositoryError::Query(format!("invalid memory id: {e}")))?,
            memory_type: self
                .memory_type
                .parse()
                .map_err(|e: String| RepositoryError::Query(e))?,
            content: self.content,
            confidence: self.confidence,
            reinforcement_count: u32::try_from(self.reinforcement_count)
                .map_err(|e| RepositoryError::Query(format!("invalid reinforcement_count: {e}")))?,
            created_at: parse_datetime(&self.created_at)?,
            last_reinforced_at: parse_datetime(&self.last_reinforced_at)?,
            last_decay_at: parse_datetime(&self.last_decay_at)?,
            decay_factor: self.decay_factor,
            tags: from_json("tags", &self.tags)?,
            source_context: self.source_context,
        })
    }
}

fn rows_to_memories(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<DistilledMemory>, RepositoryError> {
    rows.iter()
        .map(|row| MemoryRow::from_row(row).map_err(query_error)?.into_memory())
        .collect()
}

impl EntityRepository for SqliteDistilledMemoryRepository {
    type Entity = DistilledMemory;

    async fn save(&self, memory: &DistilledMemory) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO distilled_memories
                   (id, memory_type, content, confidence, reinforcement_count, created_at,
                    last_reinforced_at, last_decay_at, decay_factor, tags, source_context)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (id) DO UPDATE SET
                   memory_type = excluded.memory_type,
                   content = excluded.content,
                   confidence = excluded.confidence,
                   reinforcement_count = excluded.reinforcement_count,
                   created_at = excluded.created_at,
                   last_reinforced_at = excluded.last_reinforced_at,
                   last_decay_at = excluded.last_decay_at,
                   decay_factor = excluded.decay_factor,
                   tags = excluded.tags,
                   source_context = excluded.source_context"#,
        )
        .bind(memory.id.to_string())
        .bind(memory.memory_type.to_string())
        .bind(&memory.content)
        .bind(memory.confidence)
        .bind(i64::from(memory.reinforcement_count))
        .bind(format_datetime(&memory.created_at))
        .bind(format_datetime(&memory.last_reinforced_at))
        .bind(format_datetime(&memory.last_decay_at))
        .bind(memory.decay_factor)
        .bind(to_json(&memory.tags)?)
        .bind(&memory.source_context)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get(&self, id: &MemoryId) -> Result<Option<DistilledMemory>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM distilled_memories WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(MemoryRow::from_row(&row).map_err(query_error)?.into_memory()?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<DistilledMemory>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM distilled_memories ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows_to_memories(&rows)
    }

    async fn delete(&self, id: &MemoryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM distilled_memories WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

impl DistilledMemoryRepository for SqliteDistilledMemoryRepository {
    async fn list_by_type(&self, memory_type: MemoryType) -> Result<Vec<DistilledMemory>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM distilled_memories WHERE memory_type = ? ORDER BY id ASC")
            .bind(memory_type.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows_to_memories(&rows)
    }

    async fn list_by_tags(&self, tags: &[String]) -> Result<Vec<DistilledMemory>, RepositoryError> {
        // Keep rows where no requested tag is missing from the stored array.
        let rows = sqlx::query(
            r#"SELECT * FROM distilled_memories
               WHERE NOT EXISTS (
                   SELECT 1 FROM json_each(?) AS wanted
                   WHERE wanted.value NOT IN (SELECT value FROM json_each(distilled_memories.tags))
               )
               ORDER BY id ASC"#,
        )
        .bind(to_json(tags)?)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;
        rows_to_memories(&rows)
    }
}
