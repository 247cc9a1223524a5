//! SQLite identity repository implementation.
//!
//! Implements `IdentityRepository` from `cortex-core`. The live record is
//! upserted in place; snapshots go to the append-only `identity_versions`
//! table, which cascades on identity deletion.

use cortex_core::repository::EntityRepository;
use cortex_core::repository::identity::IdentityRepository;
use cortex_types::error::RepositoryError;
use cortex_types::identity::{
    Identity, IdentityId, IdentityValue, IdentityVersion, Invariant, RiskPosture, StyleConstraint,
};
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json};

/// SQLite-backed implementation of `IdentityRepository`.
pub struct SqliteIdentityRepository {
    pool: DatabasePool,
}

impl SqliteIdentityRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct IdentityRow {
    id: String,
    name: String,
    description: Option<String>,
    values_json: String,
    invariants_json: String,
    style_constraints_json: String,
    risk_posture: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl IdentityRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            values_json: row.try_get("values_json")?,
            invariants_json: row.try_get("invariants_json")?,
            style_constraints_json: row.try_get("style_constraints_json")?,
            risk_posture: row.try_get("risk_posture")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_identity(self) -> Result<Identity, RepositoryError> {
        let values: Vec<IdentityValue> = from_json("values_json", &self.values_json)?;
        let invariants: Vec<Invariant> = from_json("invariants_json", &self.invariants_json)?;
        let style_constraints: Vec<StyleConstraint> =
            from_json("style_constraints_json", &self.style_constraints_json)?;
        let risk_posture: RiskPosture = self
            .risk_posture
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(Identity {
            id: self
                .id
                .parse::<IdentityId>()
                .map_err(|e| RepositoryError::Query(format!("invalid identity id: {e}")))?,
            name: self.name,
            description: self.description,
            values,
            invariants,
            style_constraints,
            risk_posture,
            version: u32::try_from(self.version)
                .map_err(|e| RepositoryError::Query(format!("invalid version: {e}")))?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

const UPSERT_IDENTITY: &str = r#"INSERT INTO identities
                   (id, name, description, values_json, invariants_json, style_constraints_json,
                    risk_posture, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (id) DO UPDATE SET
                   name = excluded.name,
                   description = excluded.description,
                   values_json = excluded.values_json,
                   invariants_json = excluded.invariants_json,
                   style_constraints_json = excluded.style_constraints_json,
                   risk_posture = excluded.risk_posture,
                   version = excluded.version,
                   updated_at = excluded.updated_at"#;

const INSERT_VERSION: &str =
    "INSERT INTO identity_versions (identity_id, version, snapshot, change_reason, created_at)
     VALUES (?, ?, ?, ?, ?)";

// ON CONFLICT ... DO UPDATE, never INSERT OR REPLACE: a replace deletes the
// row first and would cascade away the version history.
async fn upsert_identity(
    conn: &mut SqliteConnection,
    identity: &Identity,
) -> Result<(), RepositoryError> {
    sqlx::query(UPSERT_IDENTITY)
        .bind(identity.id.to_string())
        .bind(&identity.name)
        .bind(&identity.description)
        .bind(to_json(&identity.values)?)
        .bind(to_json(&identity.invariants)?)
        .bind(to_json(&identity.style_constraints)?)
        .bind(identity.risk_posture.to_string())
        .bind(i64::from(identity.version))
        .bind(format_datetime(&identity.created_at))
        .bind(format_datetime(&identity.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(query_error)?;
    Ok(())
}

async fn insert_version(
    conn: &mut SqliteConnection,
    version: &IdentityVersion,
) -> Result<(), RepositoryError> {
    sqlx::query(INSERT_VERSION)
        .bind(version.identity_id.to_string())
        .bind(i64::from(version.version))
        .bind(to_json(&version.snapshot)?)
        .bind(&version.change_reason)
        .bind(format_datetime(&version.created_at))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::Conflict(format!(
                        "identity version {} already exists for identity {}",
                        version.version, version.identity_id
                    ));
                }
            }
            query_error(e)
        })?;
    Ok(())
}

fn row_to_version(row: &sqlx::sqlite::SqliteRow) -> Result<IdentityVersion, RepositoryError> {
    let identity_id: String = row.try_get("identity_id").map_err(query_error)?;
    let version: i64 = row.try_get("version").map_err(query_error)?;
    let snapshot: String = row.try_get("snapshot").map_err(query_error)?;
    let change_reason: String = row.try_get("change_reason").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;

    Ok(IdentityVersion {
        identity_id: identity_id
            .parse::<IdentityId>()
            .map_err(|e| RepositoryError::Query(format!("invalid identity id: {e}")))?,
        version: u32::try_from(version)
            .map_err(|e| RepositoryError::Query(format!("invalid version: {e}")))?,
        snapshot: from_json("snapshot", &snapshot)?,
        change_reason,
        created_at: parse_datetime(&created_at)?,
    })
}

impl EntityRepository for SqliteIdentityRepository {
    type Entity = Identity;

    async fn save(&self, identity: &Identity) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        upsert_identity(&mut conn, identity).await
    }

    async fn get(&self, id: &IdentityId) -> Result<Option<Identity>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM identities WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                IdentityRow::from_row(&row)
                    .map_err(query_error)?
                    .into_identity()?,
            )),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Identity>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM identities ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                IdentityRow::from_row(row)
                    .map_err(query_error)?
                    .into_identity()
            })
            .collect()
    }

    async fn delete(&self, id: &IdentityId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM identities WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}

impl IdentityRepository for SqliteIdentityRepository {
    async fn save_version(&self, version: &IdentityVersion) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        insert_version(&mut conn, version).await
    }

    async fn commit_version(
        &self,
        identity: &Identity,
        version: &IdentityVersion,
    ) -> Result<(), RepositoryError> {
        // The live row goes first so the snapshot's foreign key resolves on
        // create. A version conflict drops the transaction and rolls it back.
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        upsert_identity(&mut *tx, identity).await?;
        insert_version(&mut *tx, version).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn get_version(
        &self,
        id: &IdentityId,
        version: u32,
    ) -> Result<Option<IdentityVersion>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM identity_versions WHERE identity_id = ? AND version = ?")
            .bind(id.to_string())
            .bind(i64::from(version))
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(row_to_version).transpose()
    }

    async fn list_versions(&self, id: &IdentityId) -> Result<Vec<IdentityVersion>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM identity_versions WHERE identity_id = ? ORDER BY version ASC")
                .bind(id.to_string())
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_error)?;

        rows.iter().map(row_to_version).collect()
    }
}
