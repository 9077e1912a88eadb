//! SQLite storage backend

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{CachedArtifact, ChartId, RefreshPolicy};
use crate::storage::ArtifactStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

/// Fixed-width RFC 3339 so stored timestamps compare lexically in SQL.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Internal(format!("bad timestamp {raw:?}: {e}")))
}

impl SqliteStore {
    pub async fn new(path: &str) -> StoreResult<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS refresh_policies (
                chart_id INTEGER PRIMARY KEY,
                interval_seconds INTEGER NOT NULL DEFAULT 0,
                last_refreshed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_artifacts (
                id TEXT PRIMARY KEY,
                owner_ref TEXT NOT NULL,
                payload_location TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_refresh_policies_interval ON refresh_policies(interval_seconds)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cached_artifacts_created_at ON cached_artifacts(created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_policy(row: sqlx::sqlite::SqliteRow) -> StoreResult<RefreshPolicy> {
        let last_refreshed_str: String = row.try_get("last_refreshed_at")?;

        Ok(RefreshPolicy {
            chart_id: ChartId(row.try_get("chart_id")?),
            interval_seconds: row.try_get("interval_seconds")?,
            last_refreshed_at: decode_ts(&last_refreshed_str)?,
        })
    }

    fn row_to_artifact(row: sqlx::sqlite::SqliteRow) -> StoreResult<CachedArtifact> {
        let id_str: String = row.try_get("id")?;
        let created_at_str: String = row.try_get("created_at")?;

        Ok(CachedArtifact {
            id: Uuid::parse_str(&id_str).map_err(|e| StoreError::Internal(e.to_string()))?,
            owner_ref: row.try_get("owner_ref")?,
            payload_location: row.try_get("payload_location")?,
            created_at: decode_ts(&created_at_str)?,
        })
    }
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn list_due_refresh_policies(&self) -> StoreResult<Vec<RefreshPolicy>> {
        let rows = sqlx::query(
            r#"
            SELECT chart_id, interval_seconds, last_refreshed_at
            FROM refresh_policies
            WHERE interval_seconds > 0
            ORDER BY chart_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_policy).collect()
    }

    async fn touch_last_refreshed(&self, chart_id: ChartId, at: DateTime<Utc>) -> StoreResult<()> {
        let at_str = encode_ts(at);
        let result = sqlx::query(
            r#"
            UPDATE refresh_policies SET last_refreshed_at = ?
            WHERE chart_id = ? AND last_refreshed_at < ?
            "#,
        )
        .bind(&at_str)
        .bind(chart_id.0)
        .bind(&at_str)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.get_refresh_policy(chart_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("refresh policy {chart_id}")));
        }

        Ok(())
    }

    async fn list_all_cached_artifacts(&self) -> StoreResult<Vec<CachedArtifact>> {
        let rows = sqlx::query(
            "SELECT id, owner_ref, payload_location, created_at FROM cached_artifacts ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_artifact).collect()
    }

    async fn list_evictable_cached_artifacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<CachedArtifact>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_ref, payload_location, created_at
            FROM cached_artifacts
            WHERE payload_location IS NULL
               OR payload_location = ''
               OR created_at <= ?
            ORDER BY created_at
            "#,
        )
        .bind(encode_ts(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_artifact).collect()
    }

    async fn delete_cached_artifact(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cached_artifacts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_refresh_policy(&self, policy: RefreshPolicy) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_policies (chart_id, interval_seconds, last_refreshed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(chart_id) DO UPDATE SET
                interval_seconds = excluded.interval_seconds,
                last_refreshed_at = excluded.last_refreshed_at
            "#,
        )
        .bind(policy.chart_id.0)
        .bind(policy.interval_seconds)
        .bind(encode_ts(policy.last_refreshed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_refresh_policy(&self, chart_id: ChartId) -> StoreResult<Option<RefreshPolicy>> {
        let row = sqlx::query(
            "SELECT chart_id, interval_seconds, last_refreshed_at FROM refresh_policies WHERE chart_id = ?",
        )
        .bind(chart_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_policy).transpose()
    }

    async fn delete_refresh_policy(&self, chart_id: ChartId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM refresh_policies WHERE chart_id = ?")
            .bind(chart_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_cached_artifact(&self, artifact: CachedArtifact) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cached_artifacts (id, owner_ref, payload_location, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(artifact.id.to_string())
        .bind(&artifact.owner_ref)
        .bind(&artifact.payload_location)
        .bind(encode_ts(artifact.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
