//! Artifact storage backends

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{CachedArtifact, ChartId, RefreshPolicy};

/// Persistence port for refresh policies and cached artifacts.
///
/// Every call goes to the backing store; implementations keep no cache of
/// their own so that redundant scheduler instances agree on due state.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// All policies with auto-refresh enabled (`interval_seconds > 0`)
    async fn list_due_refresh_policies(&self) -> StoreResult<Vec<RefreshPolicy>>;

    /// Record a dispatch time. Older timestamps than the stored one are ignored.
    async fn touch_last_refreshed(&self, chart_id: ChartId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Every cached artifact record
    async fn list_all_cached_artifacts(&self) -> StoreResult<Vec<CachedArtifact>>;

    /// Artifacts created at or before `cutoff`, or with no payload
    async fn list_evictable_cached_artifacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<CachedArtifact>>;

    /// Remove an artifact record. Returns false if it was already gone.
    async fn delete_cached_artifact(&self, id: Uuid) -> StoreResult<bool>;

    /// Create or replace a chart's refresh policy
    async fn upsert_refresh_policy(&self, policy: RefreshPolicy) -> StoreResult<()>;

    async fn get_refresh_policy(&self, chart_id: ChartId) -> StoreResult<Option<RefreshPolicy>>;

    /// Drop a policy when its chart is deleted
    async fn delete_refresh_policy(&self, chart_id: ChartId) -> StoreResult<bool>;

    async fn insert_cached_artifact(&self, artifact: CachedArtifact) -> StoreResult<()>;
}
