//! In-memory storage backend for testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{CachedArtifact, ChartId, RefreshPolicy};
use crate::storage::ArtifactStore;

/// In-memory artifact store for testing
#[derive(Default)]
pub struct MemoryStore {
    policies: DashMap<ChartId, RefreshPolicy>,
    artifacts: DashMap<Uuid, CachedArtifact>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn list_due_refresh_policies(&self) -> StoreResult<Vec<RefreshPolicy>> {
        let mut policies: Vec<RefreshPolicy> = self
            .policies
            .iter()
            .filter(|entry| entry.value().is_enabled())
            .map(|entry| entry.value().clone())
            .collect();
        policies.sort_by_key(|p| p.chart_id);
        Ok(policies)
    }

    async fn touch_last_refreshed(&self, chart_id: ChartId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut entry = self
            .policies
            .get_mut(&chart_id)
            .ok_or_else(|| StoreError::NotFound(format!("refresh policy {chart_id}")))?;

        let policy = entry.value_mut();
        if at > policy.last_refreshed_at {
            policy.last_refreshed_at = at;
        }
        Ok(())
    }

    async fn list_all_cached_artifacts(&self) -> StoreResult<Vec<CachedArtifact>> {
        let mut artifacts: Vec<CachedArtifact> =
            self.artifacts.iter().map(|e| e.value().clone()).collect();
        artifacts.sort_by_key(|a| a.created_at);
        Ok(artifacts)
    }

    async fn list_evictable_cached_artifacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<CachedArtifact>> {
        let mut artifacts: Vec<CachedArtifact> = self
            .artifacts
            .iter()
            .filter(|e| {
                let artifact = e.value();
                artifact.is_incomplete() || artifact.created_at <= cutoff
            })
            .map(|e| e.value().clone())
            .collect();
        artifacts.sort_by_key(|a| a.created_at);
        Ok(artifacts)
    }

    async fn delete_cached_artifact(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.artifacts.remove(&id).is_some())
    }

    async fn upsert_refresh_policy(&self, policy: RefreshPolicy) -> StoreResult<()> {
        self.policies.insert(policy.chart_id, policy);
        Ok(())
    }

    async fn get_refresh_policy(&self, chart_id: ChartId) -> StoreResult<Option<RefreshPolicy>> {
        Ok(self.policies.get(&chart_id).map(|p| p.clone()))
    }

    async fn delete_refresh_policy(&self, chart_id: ChartId) -> StoreResult<bool> {
        Ok(self.policies.remove(&chart_id).is_some())
    }

    async fn insert_cached_artifact(&self, artifact: CachedArtifact) -> StoreResult<()> {
        self.artifacts.insert(artifact.id, artifact);
        Ok(())
    }
}
