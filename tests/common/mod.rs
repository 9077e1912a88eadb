//! Shared fixtures for scheduler and sweeper tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chart_refresh::error::{RecomputeResult, StoreError, StoreResult};
use chart_refresh::prelude::*;
use chart_refresh::{MemoryStore, RecomputeError};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Fixed reference time for deterministic tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap()
}

/// Orchestrator that records every update call.
#[derive(Default)]
pub struct RecordingOrchestrator {
    calls: Mutex<Vec<ChartId>>,
    failing: Mutex<HashSet<ChartId>>,
    /// When set, each update waits for a permit before finishing.
    gate: Option<Arc<Semaphore>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl RecordingOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates block until the returned semaphore is given permits.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let orchestrator = Self {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        (orchestrator, gate)
    }

    pub fn fail_for(&self, chart_id: impl Into<ChartId>) {
        self.failing.lock().insert(chart_id.into());
    }

    pub fn calls(&self) -> Vec<ChartId> {
        let mut calls = self.calls.lock().clone();
        calls.sort();
        calls
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecomputeOrchestrator for RecordingOrchestrator {
    async fn update(&self, chart_id: ChartId) -> RecomputeResult<()> {
        self.calls.lock().push(chart_id);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(&chart_id) {
            return Err(RecomputeError::Pipeline {
                chart_id,
                message: "connector unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Memory store with injectable failures.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_list: Mutex<bool>,
    fail_touch: Mutex<HashSet<ChartId>>,
    fail_delete: Mutex<HashSet<Uuid>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_listing(&self) {
        *self.fail_list.lock() = true;
    }

    pub fn fail_touch_for(&self, chart_id: impl Into<ChartId>) {
        self.fail_touch.lock().insert(chart_id.into());
    }

    pub fn fail_delete_for(&self, id: Uuid) {
        self.fail_delete.lock().insert(id);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Internal(format!("injected {what} failure"))
    }
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    async fn list_due_refresh_policies(&self) -> StoreResult<Vec<RefreshPolicy>> {
        if *self.fail_list.lock() {
            return Err(Self::injected("list"));
        }
        self.inner.list_due_refresh_policies().await
    }

    async fn touch_last_refreshed(&self, chart_id: ChartId, at: DateTime<Utc>) -> StoreResult<()> {
        if self.fail_touch.lock().contains(&chart_id) {
            return Err(Self::injected("touch"));
        }
        self.inner.touch_last_refreshed(chart_id, at).await
    }

    async fn list_all_cached_artifacts(&self) -> StoreResult<Vec<CachedArtifact>> {
        if *self.fail_list.lock() {
            return Err(Self::injected("list"));
        }
        self.inner.list_all_cached_artifacts().await
    }

    async fn list_evictable_cached_artifacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<CachedArtifact>> {
        if *self.fail_list.lock() {
            return Err(Self::injected("list"));
        }
        self.inner.list_evictable_cached_artifacts(cutoff).await
    }

    async fn delete_cached_artifact(&self, id: Uuid) -> StoreResult<bool> {
        if self.fail_delete.lock().contains(&id) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete_cached_artifact(id).await
    }

    async fn upsert_refresh_policy(&self, policy: RefreshPolicy) -> StoreResult<()> {
        self.inner.upsert_refresh_policy(policy).await
    }

    async fn get_refresh_policy(&self, chart_id: ChartId) -> StoreResult<Option<RefreshPolicy>> {
        self.inner.get_refresh_policy(chart_id).await
    }

    async fn delete_refresh_policy(&self, chart_id: ChartId) -> StoreResult<bool> {
        self.inner.delete_refresh_policy(chart_id).await
    }

    async fn insert_cached_artifact(&self, artifact: CachedArtifact) -> StoreResult<()> {
        self.inner.insert_cached_artifact(artifact).await
    }
}
