//! Fire-and-forget recompute dispatch
//!
//! Each dispatch runs in its own task. A semaphore caps how many recomputes
//! execute at once, and an in-flight set backs the overlap policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::RecomputeError;
use crate::models::ChartId;
use crate::recompute::RecomputeOrchestrator;

/// What to do when a chart is due again while its last recompute still runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Leave the chart alone until the running recompute finishes
    #[default]
    Skip,
    /// Dispatch again regardless
    Allow,
}

impl OverlapPolicy {
    pub fn as_str(&self) -> &str {
        match self {
            OverlapPolicy::Skip => "skip",
            OverlapPolicy::Allow => "allow",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    AlreadyInFlight,
}

struct Inner {
    orchestrator: Arc<dyn RecomputeOrchestrator>,
    permits: Semaphore,
    in_flight: Mutex<InFlight>,
    idle: Notify,
    timeout: Option<Duration>,
}

/// Queued or running recomputes, counted per chart
#[derive(Default)]
struct InFlight {
    charts: HashMap<ChartId, usize>,
    tasks: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
    overlap: OverlapPolicy,
}

impl Dispatcher {
    /// Create a new Dispatcher
    ///
    /// # Arguments
    /// * `orchestrator` - Pipeline that performs the recompute
    /// * `max_concurrent` - Maximum recomputes executing at once, clamped to
    ///   `1..=Semaphore::MAX_PERMITS`
    /// * `overlap` - Behavior for charts that are still being recomputed
    /// * `timeout` - Optional per-recompute time limit
    pub fn new(
        orchestrator: Arc<dyn RecomputeOrchestrator>,
        max_concurrent: usize,
        overlap: OverlapPolicy,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                permits: Semaphore::new(max_concurrent.clamp(1, Semaphore::MAX_PERMITS)),
                in_flight: Mutex::new(InFlight::default()),
                idle: Notify::new(),
                timeout,
            }),
            overlap,
        }
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.overlap
    }

    /// Number of dispatched recomputes not yet finished
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().tasks
    }

    pub fn is_in_flight(&self, chart_id: ChartId) -> bool {
        self.inner.in_flight.lock().charts.contains_key(&chart_id)
    }

    /// Start a recompute for `chart_id` without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, chart_id: ChartId) -> DispatchOutcome {
        {
            let mut in_flight = self.inner.in_flight.lock();
            if self.overlap == OverlapPolicy::Skip && in_flight.charts.contains_key(&chart_id) {
                return DispatchOutcome::AlreadyInFlight;
            }
            *in_flight.charts.entry(chart_id).or_insert(0) += 1;
            in_flight.tasks += 1;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = {
                // Closed semaphores never happen here; the permit is only a cap.
                let _permit = inner.permits.acquire().await.ok();
                let inner = Arc::clone(&inner);
                // Run in a nested task so a panicking orchestrator is contained
                tokio::spawn(async move { run_recompute(&inner, chart_id).await }).await
            };

            match result {
                Ok(Ok(())) => debug!(chart_id = %chart_id, "Chart recompute finished"),
                Ok(Err(e)) => warn!(chart_id = %chart_id, error = %e, "Chart recompute failed"),
                Err(e) => error!(chart_id = %chart_id, error = %e, "Chart recompute task panicked"),
            }

            inner.finish(chart_id);
        });

        DispatchOutcome::Dispatched
    }

    /// Wait until no recompute is in flight, or `timeout` elapses.
    ///
    /// Returns true if the dispatcher drained.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.inner.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, drained).await {
            Ok(()) => true,
            Err(_) => {
                info!(
                    in_flight = self.in_flight(),
                    "Recomputes still running after drain timeout"
                );
                false
            }
        }
    }
}

async fn run_recompute(inner: &Inner, chart_id: ChartId) -> Result<(), RecomputeError> {
    match inner.timeout {
        Some(limit) => tokio::time::timeout(limit, inner.orchestrator.update(chart_id))
            .await
            .map_err(|_| RecomputeError::TimedOut(chart_id))?,
        None => inner.orchestrator.update(chart_id).await,
    }
}

impl Inner {
    fn finish(&self, chart_id: ChartId) {
        let mut in_flight = self.in_flight.lock();
        in_flight.tasks = in_flight.tasks.saturating_sub(1);
        if let Some(count) = in_flight.charts.get_mut(&chart_id) {
            *count -= 1;
            if *count == 0 {
                in_flight.charts.remove(&chart_id);
            }
        }
        if in_flight.tasks == 0 {
            self.idle.notify_waiters();
        }
    }
}
