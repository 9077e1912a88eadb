//! Chart refresh scheduler
//!
//! Every tick rescans the enabled refresh policies, dispatches a recompute for
//! each chart that is due and stamps the chart's `last_refreshed_at` with the
//! tick time. The stamp does not wait for, or depend on, the recompute result:
//! a chart whose recompute fails is retried on its next due cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::lifecycle::{TaskHandle, spawn_periodic};
use crate::storage::ArtifactStore;

/// Summary of one scheduler tick
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub at: Option<DateTime<Utc>>,
    /// The policy listing failed, so nothing was evaluated
    pub list_failed: bool,
    /// Policies with auto-refresh enabled
    pub enabled: usize,
    pub due: usize,
    pub dispatched: usize,
    /// Due charts left alone because a recompute is still running
    pub skipped_in_flight: usize,
    pub touch_failures: usize,
}

pub struct RefreshScheduler {
    store: Arc<dyn ArtifactStore>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            config,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Evaluate every enabled policy once and dispatch the due charts.
    ///
    /// Never fails: store and recompute errors are logged per chart and the
    /// remaining charts are still processed.
    pub async fn run_tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport {
            at: Some(now),
            ..Default::default()
        };

        let policies = match self.store.list_due_refresh_policies().await {
            Ok(policies) => policies,
            Err(e) => {
                error!(error = %e, "Failed to list refresh policies, skipping this tick");
                report.list_failed = true;
                return report;
            }
        };

        report.enabled = policies.len();
        if policies.is_empty() {
            debug!("No charts with auto-refresh enabled");
            return report;
        }

        for policy in policies.iter().filter(|p| p.is_due(now)) {
            report.due += 1;
            let chart_id = policy.chart_id;

            if self.dispatcher.dispatch(chart_id) == DispatchOutcome::AlreadyInFlight {
                debug!(chart_id = %chart_id, "Previous recompute still running, not re-dispatching");
                report.skipped_in_flight += 1;
                continue;
            }
            report.dispatched += 1;

            if let Err(e) = self.store.touch_last_refreshed(chart_id, now).await {
                warn!(chart_id = %chart_id, error = %e, "Failed to record chart refresh time");
                report.touch_failures += 1;
            }
        }

        if report.due > 0 {
            info!(
                enabled = report.enabled,
                due = report.due,
                dispatched = report.dispatched,
                skipped_in_flight = report.skipped_in_flight,
                touch_failures = report.touch_failures,
                "Chart refresh tick complete"
            );
        }

        report
    }

    /// Run one tick now, then keep ticking on the configured period.
    pub async fn start(self: Arc<Self>) -> TaskHandle {
        self.run_tick().await;

        let scheduler = Arc::clone(&self);
        spawn_periodic("refresh_scheduler", self.config.tick(), move || {
            let scheduler = Arc::clone(&scheduler);
            async move {
                scheduler.run_tick().await;
            }
        })
    }
}
