//! Scheduler and sweeper tunables

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::dispatch::OverlapPolicy;
use crate::error::ConfigError;

/// Longest accepted tick period, one year
pub const MAX_TICK_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest accepted artifact lifetime, ten years
pub const MAX_ARTIFACT_AGE_HOURS: i64 = 10 * 365 * 24;

/// Refresh scheduler settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    pub tick_secs: u64,

    /// Maximum recomputes running at once
    pub max_concurrent_recomputes: usize,

    /// Whether a chart may be re-dispatched while its last recompute runs
    pub overlap_policy: OverlapPolicy,

    /// Per-recompute time limit in seconds; unlimited when unset
    pub recompute_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            max_concurrent_recomputes: 8,
            overlap_policy: OverlapPolicy::Skip,
            recompute_timeout_secs: None,
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn recompute_timeout(&self) -> Option<Duration> {
        self.recompute_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // tokio::time::interval panics on a zero period
        if self.tick_secs == 0 {
            return Err(ConfigError("scheduler tick_secs must be at least 1".into()));
        }
        if self.tick_secs > MAX_TICK_SECS {
            return Err(ConfigError(format!(
                "scheduler tick_secs must be at most {MAX_TICK_SECS}"
            )));
        }
        if self.max_concurrent_recomputes == 0 {
            return Err(ConfigError(
                "max_concurrent_recomputes must be at least 1".into(),
            ));
        }
        if self.max_concurrent_recomputes > Semaphore::MAX_PERMITS {
            return Err(ConfigError(format!(
                "max_concurrent_recomputes must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.recompute_timeout_secs == Some(0) {
            return Err(ConfigError(
                "recompute_timeout_secs must be at least 1 when set".into(),
            ));
        }
        if self.recompute_timeout_secs.is_some_and(|t| t > MAX_TICK_SECS) {
            return Err(ConfigError(format!(
                "recompute_timeout_secs must be at most {MAX_TICK_SECS}"
            )));
        }
        Ok(())
    }
}

/// Eviction sweeper settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    pub tick_secs: u64,

    /// Artifacts at least this old are evicted. One hour short of a day so an
    /// artifact written just before an hourly sweep still lives a full day.
    pub max_age_hours: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            tick_secs: 3600,
            max_age_hours: 23,
        }
    }
}

impl SweeperConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Saturates instead of panicking on out-of-range hours.
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.max_age_hours).unwrap_or(chrono::Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_secs == 0 {
            return Err(ConfigError("sweeper tick_secs must be at least 1".into()));
        }
        if self.tick_secs > MAX_TICK_SECS {
            return Err(ConfigError(format!(
                "sweeper tick_secs must be at most {MAX_TICK_SECS}"
            )));
        }
        if self.max_age_hours <= 0 {
            return Err(ConfigError("max_age_hours must be positive".into()));
        }
        if self.max_age_hours > MAX_ARTIFACT_AGE_HOURS {
            return Err(ConfigError(format!(
                "max_age_hours must be at most {MAX_ARTIFACT_AGE_HOURS}"
            )));
        }
        Ok(())
    }
}
