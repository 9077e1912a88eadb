//! Daemon configuration

use std::sync::Arc;

use anyhow::bail;
use chart_refresh::{
    CommandOrchestrator, HttpOrchestrator, OverlapPolicy, RecomputeOrchestrator, SchedulerConfig,
    SweeperConfig,
};
use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlapArg {
    /// Skip charts whose previous recompute is still running
    Skip,
    /// Re-dispatch even if a previous recompute is still running
    Allow,
}

impl From<OverlapArg> for OverlapPolicy {
    fn from(arg: OverlapArg) -> Self {
        match arg {
            OverlapArg::Skip => OverlapPolicy::Skip,
            OverlapArg::Allow => OverlapPolicy::Allow,
        }
    }
}

/// Chart refresh scheduler and cache eviction daemon
#[derive(Parser, Clone, Debug)]
#[command(name = "chart-refreshd")]
#[command(about = "Refreshes auto-updating charts and evicts stale cached query results")]
pub struct Config {
    /// Path to SQLite database
    #[arg(long, env = "CHART_REFRESH_DB_PATH", default_value = "charts.db")]
    pub db_path: String,

    /// Seconds between refresh scheduler ticks
    #[arg(long, env = "CHART_REFRESH_TICK_SECS", default_value = "60")]
    pub refresh_tick_secs: u64,

    /// Seconds between eviction sweeps
    #[arg(long, env = "CHART_REFRESH_SWEEP_TICK_SECS", default_value = "3600")]
    pub sweep_tick_secs: u64,

    /// Age in hours at which cached artifacts are evicted
    #[arg(long, env = "CHART_REFRESH_ARTIFACT_MAX_AGE_HOURS", default_value = "23")]
    pub artifact_max_age_hours: i64,

    /// Maximum chart recomputes running at once
    #[arg(long, env = "CHART_REFRESH_MAX_CONCURRENT", default_value = "8")]
    pub max_concurrent_recomputes: usize,

    /// What to do with a due chart whose last recompute has not finished
    #[arg(long, value_enum, default_value = "skip")]
    pub overlap_policy: OverlapArg,

    /// Program run to recompute a chart
    #[arg(long, env = "CHART_REFRESH_COMMAND", conflicts_with = "recompute_url")]
    pub recompute_program: Option<String>,

    /// Argument for the recompute program; `{chart_id}` is substituted (repeatable)
    #[arg(long = "recompute-arg", requires = "recompute_program", allow_hyphen_values = true)]
    pub recompute_args: Vec<String>,

    /// Base URL of the chart API; charts are refreshed via POST /api/v1/charts/{id}/update
    #[arg(long, env = "CHART_REFRESH_URL")]
    pub recompute_url: Option<String>,

    /// Time limit for a single recompute, in seconds
    #[arg(long, env = "CHART_REFRESH_TIMEOUT_SECS")]
    pub recompute_timeout_secs: Option<u64>,

    /// Seconds to wait for running recomputes on shutdown
    #[arg(long, default_value = "30")]
    pub shutdown_grace_secs: u64,

    /// Run one refresh tick and one sweep, then exit
    #[arg(long)]
    pub once: bool,

    /// Do not run the refresh scheduler
    #[arg(long)]
    pub no_scheduler: bool,

    /// Do not run the eviction sweeper
    #[arg(long)]
    pub no_sweeper: bool,
}

impl Config {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_secs: self.refresh_tick_secs,
            max_concurrent_recomputes: self.max_concurrent_recomputes,
            overlap_policy: self.overlap_policy.into(),
            recompute_timeout_secs: self.recompute_timeout_secs,
        }
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            tick_secs: self.sweep_tick_secs,
            max_age_hours: self.artifact_max_age_hours,
        }
    }

    pub fn build_orchestrator(&self) -> anyhow::Result<Arc<dyn RecomputeOrchestrator>> {
        if let Some(program) = &self.recompute_program {
            return Ok(Arc::new(CommandOrchestrator::new(
                program.clone(),
                self.recompute_args.clone(),
            )));
        }
        if let Some(url) = &self.recompute_url {
            let timeout = self.scheduler_config().recompute_timeout();
            return Ok(Arc::new(HttpOrchestrator::new(url, timeout)));
        }
        bail!("No recompute pipeline configured: pass --recompute-program or --recompute-url");
    }
}
