//! Chart refresh daemon
//!
//! Runs the chart refresh scheduler and the cache eviction sweeper against the
//! application's SQLite database until interrupted.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chart_refresh::{
    ArtifactStore, Clock, Dispatcher, EvictionSweeper, RefreshScheduler, SqliteStore, SystemClock,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chart_refresh=info,chart_refreshd=info".into()),
        )
        .init();

    // Parse CLI args
    let config = Config::parse();
    info!("Starting chart-refreshd v{}", env!("CARGO_PKG_VERSION"));

    let scheduler_config = config.scheduler_config();
    let sweeper_config = config.sweeper_config();
    scheduler_config.validate()?;
    sweeper_config.validate()?;

    // Initialize database
    let store = SqliteStore::new(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path))?;
    store
        .run_migrations()
        .await
        .context("failed to run migrations")?;
    let store: Arc<dyn ArtifactStore> = Arc::new(store);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let scheduler = if config.no_scheduler {
        info!("Refresh scheduler disabled");
        None
    } else {
        let orchestrator = config.build_orchestrator()?;
        let dispatcher = Dispatcher::new(
            orchestrator,
            scheduler_config.max_concurrent_recomputes,
            scheduler_config.overlap_policy,
            scheduler_config.recompute_timeout(),
        );
        info!(
            tick_secs = scheduler_config.tick_secs,
            max_concurrent = scheduler_config.max_concurrent_recomputes,
            overlap_policy = scheduler_config.overlap_policy.as_str(),
            "Refresh scheduler configured"
        );
        Some(Arc::new(RefreshScheduler::new(
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&clock),
            scheduler_config,
        )))
    };

    let sweeper = if config.no_sweeper {
        info!("Eviction sweeper disabled");
        None
    } else {
        info!(
            tick_secs = sweeper_config.tick_secs,
            max_age_hours = sweeper_config.max_age_hours,
            "Eviction sweeper configured"
        );
        Some(Arc::new(EvictionSweeper::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            sweeper_config,
        )))
    };

    let grace = Duration::from_secs(config.shutdown_grace_secs);

    if config.once {
        if let Some(scheduler) = &scheduler {
            let report = scheduler.run_tick().await;
            info!(?report, "Refresh tick finished");
        }
        if let Some(sweeper) = &sweeper {
            let report = sweeper.sweep().await;
            info!(?report, "Sweep finished");
        }
        drain(scheduler.as_deref(), grace).await;
        return Ok(());
    }

    // Both loops run their first pass before settling into their period
    let mut handles = Vec::new();
    if let Some(scheduler) = &scheduler {
        handles.push(Arc::clone(scheduler).start().await);
    }
    if let Some(sweeper) = &sweeper {
        handles.push(Arc::clone(sweeper).start().await);
    }

    shutdown_signal().await;
    info!("Shutdown requested");

    for handle in handles {
        handle.stop().await;
    }
    drain(scheduler.as_deref(), grace).await;

    info!("chart-refreshd stopped");
    Ok(())
}

/// Give dispatched recomputes a bounded chance to finish. Stragglers are
/// abandoned with the process; the next start re-evaluates due charts.
async fn drain(scheduler: Option<&RefreshScheduler>, grace: Duration) {
    let Some(scheduler) = scheduler else {
        return;
    };
    let dispatcher = scheduler.dispatcher();
    if dispatcher.in_flight() == 0 {
        return;
    }
    info!(in_flight = dispatcher.in_flight(), "Waiting for running recomputes");
    if !dispatcher.wait_idle(grace).await {
        warn!(
            in_flight = dispatcher.in_flight(),
            "Exiting with recomputes still running"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
