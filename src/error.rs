//! Error types for the refresh scheduler and eviction sweeper

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ChartId;

/// Failure reading or writing the artifact store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of the external recompute pipeline for one chart.
#[derive(Error, Debug)]
pub enum RecomputeError {
    #[error("Chart not found: {0}")]
    ChartNotFound(ChartId),

    #[error("Recompute pipeline failed for chart {chart_id}: {message}")]
    Pipeline { chart_id: ChartId, message: String },

    #[error("Failed to launch recompute for chart {chart_id}: {source}")]
    Spawn {
        chart_id: ChartId,
        #[source]
        source: std::io::Error,
    },

    #[error("Recompute for chart {0} timed out")]
    TimedOut(ChartId),

    #[error("Store error during recompute: {0}")]
    Store(#[from] StoreError),
}

/// A cached payload file could not be removed.
#[derive(Error, Debug)]
#[error("Failed to delete payload file {}: {source}", .path.display())]
pub struct FileDeleteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Invalid scheduler or sweeper configuration.
#[derive(Error, Debug)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type RecomputeResult<T> = std::result::Result<T, RecomputeError>;
