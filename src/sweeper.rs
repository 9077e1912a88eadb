//! Cached artifact eviction

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::SweeperConfig;
use crate::error::FileDeleteError;
use crate::lifecycle::{TaskHandle, spawn_periodic};
use crate::storage::ArtifactStore;

/// Summary of one sweep
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub at: Option<DateTime<Utc>>,
    pub list_failed: bool,
    /// Artifacts matching the eviction predicate
    pub candidates: usize,
    /// Records removed from the store
    pub evicted: usize,
    pub files_deleted: usize,
    /// Payload files that were already gone
    pub files_missing: usize,
    pub file_errors: usize,
    pub record_errors: usize,
}

/// Remove a payload file. `Ok(false)` means there was nothing to remove.
pub async fn remove_payload_file(path: &Path) -> Result<bool, FileDeleteError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(FileDeleteError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub struct EvictionSweeper {
    store: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl EvictionSweeper {
    pub fn new(store: Arc<dyn ArtifactStore>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Evict artifacts that are too old or have no payload.
    ///
    /// Payload removal is best effort: the record is deleted even when its
    /// file cannot be, and one artifact's failure never stops the sweep.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let max_age = self.config.max_age();
        let mut report = SweepReport {
            at: Some(now),
            ..Default::default()
        };

        // Nothing can have aged out if the cutoff predates the representable range
        let cutoff = now.checked_sub_signed(max_age).unwrap_or_else(|| {
            warn!(
                ?max_age,
                "Artifact age limit exceeds the clock range, evicting only incomplete artifacts"
            );
            DateTime::<Utc>::MIN_UTC
        });

        let candidates = match self.store.list_evictable_cached_artifacts(cutoff).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Failed to list cached artifacts, skipping this sweep");
                report.list_failed = true;
                return report;
            }
        };

        for artifact in candidates.iter().filter(|a| a.is_evictable(now, max_age)) {
            report.candidates += 1;

            if let Some(path) = artifact.payload_path() {
                match remove_payload_file(path).await {
                    Ok(true) => report.files_deleted += 1,
                    Ok(false) => {
                        debug!(artifact_id = %artifact.id, path = %path.display(), "Payload file already gone");
                        report.files_missing += 1;
                    }
                    Err(e) => {
                        warn!(artifact_id = %artifact.id, error = %e, "Could not delete payload file");
                        report.file_errors += 1;
                    }
                }
            }

            match self.store.delete_cached_artifact(artifact.id).await {
                Ok(true) => report.evicted += 1,
                Ok(false) => debug!(artifact_id = %artifact.id, "Cached artifact already removed"),
                Err(e) => {
                    error!(artifact_id = %artifact.id, error = %e, "Failed to delete cached artifact");
                    report.record_errors += 1;
                }
            }
        }

        if report.candidates > 0 {
            info!(
                evicted = report.evicted,
                files_deleted = report.files_deleted,
                file_errors = report.file_errors,
                record_errors = report.record_errors,
                "Cleaned up {} cached artifacts",
                report.candidates
            );
        }

        report
    }

    /// Sweep now, then keep sweeping on the configured period.
    pub async fn start(self: Arc<Self>) -> TaskHandle {
        self.sweep().await;

        let sweeper = Arc::clone(&self);
        spawn_periodic("eviction_sweeper", self.config.tick(), move || {
            let sweeper = Arc::clone(&sweeper);
            async move {
                sweeper.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn remove_payload_file_reports_missing() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("payload.json");
        tokio::fs::write(&path, b"{}").await.unwrap();

        assert!(remove_payload_file(&path).await.unwrap());
        assert!(!path.exists());
        assert!(!remove_payload_file(&path).await.unwrap());
    }

    #[tokio::test]
    async fn remove_payload_file_rejects_directory() {
        let temp = tempdir().unwrap();
        let err = remove_payload_file(temp.path()).await.unwrap_err();
        assert_eq!(err.path, temp.path());
    }
}
