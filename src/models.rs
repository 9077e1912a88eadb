//! Refresh policy and cached artifact records

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a chart owned by the chart-management subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartId(pub i64);

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChartId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Auto-update settings for one chart
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPolicy {
    /// Owning chart
    pub chart_id: ChartId,

    /// Refresh cadence; zero or less disables auto-refresh
    pub interval_seconds: i64,

    /// Time of the last dispatched recompute
    pub last_refreshed_at: DateTime<Utc>,
}

impl RefreshPolicy {
    pub fn new(chart_id: impl Into<ChartId>, interval_seconds: i64) -> Self {
        Self {
            chart_id: chart_id.into(),
            interval_seconds,
            last_refreshed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn last_refreshed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_refreshed_at = at;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_seconds > 0
    }

    /// When the next recompute becomes due, or `None` if auto-refresh is off.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }
        self.last_refreshed_at
            .checked_add_signed(Duration::seconds(self.interval_seconds))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due_at().is_some_and(|due| due <= now)
    }
}

/// A previously computed query result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub id: Uuid,

    /// Query or request this result belongs to (opaque here)
    pub owner_ref: String,

    /// Path of the file holding the serialized result, if any
    pub payload_location: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl CachedArtifact {
    pub fn new(owner_ref: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_ref: owner_ref.into(),
            payload_location: None,
            created_at,
        }
    }

    pub fn payload(mut self, location: impl Into<String>) -> Self {
        self.payload_location = Some(location.into());
        self
    }

    /// Payload file path, treating an empty location as absent.
    pub fn payload_path(&self) -> Option<&Path> {
        self.payload_location
            .as_deref()
            .filter(|loc| !loc.is_empty())
            .map(Path::new)
    }

    /// Incomplete artifacts have no payload and are always evictable.
    pub fn is_incomplete(&self) -> bool {
        self.payload_path().is_none()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }

    pub fn is_evictable(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.is_incomplete() || self.age(now) >= max_age
    }
}
