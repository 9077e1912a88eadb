//! Background chart refresh and cached result eviction.
//!
//! Two independent loops share one [`ArtifactStore`]:
//!
//! * [`RefreshScheduler`] dispatches recomputes for charts whose auto-refresh
//!   interval has elapsed.
//! * [`EvictionSweeper`] purges cached query results that are too old or were
//!   never completed, along with their payload files.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod recompute;
pub mod scheduler;
pub mod storage;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SchedulerConfig, SweeperConfig};
pub use dispatch::{DispatchOutcome, Dispatcher, OverlapPolicy};
pub use error::{ConfigError, FileDeleteError, RecomputeError, StoreError};
pub use lifecycle::TaskHandle;
pub use models::{CachedArtifact, ChartId, RefreshPolicy};
pub use recompute::{CommandOrchestrator, HttpOrchestrator, RecomputeOrchestrator};
pub use scheduler::{RefreshScheduler, TickReport};
pub use storage::ArtifactStore;
pub use storage::memory::MemoryStore;
pub use storage::sqlite::SqliteStore;
pub use sweeper::{EvictionSweeper, SweepReport};

pub mod prelude {
    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::dispatch::*;
    pub use crate::models::*;
    pub use crate::recompute::RecomputeOrchestrator;
    pub use crate::scheduler::*;
    pub use crate::storage::ArtifactStore;
    pub use crate::sweeper::*;
}
