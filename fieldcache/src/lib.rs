//! General design:
//! - Most things are async even if they don't need to be. Async propagates
//!   unfortunately: fetching from storage can suspend, so everything above it
//!   is async too.
//! - There is a high level interface per data domain, the cache façades
//!   [`cache::TimeSeriesCache`] and [`cache::HeatmapCache`]. They combine key
//!   encoding, version rotation, fuzzy location matching and staleness into
//!   save/lookup calls.
//! - Above the façades sits [`orchestrator::FetchOrchestrator`]: return the
//!   cached value immediately, refresh in the background when the entry is
//!   missing, stale or forced, de-duplicate concurrent fetches per key, and
//!   compute derived vegetation indices locally from cached raw bands.
//! - There is an abstract type for loading and saving cached payloads, split
//!   into the [`storage::RecordStorage`] and [`storage::FileStorage`] traits.
//!   We have one implementation over `object_store` covering the local
//!   filesystem and an in-memory store for tests.
//! - The persisted datastructures are concrete serde types in the
//!   [`mod@format`] module; nothing outside it touches raw JSON.

pub mod cache;
pub mod config;
pub mod format;
pub mod geometry;
pub mod indices;
pub mod locate;
pub mod orchestrator;
pub mod remote;
pub mod rotation;
pub mod staleness;
pub mod storage;
pub mod sweep;

pub use cache::{HeatmapCache, TimeSeriesCache};
pub use config::{CacheConfig, FetchConfig, SweepConfig};
pub use format::{
    CacheKey, CachedHeatmapEntry, CachedSeriesEntry, HeatmapResult, TimeSeriesResult,
    Trend,
};
pub use orchestrator::{
    FetchError, FetchOrchestrator, FetchOutcome, HeatmapOutcome, PendingFetch,
};
pub use remote::{AnalysisBackend, HttpAnalysisBackend, RemoteError};
pub use storage::{
    FileStorage, ObjectStorage, RecordStorage, StorageError, new_in_memory_storage,
    new_local_filesystem_storage,
};
pub use sweep::SweepScheduler;

/// Install a global tracing subscriber driven by `RUST_LOG`. Call once at
/// startup; later calls are ignored.
#[cfg(feature = "logs")]
pub fn initialize_logs() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
