use std::time::Duration;

use crate::staleness;

/// Tuning for the cache façades.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Age at which a cached series is considered stale.
    pub revisit_interval: chrono::Duration,
    /// Entries kept in the in-memory layer in front of the disk tier.
    pub mem_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { revisit_interval: staleness::revisit_interval(), mem_cache_size: 64 }
    }
}

/// Parameters sent with every remote analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub field_size_hectares: f64,
    pub days_history: u32,
    pub days_forecast: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { field_size_hectares: 10.0, days_history: 365, days_forecast: 30 }
    }
}

/// Tuning for the background sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Pause between sweeps.
    pub interval: Duration,
    /// Pause between consecutive refreshes within one sweep, to avoid
    /// hammering the analysis backend.
    pub request_delay: Duration,
    /// Overall time limit for one sweep; once exceeded no further refreshes
    /// are issued.
    pub deadline: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(
                staleness::REVISIT_INTERVAL_DAYS as u64 * 24 * 60 * 60,
            ),
            request_delay: Duration::from_secs(2),
            deadline: Duration::from_secs(10 * 60),
        }
    }
}
