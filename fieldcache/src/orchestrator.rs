use core::fmt;
use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    cache::{HeatmapCache, TimeSeriesCache},
    config::FetchConfig,
    format::{CacheKey, CachedHeatmapEntry, CachedSeriesEntry, HeatmapResult, TimeSeriesResult},
    indices::{self, IndexFormula},
    remote::{AnalysisBackend, HeatmapRequest, RemoteError, TimeSeriesRequest},
};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("band `{band}` required by `{index}` could not be fetched: {cause}")]
    Band { index: String, band: String, cause: Arc<FetchError> },
}

/// The error side is `Arc`ed so every caller sharing a de-duplicated fetch
/// sees the same failure.
pub type SharedFetchResult<T> = Result<T, Arc<FetchError>>;

type SharedFetch<T> = Shared<BoxFuture<'static, SharedFetchResult<T>>>;

/// Handle on a fetch running in the background. Awaiting it is optional:
/// callers with a cached value to show typically drop it, callers with
/// nothing to show await it so a failure can surface as a retry affordance.
pub struct PendingFetch<T>(SharedFetch<T>);

impl<T: Clone> PendingFetch<T> {
    pub async fn wait(self) -> SharedFetchResult<T> {
        self.0.await
    }
}

impl<T> Clone for PendingFetch<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for PendingFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PendingFetch").finish()
    }
}

/// What `fetch_with_cache` hands back immediately: whatever the cache held,
/// plus the in-flight refresh if one was started.
#[derive(Debug)]
pub struct FetchOutcome {
    pub cached: Option<CachedSeriesEntry>,
    pub pending: Option<PendingFetch<TimeSeriesResult>>,
}

impl FetchOutcome {
    pub fn is_fetching(&self) -> bool {
        self.pending.is_some()
    }
}

#[derive(Debug)]
pub struct HeatmapOutcome {
    pub cached: Option<CachedHeatmapEntry>,
    pub pending: Option<PendingFetch<HeatmapResult>>,
}

impl HeatmapOutcome {
    pub fn is_fetching(&self) -> bool {
        self.pending.is_some()
    }
}

/// In-flight fetches by encoded cache key. A second request for a key with a
/// running fetch shares that fetch instead of issuing another; the entry is
/// dropped when the fetch settles, success or failure.
struct InflightTable<T> {
    map: Mutex<HashMap<String, SharedFetch<T>>>,
}

impl<T: Clone> InflightTable<T> {
    fn new() -> Self {
        Self { map: Mutex::new(HashMap::new()) }
    }

    async fn get_or_insert_with(
        &self,
        key: &str,
        make: impl FnOnce() -> SharedFetch<T>,
    ) -> (SharedFetch<T>, bool) {
        let mut map = self.map.lock().await;
        if let Some(existing) = map.get(key) {
            return (existing.clone(), false);
        }
        let fetch = make();
        map.insert(key.to_string(), fetch.clone());
        (fetch, true)
    }

    async fn remove(&self, key: &str) {
        self.map.lock().await.remove(key);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.map.lock().await.len()
    }
}

impl<T> fmt::Debug for InflightTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightTable").finish_non_exhaustive()
    }
}

enum BandSlot {
    Cached(TimeSeriesResult),
    Fetching(SharedFetch<TimeSeriesResult>),
}

/// Coordinates cache reads, remote fetches, and local index computation.
///
/// The pattern throughout is stale-while-revalidate: return whatever the
/// cache holds immediately, refresh in a detached task when the entry is
/// missing, stale, or a refresh was forced, and notify the caller when fresh
/// data lands. A failed refresh never touches existing cache state.
#[derive(Debug)]
pub struct FetchOrchestrator {
    series: Arc<TimeSeriesCache>,
    heatmaps: Arc<HeatmapCache>,
    backend: Arc<dyn AnalysisBackend>,
    config: FetchConfig,
    inflight_series: InflightTable<TimeSeriesResult>,
    inflight_heatmaps: InflightTable<HeatmapResult>,
}

impl FetchOrchestrator {
    pub fn new(
        series: Arc<TimeSeriesCache>,
        heatmaps: Arc<HeatmapCache>,
        backend: Arc<dyn AnalysisBackend>,
        config: FetchConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            series,
            heatmaps,
            backend,
            config,
            inflight_series: InflightTable::new(),
            inflight_heatmaps: InflightTable::new(),
        })
    }

    pub fn series(&self) -> &Arc<TimeSeriesCache> {
        &self.series
    }

    pub fn heatmaps(&self) -> &Arc<HeatmapCache> {
        &self.heatmaps
    }

    /// Cached value now, fresh value later.
    ///
    /// `on_fresh` fires once if and when a started refresh succeeds; on
    /// failure nothing fires and the cache keeps its current entry. Callers
    /// that had no cached value to show can await the returned
    /// [`PendingFetch`] to surface the failure instead.
    pub async fn fetch_with_cache(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
        metric: &str,
        force_refresh: bool,
        on_fresh: impl FnOnce(TimeSeriesResult) + Send + 'static,
    ) -> FetchOutcome {
        let cached = if force_refresh {
            None
        } else {
            match self.series.lookup(lat, lon, metric).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(%metric, error = %err, "cache lookup failed, treating as miss");
                    None
                }
            }
        };

        let needs_fetch = force_refresh
            || cached.as_ref().is_none_or(|entry| self.series.is_stale(entry));
        if !needs_fetch {
            return FetchOutcome { cached, pending: None };
        }

        let shared = self.series_fetch(lat, lon, metric).await;
        tokio::spawn({
            let shared = shared.clone();
            async move {
                if let Ok(result) = shared.await {
                    on_fresh(result);
                }
            }
        });
        FetchOutcome { cached, pending: Some(PendingFetch(shared)) }
    }

    /// Cached heatmap now, fresh one later. Heatmaps carry no staleness
    /// rule: a refresh only happens when forced or when nothing is cached.
    pub async fn heatmap_with_cache(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
        metric: &str,
        force_refresh: bool,
    ) -> HeatmapOutcome {
        let cached = if force_refresh {
            None
        } else {
            match self.heatmaps.lookup(lat, lon, metric).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(%metric, error = %err, "heatmap lookup failed, treating as miss");
                    None
                }
            }
        };

        if !force_refresh && cached.is_some() {
            return HeatmapOutcome { cached, pending: None };
        }

        let key = CacheKey::new(lat, lon, metric).encoded();
        let (shared, installed) = self
            .inflight_heatmaps
            .get_or_insert_with(&key, || {
                let orchestrator = Arc::clone(self);
                let metric = metric.to_string();
                let key = key.clone();
                async move {
                    let result = orchestrator
                        .run_heatmap_fetch(lat, lon, &metric)
                        .await
                        .map_err(Arc::new);
                    orchestrator.inflight_heatmaps.remove(&key).await;
                    if let Err(err) = &result {
                        warn!(%metric, error = %err, "heatmap fetch failed, cache left untouched");
                    }
                    result
                }
                .boxed()
                .shared()
            })
            .await;
        if installed {
            detach(&shared);
        }
        HeatmapOutcome { cached, pending: Some(PendingFetch(shared)) }
    }

    /// Force-fetch one series key, bypassing the cache lookup. Used by the
    /// background sweep.
    pub async fn refresh(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
        metric: &str,
    ) -> SharedFetchResult<TimeSeriesResult> {
        self.series_fetch(lat, lon, metric).await.await
    }

    /// Join or start the fetch for one series key.
    ///
    /// Returns a boxed future rather than an `async fn` so the compiler
    /// treats it as an opaque `Send` type at the recursion site in
    /// [`Self::compute_derived`]; an `async fn` here trips rustc's
    /// recursive-`Send` inference limitation.
    fn series_fetch<'a>(
        self: &'a Arc<Self>,
        lat: f64,
        lon: f64,
        metric: &'a str,
    ) -> BoxFuture<'a, SharedFetch<TimeSeriesResult>> {
        Box::pin(async move {
        let key = CacheKey::new(lat, lon, metric).encoded();
        let (shared, installed) = self
            .inflight_series
            .get_or_insert_with(&key, || {
                let orchestrator = Arc::clone(self);
                let metric = metric.to_string();
                let key = key.clone();
                async move {
                    let result = orchestrator
                        .run_series_fetch(lat, lon, &metric)
                        .await
                        .map_err(Arc::new);
                    // the entry must go regardless of outcome, or the key
                    // would be stuck joining this settled fetch forever
                    orchestrator.inflight_series.remove(&key).await;
                    if let Err(err) = &result {
                        warn!(%metric, error = %err, "series fetch failed, cache left untouched");
                    }
                    result
                }
                .boxed()
                .shared()
            })
            .await;
        if installed {
            detach(&shared);
        }
        shared
        })
    }

    async fn run_series_fetch(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
        metric: &str,
    ) -> Result<TimeSeriesResult, FetchError> {
        let result = match indices::formula_for(metric) {
            Some(formula) => self.compute_derived(lat, lon, formula).await?,
            None => {
                let request = TimeSeriesRequest {
                    center_lat: lat,
                    center_lon: lon,
                    field_size_hectares: self.config.field_size_hectares,
                    metric: metric.to_string(),
                    days_history: self.config.days_history,
                    days_forecast: self.config.days_forecast,
                };
                self.backend.fetch_time_series(&request).await?
            }
        };
        if let Err(err) = self.series.save(lat, lon, metric, &result).await {
            warn!(%metric, error = %err, "could not persist fetched series");
        }
        Ok(result)
    }

    /// Compute a derived index from its raw bands: cached bands are read,
    /// missing ones fetched concurrently (and persisted as they land), and
    /// the formula applied position by position. Any band failing fails the
    /// whole computation; a partial index is never produced.
    async fn compute_derived(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
        formula: &'static IndexFormula,
    ) -> Result<TimeSeriesResult, FetchError> {
        // start every missing band fetch before awaiting any of them
        let mut slots = Vec::with_capacity(formula.bands.len());
        for band in formula.bands {
            let cached = match self.series.lookup(lat, lon, band).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(band = %band, error = %err, "band cache read failed, fetching instead");
                    None
                }
            };
            match cached {
                Some(entry) => slots.push(BandSlot::Cached(entry.result)),
                None => {
                    slots.push(BandSlot::Fetching(self.series_fetch(lat, lon, band).await));
                }
            }
        }

        let mut band_series = Vec::with_capacity(formula.bands.len());
        for (band, slot) in formula.bands.iter().zip(slots) {
            match slot {
                BandSlot::Cached(result) => band_series.push(result),
                BandSlot::Fetching(shared) => match shared.await {
                    Ok(result) => band_series.push(result),
                    Err(cause) => {
                        return Err(FetchError::Band {
                            index: formula.name.to_string(),
                            band: (*band).to_string(),
                            cause,
                        });
                    }
                },
            }
        }

        Ok(indices::compute_series(formula, &band_series, Utc::now()))
    }

    async fn run_heatmap_fetch(
        &self,
        lat: f64,
        lon: f64,
        metric: &str,
    ) -> Result<HeatmapResult, FetchError> {
        let request = HeatmapRequest {
            center_lat: lat,
            center_lon: lon,
            field_size_hectares: self.config.field_size_hectares,
            metric: metric.to_string(),
        };
        let result = self.backend.fetch_heatmap(&request).await?;
        if let Err(err) = self.heatmaps.save(lat, lon, &result).await {
            warn!(%metric, error = %err, "could not persist fetched heatmap");
        }
        Ok(result)
    }
}

/// Drive a shared fetch to completion even if every caller drops its handle.
fn detach<T: Clone + Send + Sync + 'static>(shared: &SharedFetch<T>) {
    tokio::spawn({
        let shared = shared.clone();
        async move {
            let _ = shared.await;
        }
    });
}
