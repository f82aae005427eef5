use std::sync::Arc;

use chrono::Utc;
use quick_cache::sync::Cache;
use tracing::warn;

use crate::{
    config::CacheConfig,
    format::{CacheKey, CachedHeatmapEntry, HeatmapResult},
    locate, staleness,
    storage::{RecordStorage, StorageError, StorageResult},
};

/// Key prefix separating heatmap records from other records in the store.
pub const HEATMAP_KEY_PREFIX: &str = "heatmap_";

/// Record-store-backed cache of heatmap results.
///
/// Single-version: each save fully replaces the prior entry for its key.
/// There is no staleness rule here; heatmaps are refreshed manually.
#[derive(Debug)]
pub struct HeatmapCache {
    storage: Arc<dyn RecordStorage>,
    mem: Cache<String, Arc<CachedHeatmapEntry>>,
}

impl HeatmapCache {
    pub fn new(storage: Arc<dyn RecordStorage>, config: &CacheConfig) -> Self {
        Self { storage, mem: Cache::new(config.mem_cache_size) }
    }

    fn record_key(lat: f64, lon: f64, metric: &str) -> String {
        format!("{HEATMAP_KEY_PREFIX}{}", CacheKey::new(lat, lon, metric).encoded())
    }

    pub fn age_label(&self, entry: &CachedHeatmapEntry) -> String {
        staleness::age_label(entry.cached_at, Utc::now())
    }

    pub async fn save(
        &self,
        lat: f64,
        lon: f64,
        result: &HeatmapResult,
    ) -> StorageResult<CachedHeatmapEntry> {
        let entry = CachedHeatmapEntry::new(lat, lon, result.clone(), Utc::now());
        let key = Self::record_key(lat, lon, &entry.metric);
        let value = entry.to_value()?;
        self.storage.put(&key, &value).await?;
        self.mem.insert(key, Arc::new(entry.clone()));
        Ok(entry)
    }

    /// Exact lookup first, fuzzy scan on miss. A corrupt record is a full
    /// miss: there are no backup versions to fall back to.
    pub async fn lookup(
        &self,
        lat: f64,
        lon: f64,
        metric: &str,
    ) -> StorageResult<Option<CachedHeatmapEntry>> {
        let key = Self::record_key(lat, lon, metric);
        if let Some(entry) = self.mem.get(&key) {
            return Ok(Some((*entry).clone()));
        }
        if let Some(entry) = self.read_record(&key).await? {
            self.mem.insert(key, Arc::new(entry.clone()));
            return Ok(Some(entry));
        }
        let candidates = self.scan_metric(metric).await?;
        Ok(locate::find_closest(lat, lon, metric, candidates))
    }

    pub async fn delete(&self, lat: f64, lon: f64, metric: &str) -> StorageResult<()> {
        let key = Self::record_key(lat, lon, metric);
        self.mem.remove(&key);
        self.storage.delete(&key).await
    }

    pub async fn clear(&self) -> StorageResult<()> {
        for key in self.storage.list_keys().await? {
            if key.starts_with(HEATMAP_KEY_PREFIX) {
                self.mem.remove(&key);
            }
        }
        self.storage.delete_prefix(HEATMAP_KEY_PREFIX).await
    }

    async fn read_record(&self, key: &str) -> StorageResult<Option<CachedHeatmapEntry>> {
        let value = match self.storage.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(StorageError::Serde(err)) => {
                warn!(%key, error = %err, "treating corrupt heatmap record as a miss");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        match CachedHeatmapEntry::from_value(value) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(%key, error = %err, "treating malformed heatmap record as a miss");
                Ok(None)
            }
        }
    }

    async fn scan_metric(&self, metric: &str) -> StorageResult<Vec<CachedHeatmapEntry>> {
        let mut candidates = Vec::new();
        for key in self.storage.list_keys().await? {
            // coarse pre-filter; the fine metric check happens on the parsed
            // entry, exactly as on the file-store path
            if !key.starts_with(HEATMAP_KEY_PREFIX) || !key.contains(metric) {
                continue;
            }
            if let Some(entry) = self.read_record(&key).await? {
                candidates.push(entry);
            }
        }
        Ok(candidates)
    }
}
