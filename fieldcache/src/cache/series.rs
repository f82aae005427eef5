use std::sync::Arc;

use chrono::Utc;
use quick_cache::sync::Cache;
use tracing::warn;

use crate::{
    config::CacheConfig,
    format::{CacheKey, CachedSeriesEntry, TimeSeriesResult},
    locate,
    rotation::VersionRotator,
    staleness,
    storage::{FileStorage, StorageResult},
};

/// Disk-backed cache of time-series results with a bounded in-memory layer
/// in front.
///
/// Lookup order: memory, then the version-rotated file for the exact key,
/// then a fuzzy scan over every entry for the metric. The fuzzy scan costs
/// O(n) file reads, so it only runs on an exact miss.
#[derive(Debug)]
pub struct TimeSeriesCache {
    rotator: VersionRotator,
    storage: Arc<dyn FileStorage>,
    mem: Cache<String, Arc<CachedSeriesEntry>>,
    revisit_interval: chrono::Duration,
}

impl TimeSeriesCache {
    pub fn new(storage: Arc<dyn FileStorage>, config: &CacheConfig) -> Self {
        Self {
            rotator: VersionRotator::new(Arc::clone(&storage)),
            storage,
            mem: Cache::new(config.mem_cache_size),
            revisit_interval: config.revisit_interval,
        }
    }

    pub fn is_stale(&self, entry: &CachedSeriesEntry) -> bool {
        staleness::is_stale(entry.cached_at, Utc::now(), self.revisit_interval)
    }

    pub fn age_label(&self, entry: &CachedSeriesEntry) -> String {
        staleness::age_label(entry.cached_at, Utc::now())
    }

    /// Persist a fresh result, rotating prior versions down the backup
    /// ladder.
    pub async fn save(
        &self,
        lat: f64,
        lon: f64,
        metric: &str,
        result: &TimeSeriesResult,
    ) -> StorageResult<CachedSeriesEntry> {
        let entry = CachedSeriesEntry::new(lat, lon, metric, result.clone(), Utc::now());
        let key = CacheKey::new(lat, lon, metric).encoded();
        let bytes = entry.to_bytes()?;
        self.rotator.write(&key, bytes).await?;
        self.mem.insert(key, Arc::new(entry.clone()));
        Ok(entry)
    }

    /// Exact lookup first, fuzzy scan on miss.
    pub async fn lookup(
        &self,
        lat: f64,
        lon: f64,
        metric: &str,
    ) -> StorageResult<Option<CachedSeriesEntry>> {
        let key = CacheKey::new(lat, lon, metric).encoded();
        if let Some(entry) = self.mem.get(&key) {
            return Ok(Some((*entry).clone()));
        }
        if let Some(entry) = self.rotator.read::<CachedSeriesEntry>(&key).await {
            self.mem.insert(key, Arc::new(entry.clone()));
            return Ok(Some(entry));
        }
        // a fuzzy hit lives under a different key, so it stays out of `mem`
        let candidates = self.scan(Some(metric)).await?;
        Ok(locate::find_closest(lat, lon, metric, candidates))
    }

    /// Every current entry in the cache, unreadable files skipped.
    pub async fn entries(&self) -> StorageResult<Vec<CachedSeriesEntry>> {
        self.scan(None).await
    }

    pub async fn delete(&self, lat: f64, lon: f64, metric: &str) -> StorageResult<()> {
        let key = CacheKey::new(lat, lon, metric).encoded();
        self.mem.remove(&key);
        self.rotator.delete_all(&key).await
    }

    pub async fn clear(&self) -> StorageResult<()> {
        for name in self.storage.list_files().await? {
            if let Some(stem) = name.strip_suffix(".json") {
                self.mem.remove(stem);
            }
        }
        self.storage.delete_prefix("").await
    }

    async fn scan(&self, metric: Option<&str>) -> StorageResult<Vec<CachedSeriesEntry>> {
        let mut candidates = Vec::new();
        for name in self.storage.list_files().await? {
            if is_backup_file(&name) {
                continue;
            }
            if let Some(metric) = metric {
                // coarse pre-filter; the fine metric check happens on the
                // parsed entry
                if !name.contains(metric) {
                    continue;
                }
            }
            let Some(bytes) = self.storage.read(&name).await? else {
                continue;
            };
            match CachedSeriesEntry::from_slice(&bytes) {
                Ok(entry) => candidates.push(entry),
                Err(err) => {
                    warn!(%name, error = %err, "skipping unreadable cache file");
                }
            }
        }
        Ok(candidates)
    }
}

/// Backup files (`*_v1.json` .. `*_v3.json`) never participate in scans;
/// they only exist for rotation fallback.
fn is_backup_file(name: &str) -> bool {
    let stem = name.strip_suffix(".json").unwrap_or(name);
    let mut tail = stem.chars().rev();
    matches!(
        (tail.next(), tail.next(), tail.next()),
        (Some(digit), Some('v'), Some('_')) if digit.is_ascii_digit()
    )
}
