use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{config::SweepConfig, orchestrator::FetchOrchestrator};

/// Proactively refreshes stale series entries so the next foreground lookup
/// is served fresh from disk.
///
/// One sweep runs at a time; a sweep triggered while another is active is a
/// no-op. Refreshes run sequentially with a small delay between requests,
/// purely to rate-limit the analysis backend.
#[derive(Debug)]
pub struct SweepScheduler {
    orchestrator: Arc<FetchOrchestrator>,
    config: SweepConfig,
    running: AtomicBool,
}

impl SweepScheduler {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, config: SweepConfig) -> Arc<Self> {
        Arc::new(Self { orchestrator, config, running: AtomicBool::new(false) })
    }

    /// Sweep now, then again every configured interval, until the handle is
    /// dropped or aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.run_once().await;
                tokio::time::sleep(self.config.interval).await;
            }
        })
    }

    /// One sweep pass. Failures are logged and skipped; the cache keeps its
    /// stale entries until a refresh succeeds.
    pub async fn run_once(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("cache sweep already running, skipping");
            return;
        }
        self.sweep().await;
        self.running.store(false, Ordering::SeqCst);
    }

    async fn sweep(&self) {
        let deadline = Instant::now() + self.config.deadline;
        let entries = match self.orchestrator.series().entries().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "cannot list cache entries, skipping sweep");
                return;
            }
        };

        let stale: Vec<_> = entries
            .into_iter()
            .filter(|entry| self.orchestrator.series().is_stale(entry))
            .collect();
        if stale.is_empty() {
            debug!("no stale cache entries");
            return;
        }
        info!(count = stale.len(), "refreshing stale cache entries");

        for entry in stale {
            if Instant::now() >= deadline {
                warn!("sweep deadline reached, remaining entries stay stale");
                break;
            }
            match self.orchestrator.refresh(entry.lat, entry.lon, &entry.metric).await {
                Ok(_) => debug!(metric = %entry.metric, "refreshed stale entry"),
                Err(err) => {
                    warn!(metric = %entry.metric, error = %err, "refresh failed, keeping stale entry");
                }
            }
            tokio::time::sleep(self.config.request_delay).await;
        }
    }
}
