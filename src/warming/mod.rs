// Image cache warmer
//
// Keeps thumbnails for the stored region snapshot in the image cache. A pass
// reads the snapshot, collects the primary image URI of every event and
// location, skips the ones warmed recently, and prefetches up to `max_batch`
// of the rest. A failed prefetch is logged and counted; it never aborts the
// pass.
//
// The periodic loop runs a pass on every tick and whenever the store saves a
// new snapshot. While paused (app in background) it keeps ticking but does no
// work; resuming runs a pass immediately.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::cache::{CacheError, CacheMetrics, GeoCacheStore, ImageCache};
use crate::config::WarmingConfig;

mod prefetcher;
mod task;

pub use prefetcher::{HttpImagePrefetcher, ImagePrefetcher};
pub use task::BackgroundTask;

/// Outcome of one warming pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Distinct image URIs in the snapshot
    pub scanned: usize,
    /// Fetched and stored this pass
    pub prefetched: usize,
    /// Already warmed recently
    pub skipped: usize,
    /// Left for a later pass by the batch limit
    pub deferred: usize,
    pub failed: usize,
}

/// Prefetches images referenced by the stored region snapshot
#[derive(Clone)]
pub struct ImageWarmer {
    inner: Arc<WarmerInner>,
}

struct WarmerInner {
    store: Arc<GeoCacheStore>,
    cache: Arc<ImageCache>,
    prefetcher: Arc<dyn ImagePrefetcher>,
    metrics: Arc<CacheMetrics>,
    config: WarmingConfig,
    paused: AtomicBool,
    resumed: Notify,
}

impl ImageWarmer {
    pub fn new(
        store: Arc<GeoCacheStore>,
        cache: Arc<ImageCache>,
        prefetcher: Arc<dyn ImagePrefetcher>,
        metrics: Arc<CacheMetrics>,
        config: WarmingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WarmerInner {
                store,
                cache,
                prefetcher,
                metrics,
                config,
                paused: AtomicBool::new(false),
                resumed: Notify::new(),
            }),
        }
    }

    /// Stop doing work on ticks until `resume`
    pub fn pause(&self) {
        if !self.inner.paused.swap(true, Ordering::SeqCst) {
            tracing::debug!("Image warming paused");
        }
    }

    /// Resume work and trigger a pass right away
    pub fn resume(&self) {
        if self.inner.paused.swap(false, Ordering::SeqCst) {
            tracing::debug!("Image warming resumed");
            self.inner.resumed.notify_one();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Run one warming pass over the stored snapshot
    pub async fn warm_once(&self) -> WarmReport {
        let Some(snapshot) = self.inner.store.load().await.into_value() else {
            return WarmReport::default();
        };

        let uris = snapshot.image_uris();
        let rewarm_after_ms = self.inner.config.rewarm_after_ms();
        let (warm, pending): (Vec<String>, Vec<String>) = uris
            .into_iter()
            .partition(|uri| self.inner.cache.contains_warm(uri, rewarm_after_ms));

        let mut report = WarmReport {
            scanned: warm.len() + pending.len(),
            skipped: warm.len(),
            deferred: pending.len().saturating_sub(self.inner.config.max_batch),
            ..Default::default()
        };

        let results: Vec<(String, Result<(), CacheError>)> = stream::iter(
            pending.into_iter().take(self.inner.config.max_batch),
        )
        .map(|uri| async move {
            let result = self.warm_uri(&uri).await;
            (uri, result)
        })
        .buffer_unordered(self.inner.config.concurrency.max(1))
        .collect()
        .await;

        for (uri, result) in results {
            match result {
                Ok(()) => report.prefetched += 1,
                Err(e) => {
                    report.failed += 1;
                    self.inner.metrics.increment_prefetch_failures();
                    tracing::warn!(uri = %uri, error = %e, "Failed to warm image");
                }
            }
        }

        tracing::debug!(
            scanned = report.scanned,
            prefetched = report.prefetched,
            skipped = report.skipped,
            deferred = report.deferred,
            failed = report.failed,
            "Image warming pass complete"
        );
        report
    }

    async fn warm_uri(&self, uri: &str) -> Result<(), CacheError> {
        let data = self.inner.prefetcher.prefetch(uri).await?;
        self.inner.cache.insert_warmed(uri, data).await?;
        self.inner.metrics.increment_warmed();
        Ok(())
    }

    /// Start the periodic warming loop
    pub fn start_periodic_warming(&self) -> BackgroundTask {
        let warmer = self.clone();
        let mut snapshots = self.inner.store.subscribe();
        let period = self.inner.config.interval();

        BackgroundTask::spawn("image_warmer", move |token| async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = warmer.inner.resumed.notified() => {}
                }

                if warmer.is_paused() {
                    continue;
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = warmer.warm_once() => {}
                }
            }
        })
    }
}
