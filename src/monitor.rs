//! Cache effectiveness reporting
//!
//! Samples `CacheMetrics` on a fixed tick, logs the hit ratio and publishes
//! the latest sample to subscribers. Observability only: nothing here changes
//! caching behaviour.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::cache::{CacheMetrics, MetricsSnapshot};
use crate::warming::BackgroundTask;

pub struct CacheMonitor {
    metrics: Arc<CacheMetrics>,
    interval: Duration,
    latest: watch::Sender<MetricsSnapshot>,
}

impl CacheMonitor {
    pub fn new(metrics: Arc<CacheMetrics>, interval: Duration) -> Self {
        let (latest, _) = watch::channel(MetricsSnapshot::default());
        Self {
            metrics,
            interval,
            latest,
        }
    }

    /// Read the counters now and publish the result
    pub fn sample(&self) -> MetricsSnapshot {
        let snapshot = self.metrics.snapshot();
        self.latest.send_replace(snapshot.clone());
        snapshot
    }

    /// Receiver updated on every sample
    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.latest.subscribe()
    }

    /// Prometheus text rendering of all counters
    pub fn export_prometheus(&self) -> String {
        self.metrics.export_prometheus()
    }

    /// Start the reporting tick
    pub fn start_monitoring(self: &Arc<Self>) -> BackgroundTask {
        let monitor = Arc::clone(self);
        BackgroundTask::spawn("cache_monitor", move |token| async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let sample = monitor.sample();
                        tracing::info!(
                            hit_ratio = sample.hit_ratio(),
                            hits = sample.hits,
                            misses = sample.misses,
                            warmed = sample.warmed_count,
                            evictions = sample.evictions,
                            prefetch_failures = sample.prefetch_failures,
                            region_hit_ratio = sample.region_hit_ratio(),
                            image_cache_bytes = sample.image_cache_bytes,
                            "Cache metrics"
                        );
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reflects_counters() {
        let metrics = Arc::new(CacheMetrics::new());
        let monitor = CacheMonitor::new(metrics.clone(), Duration::from_secs(60));
        metrics.increment_hits();
        metrics.increment_hits();
        metrics.increment_hits();
        metrics.increment_misses();

        let sample = monitor.sample();
        assert_eq!(sample.hits, 3);
        assert_eq!(sample.hit_ratio(), 0.75);
        assert_eq!(*monitor.subscribe().borrow(), sample);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_publishes_on_each_tick() {
        let metrics = Arc::new(CacheMetrics::new());
        let monitor = Arc::new(CacheMonitor::new(metrics.clone(), Duration::from_secs(60)));
        let mut samples = monitor.subscribe();
        let task = monitor.start_monitoring();

        // First tick fires immediately
        samples.changed().await.unwrap();
        assert_eq!(samples.borrow_and_update().hits, 0);

        metrics.increment_hits();
        tokio::time::advance(Duration::from_secs(60)).await;
        samples.changed().await.unwrap();
        assert_eq!(samples.borrow_and_update().hits, 1);

        task.stop().await;
    }
}
