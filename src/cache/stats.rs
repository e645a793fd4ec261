//! Cache statistics
//!
//! - `CacheMetrics`: process-lifetime counters for the image cache, the
//!   warmer and region lookups, backed by a per-instance prometheus registry
//! - `MetricsSnapshot`: plain copy of the counters at one instant
//!
//! Counters only ever grow. Nothing here feeds back into caching decisions.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use super::freshness::FreshnessDecision;

/// Cache statistics for monitoring and metrics
pub struct CacheMetrics {
    registry: Registry,
    hits: IntCounter,
    misses: IntCounter,
    warmed: IntCounter,
    evictions: IntCounter,
    prefetch_failures: IntCounter,
    region_lookups: IntCounterVec,
    network_fetches: IntCounter,
    network_failures: IntCounter,
    image_cache_bytes: IntGauge,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Create counters registered in a fresh registry
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("mapcache".to_string()), None)
            .expect("Failed to create metrics registry");

        let counter = |name: &str, help: &str| {
            let c = IntCounter::new(name, help).expect("Invalid counter definition");
            registry
                .register(Box::new(c.clone()))
                .expect("Failed to register counter");
            c
        };

        let hits = counter("image_cache_hits_total", "Image cache lookups served from cache");
        let misses = counter("image_cache_misses_total", "Image cache lookups not in cache");
        let warmed = counter("images_warmed_total", "Images prefetched by the warmer");
        let evictions = counter("image_cache_evictions_total", "Image cache entries evicted");
        let prefetch_failures = counter("prefetch_failures_total", "Image prefetches that failed");
        let network_fetches = counter("region_fetches_total", "Region network fetches issued");
        let network_failures = counter("region_fetch_failures_total", "Region network fetches that failed");

        let region_lookups = IntCounterVec::new(
            Opts::new("region_lookups_total", "Region freshness decisions"),
            &["decision"],
        )
        .expect("Invalid counter vector definition");
        registry
            .register(Box::new(region_lookups.clone()))
            .expect("Failed to register counter vector");

        let image_cache_bytes = IntGauge::new("image_cache_bytes", "Bytes held by the image cache")
            .expect("Invalid gauge definition");
        registry
            .register(Box::new(image_cache_bytes.clone()))
            .expect("Failed to register gauge");

        Self {
            registry,
            hits,
            misses,
            warmed,
            evictions,
            prefetch_failures,
            region_lookups,
            network_fetches,
            network_failures,
            image_cache_bytes,
        }
    }

    pub fn increment_hits(&self) {
        self.hits.inc();
    }

    pub fn increment_misses(&self) {
        self.misses.inc();
    }

    pub fn increment_warmed(&self) {
        self.warmed.inc();
    }

    pub fn add_evictions(&self, count: u64) {
        self.evictions.inc_by(count);
    }

    pub fn increment_prefetch_failures(&self) {
        self.prefetch_failures.inc();
    }

    pub fn record_region_decision(&self, decision: FreshnessDecision) {
        self.region_lookups
            .with_label_values(&[decision.as_str()])
            .inc();
    }

    pub fn increment_network_fetches(&self) {
        self.network_fetches.inc();
    }

    pub fn increment_network_failures(&self) {
        self.network_failures.inc();
    }

    pub fn set_image_cache_bytes(&self, bytes: u64) {
        self.image_cache_bytes.set(bytes.min(i64::MAX as u64) as i64);
    }

    /// Copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let decision = |d: FreshnessDecision| {
            self.region_lookups.with_label_values(&[d.as_str()]).get()
        };
        MetricsSnapshot {
            hits: self.hits.get(),
            misses: self.misses.get(),
            warmed_count: self.warmed.get(),
            evictions: self.evictions.get(),
            prefetch_failures: self.prefetch_failures.get(),
            region_hits: decision(FreshnessDecision::Hit),
            region_stale: decision(FreshnessDecision::Stale),
            region_misses: decision(FreshnessDecision::Miss),
            network_fetches: self.network_fetches.get(),
            network_failures: self.network_failures.get(),
            image_cache_bytes: self.image_cache_bytes.get().max(0) as u64,
        }
    }

    /// Render all metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Point-in-time copy of `CacheMetrics`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub warmed_count: u64,
    pub evictions: u64,
    pub prefetch_failures: u64,
    pub region_hits: u64,
    pub region_stale: u64,
    pub region_misses: u64,
    pub network_fetches: u64,
    pub network_failures: u64,
    pub image_cache_bytes: u64,
}

impl MetricsSnapshot {
    /// Image cache hit ratio (hits / (hits + misses)); 0.0 with no lookups
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Share of region lookups answered with a HIT
    pub fn region_hit_ratio(&self) -> f64 {
        ratio(
            self.region_hits,
            self.region_hits + self.region_stale + self.region_misses,
        )
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
