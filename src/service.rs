//! Map cache service
//!
//! Builds every component from a `Config` plus the platform collaborators and
//! owns their background tasks. Construct one at app start and hand out
//! references; there is no global instance.

use std::sync::Arc;

use crate::cache::{
    BackendStorage, BlobBackend, CacheError, CacheMetrics, FreshnessPolicy, GeoCacheStore,
    ImageCache, MetricsSnapshot, TokioFsBackend,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::RegionError;
use crate::fetch::{HttpRegionFetcher, RegionFetcher};
use crate::geo::GeoPoint;
use crate::monitor::CacheMonitor;
use crate::orchestrator::{MapDataOrchestrator, RegionResponse};
use crate::warming::{BackgroundTask, HttpImagePrefetcher, ImagePrefetcher, ImageWarmer};

/// Platform services the cache layer depends on
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn BlobBackend>,
    pub fetcher: Arc<dyn RegionFetcher>,
    pub prefetcher: Arc<dyn ImagePrefetcher>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Local filesystem, HTTP and the system clock
    pub fn from_config(config: &Config) -> Result<Self, CacheError> {
        Ok(Self {
            storage: Arc::new(TokioFsBackend::new()),
            fetcher: Arc::new(HttpRegionFetcher::new(&config.network)?),
            prefetcher: Arc::new(HttpImagePrefetcher::new(&config.network)?),
            clock: Arc::new(SystemClock),
        })
    }
}

pub struct MapCacheService {
    metrics: Arc<CacheMetrics>,
    store: Arc<GeoCacheStore>,
    image_cache: Arc<ImageCache>,
    orchestrator: MapDataOrchestrator,
    warmer: ImageWarmer,
    monitor: Arc<CacheMonitor>,
    warming_task: BackgroundTask,
    monitor_task: BackgroundTask,
}

impl MapCacheService {
    /// Build all components, sweep old images, and start warming and monitoring
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` if the config does not validate.
    /// Storage problems never fail startup; the affected cache starts empty.
    pub async fn start(config: Config, collaborators: Collaborators) -> Result<Self, CacheError> {
        config.validate().map_err(CacheError::Configuration)?;

        let Collaborators {
            storage,
            fetcher,
            prefetcher,
            clock,
        } = collaborators;
        let metrics = Arc::new(CacheMetrics::new());

        let store = Arc::new(GeoCacheStore::new(
            Arc::new(BackendStorage::new(
                storage.clone(),
                config.storage.root_dir.clone(),
            )),
            clock.clone(),
            config.storage.snapshot_key.clone(),
        ));

        let image_cache = Arc::new(
            ImageCache::open(
                storage,
                config.storage.root_dir.join(&config.image_cache.dir_name),
                config.image_cache.max_size_bytes(),
                clock.clone(),
                metrics.clone(),
            )
            .await
            .into_value(),
        );
        let _ = image_cache
            .clear_old_cache(config.image_cache.retention_ms())
            .await;

        let orchestrator = MapDataOrchestrator::new(
            store.clone(),
            fetcher,
            FreshnessPolicy::new(config.freshness.expiry_window_ms),
            clock,
            metrics.clone(),
        );

        let warmer = ImageWarmer::new(
            store.clone(),
            image_cache.clone(),
            prefetcher,
            metrics.clone(),
            config.warming.clone(),
        );
        let monitor = Arc::new(CacheMonitor::new(
            metrics.clone(),
            config.monitor.interval(),
        ));

        let warming_task = warmer.start_periodic_warming();
        let monitor_task = monitor.start_monitoring();

        tracing::info!(
            root_dir = %config.storage.root_dir.display(),
            expiry_window_ms = config.freshness.expiry_window_ms,
            image_cache_max_bytes = image_cache.max_size_bytes(),
            "Map cache service started"
        );

        Ok(Self {
            metrics,
            store,
            image_cache,
            orchestrator,
            warmer,
            monitor,
            warming_task,
            monitor_task,
        })
    }

    /// See `MapDataOrchestrator::request_region`
    pub async fn request_region(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<RegionResponse, RegionError> {
        self.orchestrator.request_region(center, radius_km).await
    }

    /// App moved to the foreground: resume warming
    pub fn on_foreground(&self) {
        self.warmer.resume();
    }

    /// App moved to the background: warming stops doing work
    pub fn on_background(&self) {
        self.warmer.pause();
    }

    pub fn orchestrator(&self) -> &MapDataOrchestrator {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<GeoCacheStore> {
        &self.store
    }

    pub fn image_cache(&self) -> &Arc<ImageCache> {
        &self.image_cache
    }

    pub fn warmer(&self) -> &ImageWarmer {
        &self.warmer
    }

    pub fn monitor(&self) -> &Arc<CacheMonitor> {
        &self.monitor
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop background work and flush the image index
    pub async fn shutdown(self) {
        self.orchestrator.shutdown();
        self.warming_task.stop().await;
        self.monitor_task.stop().await;
        let _ = self.image_cache.flush().await;
        tracing::info!("Map cache service stopped");
    }
}
