// Shared fakes for the integration tests

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use mapcache::cache::{CacheError, TokioFsBackend};
use mapcache::clock::ManualClock;
use mapcache::config::Config;
use mapcache::fetch::RegionFetcher;
use mapcache::warming::ImagePrefetcher;
use mapcache::{Collaborators, Event, GeoPoint, Location, NetworkError, RegionData};

pub const MIAMI: GeoPoint = GeoPoint::new(-80.19, 25.77);
pub const NYC: GeoPoint = GeoPoint::new(-73.98, 40.75);
pub const START_MS: u64 = 1_700_000_000_000;

/// Region data whose items are tagged with the center they were fetched for
pub fn region_for(center: GeoPoint) -> RegionData {
    let tag = center.to_string();
    RegionData::new(
        vec![Event::new(format!("event@{tag}"), "Event", center)
            .with_image(format!("https://img.example.com/{tag}/event.jpg"))],
        vec![Location::new(format!("location@{tag}"), "Venue", center)
            .with_image(format!("https://img.example.com/{tag}/venue.jpg"))],
    )
}

/// Region fetcher that can be held open to simulate a slow network
#[derive(Default)]
pub struct FakeRegionFetcher {
    calls: AtomicUsize,
    pub hold: Arc<RwLock<()>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl FakeRegionFetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegionFetcher for FakeRegionFetcher {
    async fn fetch_region(&self, center: GeoPoint, _radius_km: f64) -> Result<RegionData, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _open = self.hold.read().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetworkError::Status(502));
        }
        Ok(region_for(center))
    }
}

/// Image prefetcher returning a fixed body
#[derive(Default)]
pub struct FakePrefetcher {
    calls: AtomicUsize,
}

impl FakePrefetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImagePrefetcher for FakePrefetcher {
    async fn prefetch(&self, uri: &str) -> Result<Bytes, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(format!("image bytes for {uri}")))
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub fetcher: Arc<FakeRegionFetcher>,
    pub prefetcher: Arc<FakePrefetcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(START_MS)),
            fetcher: Arc::new(FakeRegionFetcher::default()),
            prefetcher: Arc::new(FakePrefetcher::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            storage: Arc::new(TokioFsBackend::new()),
            fetcher: self.fetcher.clone(),
            prefetcher: self.prefetcher.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Default config rooted at `root`
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.root_dir = root.to_path_buf();
    config
}
