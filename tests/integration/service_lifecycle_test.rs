// End-to-end tests of MapCacheService on a real filesystem

use std::time::Duration;

use mapcache::cache::CacheError;
use mapcache::{DataSource, MapCacheService, RegionError};

use super::support::*;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_miss_then_hit_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();

    let service = MapCacheService::start(config_in(dir.path()), harness.collaborators())
        .await
        .unwrap();
    let first = service.request_region(MIAMI, 5.0).await.unwrap();
    assert_eq!(first.source, DataSource::Network);
    assert_eq!(first.data, region_for(MIAMI));
    service.shutdown().await;

    // A new process sees the persisted snapshot
    harness.clock.advance(60_000);
    let service = MapCacheService::start(config_in(dir.path()), harness.collaborators())
        .await
        .unwrap();
    let second = service.request_region(MIAMI, 5.0).await.unwrap();
    assert_eq!(second.source, DataSource::Cache);
    assert_eq!(second.data, region_for(MIAMI));
    assert_eq!(second.captured_at, START_MS);
    assert_eq!(harness.fetcher.calls(), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn test_stale_region_shows_cached_data_then_refreshes() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let service = MapCacheService::start(config_in(dir.path()), harness.collaborators())
        .await
        .unwrap();

    let _ = service.request_region(MIAMI, 5.0).await.unwrap();
    let stale = service.request_region(NYC, 50.0).await.unwrap();
    assert_eq!(stale.source, DataSource::StaleCache);
    assert_eq!(stale.data, region_for(MIAMI));

    let store = service.store().clone();
    let mut saved = store.subscribe();
    if saved.borrow_and_update().as_ref().map(|s| s.center()) != Some(NYC) {
        saved.changed().await.unwrap();
    }

    let fresh = service.request_region(NYC, 50.0).await.unwrap();
    assert_eq!(fresh.source, DataSource::Cache);
    assert_eq!(fresh.data, region_for(NYC));

    let metrics = service.metrics();
    assert_eq!(metrics.region_misses, 1);
    assert_eq!(metrics.region_stale, 1);
    assert_eq!(metrics.region_hits, 1);
    service.shutdown().await;
}

#[tokio::test]
async fn test_network_failure_without_cache_reaches_caller() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    harness
        .fetcher
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let service = MapCacheService::start(config_in(dir.path()), harness.collaborators())
        .await
        .unwrap();

    let err = service.request_region(MIAMI, 5.0).await.unwrap_err();
    assert!(matches!(err, RegionError::Network(_)));
    assert!(err.is_retryable());
    service.shutdown().await;
}

#[tokio::test]
async fn test_images_are_warmed_after_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let service = MapCacheService::start(config_in(dir.path()), harness.collaborators())
        .await
        .unwrap();

    let _ = service.request_region(MIAMI, 5.0).await.unwrap();
    let images = service.image_cache().clone();
    wait_until(|| images.len() == 2).await;

    let uri = region_for(MIAMI).events[0].image_url.clone().unwrap();
    let bytes = images.lookup(&uri).await.into_value().unwrap();
    assert_eq!(bytes, format!("image bytes for {uri}").as_bytes());
    assert_eq!(service.metrics().warmed_count, 2);
    assert_eq!(service.metrics().hits, 1);
    service.shutdown().await;
}

#[tokio::test]
async fn test_background_pauses_warming() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let service = MapCacheService::start(config_in(dir.path()), harness.collaborators())
        .await
        .unwrap();
    service.on_background();
    assert!(service.warmer().is_paused());

    let _ = service.request_region(MIAMI, 5.0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.prefetcher.calls(), 0);

    service.on_foreground();
    let images = service.image_cache().clone();
    wait_until(|| images.len() == 2).await;
    service.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.image_cache.max_size_mb = 0;

    let err = match MapCacheService::start(config, Harness::new().collaborators()).await {
        Ok(_) => panic!("service started with an invalid config"),
        Err(e) => e,
    };
    assert!(matches!(err, CacheError::Configuration(msg) if msg.contains("max_size_mb")));
}
