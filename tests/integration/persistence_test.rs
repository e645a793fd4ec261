// Persistence of the region snapshot and the image cache on a real filesystem

use bytes::Bytes;
use std::sync::Arc;

use mapcache::cache::{
    BackendStorage, CacheError, CacheMetrics, GeoCacheStore, ImageCache, KeyValueStorage,
    TokioFsBackend,
};
use mapcache::clock::{Clock, ManualClock, SystemClock};
use mapcache::MapCacheService;

use super::support::*;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

fn store_in(root: &std::path::Path, clock: Arc<ManualClock>) -> (BackendStorage, GeoCacheStore) {
    let storage = BackendStorage::new(Arc::new(TokioFsBackend::new()), root);
    let store = GeoCacheStore::new(Arc::new(storage.clone()), clock, "map_region_snapshot");
    (storage, store)
}

#[tokio::test]
async fn test_snapshot_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START_MS));
    let (_, store) = store_in(dir.path(), clock.clone());

    let saved = store.save(region_for(MIAMI), MIAMI).await;
    assert!(!saved.is_degraded());
    assert!(dir.path().join("map_region_snapshot.json").exists());

    let (_, reopened) = store_in(dir.path(), clock.clone());
    let loaded = reopened.load().await.into_value().unwrap();
    assert_eq!(loaded.to_region_data(), region_for(MIAMI));
    assert_eq!(loaded.center(), MIAMI);
    assert_eq!(loaded.captured_at(), clock.now_ms());
}

#[tokio::test]
async fn test_snapshot_round_trip_with_system_clock() {
    let dir = tempfile::tempdir().unwrap();
    let storage = BackendStorage::new(Arc::new(TokioFsBackend::new()), dir.path());
    let store = GeoCacheStore::new(Arc::new(storage), Arc::new(SystemClock), "map_region_snapshot");

    let before = SystemClock.now_ms();
    let _ = store.save(region_for(NYC), NYC).await;
    let loaded = store.load().await.into_value().unwrap();
    let after = SystemClock.now_ms();

    assert_eq!(loaded.to_region_data(), region_for(NYC));
    assert_eq!(loaded.center(), NYC);
    assert!(loaded.captured_at() >= before);
    assert!(loaded.captured_at() <= after);
}

#[tokio::test]
async fn test_snapshot_json_is_longitude_first() {
    let dir = tempfile::tempdir().unwrap();
    let (storage, store) = store_in(dir.path(), Arc::new(ManualClock::new(START_MS)));
    let _ = store.save(region_for(MIAMI), MIAMI).await;

    let raw = storage.get_item("map_region_snapshot").await.unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["center"]["longitude"], -80.19);
    assert_eq!(json["center"]["latitude"], 25.77);
    assert_eq!(json["capturedAt"], START_MS);
    assert_eq!(json["version"], 1);
}

#[tokio::test]
async fn test_corrupt_snapshot_file_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map_region_snapshot.json");
    std::fs::write(&path, b"{\"events\": [oops").unwrap();

    let (_, store) = store_in(dir.path(), Arc::new(ManualClock::new(START_MS)));
    let loaded = store.load().await;
    assert!(matches!(loaded.error(), Some(CacheError::Serialization(_))));
    assert!(loaded.into_value().is_none());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_startup_sweep_removes_images_from_old_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let images_dir = dir.path().join("images");
    let clock = Arc::new(ManualClock::new(START_MS));

    {
        let cache = ImageCache::open(
            Arc::new(TokioFsBackend::new()),
            &images_dir,
            1 << 20,
            clock.clone(),
            Arc::new(CacheMetrics::new()),
        )
        .await
        .into_value();
        cache.insert("https://img/old.jpg", Bytes::from_static(b"old")).await.unwrap();
        clock.advance(6 * DAY_MS);
        cache.insert("https://img/recent.jpg", Bytes::from_static(b"recent")).await.unwrap();
    }
    std::fs::write(images_dir.join("half-written.tmp"), b"partial").unwrap();

    // Eight days after the first insert, two after the second
    clock.advance(2 * DAY_MS);
    let harness = Harness {
        clock: clock.clone(),
        ..Harness::new()
    };
    let service = MapCacheService::start(config_in(dir.path()), harness.collaborators())
        .await
        .unwrap();

    let images = service.image_cache();
    assert!(images.entry("https://img/old.jpg").is_none());
    assert!(images.entry("https://img/recent.jpg").is_some());
    assert_eq!(images.total_size(), 6);

    let files: Vec<_> = std::fs::read_dir(&images_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files.len(), 2, "unexpected files: {files:?}");
    assert!(files.contains(&"index.json".to_string()));
    service.shutdown().await;
}

#[tokio::test]
async fn test_image_index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START_MS));
    let open = || {
        ImageCache::open(
            Arc::new(TokioFsBackend::new()),
            dir.path(),
            1 << 20,
            clock.clone(),
            Arc::new(CacheMetrics::new()),
        )
    };

    let cache = open().await.into_value();
    cache.insert_warmed("https://img/a.jpg", Bytes::from_static(b"aaaa")).await.unwrap();
    drop(cache);

    let reopened = open().await;
    assert!(!reopened.is_degraded());
    let reopened = reopened.into_value();
    assert!(reopened.contains_warm("https://img/a.jpg", 1_000));
    assert_eq!(
        reopened.lookup("https://img/a.jpg").await.into_value(),
        Some(Bytes::from_static(b"aaaa"))
    );
}
