// Single-flight behaviour of region requests through the service

use std::sync::Arc;

use mapcache::orchestrator::OrchestratorState;
use mapcache::{DataSource, MapCacheService, RegionError};

use super::support::*;

#[tokio::test]
async fn test_newer_request_wins_and_store_stays_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let service = Arc::new(
        MapCacheService::start(config_in(dir.path()), harness.collaborators())
            .await
            .unwrap(),
    );
    let hold = harness.fetcher.hold.clone().write_owned().await;

    let first = tokio::spawn({
        let service = service.clone();
        async move { service.request_region(MIAMI, 5.0).await }
    });
    let mut state = service.orchestrator().subscribe_state();
    state
        .wait_for(|s| *s == OrchestratorState::Fetching)
        .await
        .unwrap();

    let second = tokio::spawn({
        let service = service.clone();
        async move { service.request_region(NYC, 5.0).await }
    });
    while service.orchestrator().requests_started() < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.fetcher.calls(), 1);

    drop(hold);
    assert_eq!(first.await.unwrap(), Err(RegionError::Superseded));
    let response = second.await.unwrap().unwrap();
    assert_eq!(response.source, DataSource::Network);
    assert_eq!(response.data, region_for(NYC));

    let stored = service.store().load().await.into_value().unwrap();
    assert_eq!(stored.center(), NYC);
    assert_eq!(stored.to_region_data(), region_for(NYC));
    assert_eq!(harness.fetcher.calls(), 2);
}

#[tokio::test]
async fn test_back_to_back_requests_for_same_area_fetch_once() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let service = Arc::new(
        MapCacheService::start(config_in(dir.path()), harness.collaborators())
            .await
            .unwrap(),
    );

    let requests: Vec<_> = (0..5)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.request_region(MIAMI, 5.0).await })
        })
        .collect();

    let mut delivered = 0;
    for request in requests {
        match request.await.unwrap() {
            Ok(response) => {
                assert_eq!(response.data, region_for(MIAMI));
                delivered += 1;
            }
            Err(err) => assert_eq!(err, RegionError::Superseded),
        }
    }

    // Only the latest request is guaranteed an answer; the network is hit once
    assert!(delivered >= 1);
    assert_eq!(harness.fetcher.calls(), 1);
}
