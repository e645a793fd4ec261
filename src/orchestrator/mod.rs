// Map data fetch orchestrator
//
// Ties viewport changes to cache reads and network fetches:
// - HIT: served from the store, no network call
// - STALE: served from the store, refreshed in the background
// - MISS: one network fetch, saved to the store, returned
//
// Every request takes a generation number. Only one region fetch runs at a
// time (the fetch gate). A request whose generation is no longer the latest
// when it gets the gate, or when its fetch settles, is rejected with
// `RegionError::Superseded`. A fetch that was started always runs to
// completion and its result is always saved, even if nobody is waiting for it.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheMetrics, FreshnessDecision, FreshnessPolicy, GeoCacheStore};
use crate::clock::{Clock, Timestamp};
use crate::error::{NetworkError, RegionError};
use crate::fetch::RegionFetcher;
use crate::geo::GeoPoint;
use crate::region::{CachedRegionSnapshot, RegionData};

/// Whether a region fetch is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorState {
    Idle,
    Fetching,
}

/// Where the data of a `RegionResponse` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh snapshot for this area
    Cache,
    /// Snapshot for a different area, shown while a refresh runs
    StaleCache,
    /// Fetched for this request
    Network,
}

impl DataSource {
    pub fn is_cached(&self) -> bool {
        !matches!(self, DataSource::Network)
    }
}

/// Successful result of `request_region`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionResponse {
    pub data: RegionData,
    pub source: DataSource,
    /// When the returned data was fetched
    pub captured_at: Timestamp,
}

impl RegionResponse {
    fn from_snapshot(snapshot: &CachedRegionSnapshot, source: DataSource) -> Self {
        Self {
            data: snapshot.to_region_data(),
            source,
            captured_at: snapshot.captured_at(),
        }
    }
}

/// Region request state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MapDataOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<GeoCacheStore>,
    fetcher: Arc<dyn RegionFetcher>,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    generation: AtomicU64,
    fetch_gate: Arc<Mutex<()>>,
    state: watch::Sender<OrchestratorState>,
    shutdown: CancellationToken,
}

/// Resets the state to Idle when the fetch ends, however it ends
struct FetchingGuard<'a>(&'a watch::Sender<OrchestratorState>);

impl<'a> FetchingGuard<'a> {
    fn enter(state: &'a watch::Sender<OrchestratorState>) -> Self {
        state.send_replace(OrchestratorState::Fetching);
        Self(state)
    }
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(OrchestratorState::Idle);
    }
}

impl MapDataOrchestrator {
    pub fn new(
        store: Arc<GeoCacheStore>,
        fetcher: Arc<dyn RegionFetcher>,
        policy: FreshnessPolicy,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorState::Idle);
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                policy,
                clock,
                metrics,
                generation: AtomicU64::new(0),
                fetch_gate: Arc::new(Mutex::new(())),
                state,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Data for the viewport at `center`, accepting a cached snapshot whose
    /// center lies within `radius_km`.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for out-of-range coordinates or a negative/non-finite radius
    /// - `Network` if the fetch for this request failed
    /// - `Superseded` if a newer request started before this one settled
    pub async fn request_region(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<RegionResponse, RegionError> {
        center.validate()?;
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(RegionError::InvalidRequest(format!(
                "radius_km must be a non-negative number, got {}",
                radius_km
            )));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (decision, snapshot) = self.evaluate(center, radius_km).await;
        self.inner.metrics.record_region_decision(decision);
        tracing::debug!(
            center = %center,
            radius_km,
            decision = %decision,
            generation,
            "Region request"
        );

        match (decision, snapshot) {
            (FreshnessDecision::Hit, Some(snapshot)) => {
                Ok(RegionResponse::from_snapshot(&snapshot, DataSource::Cache))
            }
            (FreshnessDecision::Stale, Some(snapshot)) => {
                self.spawn_refresh(center, radius_km, generation);
                Ok(RegionResponse::from_snapshot(&snapshot, DataSource::StaleCache))
            }
            _ => self.fetch_for_request(center, radius_km, generation).await,
        }
    }

    /// Current fetch state
    pub fn state(&self) -> OrchestratorState {
        *self.inner.state.borrow()
    }

    /// Receiver notified on every Idle/Fetching transition
    pub fn subscribe_state(&self) -> watch::Receiver<OrchestratorState> {
        self.inner.state.subscribe()
    }

    /// Number of valid region requests accepted so far
    pub fn requests_started(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<GeoCacheStore> {
        &self.inner.store
    }

    /// Stop queued background refreshes. A fetch already on the wire still
    /// completes and is saved.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != generation
    }

    async fn evaluate(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> (FreshnessDecision, Option<Arc<CachedRegionSnapshot>>) {
        let snapshot = self.inner.store.load().await.into_value();
        let decision = self.inner.policy.evaluate(
            snapshot.as_deref(),
            center,
            radius_km,
            self.inner.clock.now_ms(),
        );
        (decision, snapshot)
    }

    async fn fetch_for_request(
        &self,
        center: GeoPoint,
        radius_km: f64,
        generation: u64,
    ) -> Result<RegionResponse, RegionError> {
        let gate = self.inner.fetch_gate.clone().lock_owned().await;
        if self.is_superseded(generation) {
            return Err(RegionError::Superseded);
        }

        // The fetch that held the gate may have stored what this request needs
        let (decision, snapshot) = self.evaluate(center, radius_km).await;
        if let (FreshnessDecision::Hit, Some(snapshot)) = (decision, &snapshot) {
            return Ok(RegionResponse::from_snapshot(snapshot, DataSource::Cache));
        }

        if let Some(expired) = snapshot.filter(|s| {
            self.inner
                .policy
                .is_expired(s.captured_at(), self.inner.clock.now_ms())
        }) {
            tracing::debug!(
                age_ms = expired.age_ms(self.inner.clock.now_ms()),
                "Discarding expired region snapshot"
            );
            let _ = self.inner.store.clear().await;
        }

        let outcome = self.spawn_fetch(gate, center, radius_km).await;
        if self.is_superseded(generation) {
            tracing::debug!(generation, "Region fetch settled for a superseded request");
            return Err(RegionError::Superseded);
        }

        let snapshot = outcome?;
        Ok(RegionResponse::from_snapshot(&snapshot, DataSource::Network))
    }

    fn spawn_refresh(&self, center: GeoPoint, radius_km: f64, generation: u64) {
        let this = self.clone();
        tokio::spawn(async move {
            let gate = tokio::select! {
                _ = this.inner.shutdown.cancelled() => return,
                gate = this.inner.fetch_gate.clone().lock_owned() => gate,
            };
            if this.is_superseded(generation) {
                tracing::debug!(generation, "Skipping background refresh for superseded request");
                return;
            }
            // Failure is already logged and counted; the caller has stale data
            let _ = this.spawn_fetch(gate, center, radius_km).await;
        });
    }

    /// Fetch and save on a separate task holding `gate`, so that dropping
    /// the caller neither aborts the fetch nor releases the gate early.
    async fn spawn_fetch(
        &self,
        gate: OwnedMutexGuard<()>,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Arc<CachedRegionSnapshot>, NetworkError> {
        let this = self.clone();
        let task = tokio::spawn(async move {
            let _gate = gate;
            this.fetch_and_save(center, radius_km).await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Region fetch task failed");
                Err(NetworkError::Connection(format!("region fetch task failed: {}", e)))
            }
        }
    }

    async fn fetch_and_save(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Arc<CachedRegionSnapshot>, NetworkError> {
        let _fetching = FetchingGuard::enter(&self.inner.state);
        self.inner.metrics.increment_network_fetches();

        match self.inner.fetcher.fetch_region(center, radius_km).await {
            Ok(data) => {
                tracing::info!(
                    center = %center,
                    radius_km,
                    events = data.events.len(),
                    locations = data.locations.len(),
                    "Fetched region"
                );
                Ok(self.inner.store.save(data, center).await.into_value())
            }
            Err(e) => {
                self.inner.metrics.increment_network_failures();
                tracing::warn!(center = %center, radius_km, error = %e, "Region fetch failed");
                Err(e)
            }
        }
    }
}
