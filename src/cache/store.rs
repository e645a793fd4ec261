//! Geo-cache store
//!
//! Durable storage of exactly one region snapshot under a fixed key. Every
//! operation absorbs its own failures and returns a `NonFatal`: caching is an
//! optimization, so a broken store behaves like an empty one.

use std::sync::Arc;
use tokio::sync::watch;

use super::error::CacheError;
use super::storage::KeyValueStorage;
use crate::clock::Clock;
use crate::constants::SNAPSHOT_SCHEMA_VERSION;
use crate::error::NonFatal;
use crate::geo::GeoPoint;
use crate::region::{CachedRegionSnapshot, RegionData};

/// Single-slot persistent store for the current region snapshot
pub struct GeoCacheStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    key: String,
    /// Latest snapshot written or cleared through this store
    latest: watch::Sender<Option<Arc<CachedRegionSnapshot>>>,
}

impl GeoCacheStore {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            storage,
            clock,
            key: key.into(),
            latest,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist a new snapshot captured now, replacing any previous one.
    ///
    /// The snapshot is returned even when persisting failed so the caller can
    /// still serve it; the next `load` then behaves as a miss.
    pub async fn save(
        &self,
        data: RegionData,
        center: GeoPoint,
    ) -> NonFatal<Arc<CachedRegionSnapshot>> {
        let snapshot = Arc::new(CachedRegionSnapshot::new(
            data,
            center,
            self.clock.now_ms(),
        ));

        let json = match serde_json::to_string(snapshot.as_ref()) {
            Ok(json) => json,
            Err(e) => return NonFatal::degraded(snapshot, e.into(), "region_store.save"),
        };

        if let Err(e) = self.storage.set_item(&self.key, json).await {
            return NonFatal::degraded(snapshot, e, "region_store.save");
        }

        tracing::debug!(
            center = %center,
            events = snapshot.events().len(),
            locations = snapshot.locations().len(),
            captured_at = snapshot.captured_at(),
            "Saved region snapshot"
        );
        self.latest.send_replace(Some(snapshot.clone()));

        NonFatal::Ok(snapshot)
    }

    /// Read the persisted snapshot.
    ///
    /// Missing entries load as `None`. Corrupt or incompatible entries also
    /// load as `None` and are removed so the next read starts clean.
    pub async fn load(&self) -> NonFatal<Option<Arc<CachedRegionSnapshot>>> {
        let raw = match self.storage.get_item(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return NonFatal::Ok(None),
            Err(e @ CacheError::Serialization(_)) => {
                self.discard_corrupt().await;
                return NonFatal::degraded(None, e, "region_store.load");
            }
            Err(e) => return NonFatal::degraded(None, e, "region_store.load"),
        };

        let snapshot: CachedRegionSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.discard_corrupt().await;
                return NonFatal::degraded(None, e.into(), "region_store.load");
            }
        };

        if snapshot.version() != SNAPSHOT_SCHEMA_VERSION {
            self.discard_corrupt().await;
            return NonFatal::degraded(
                None,
                CacheError::Serialization(format!(
                    "snapshot schema version {} (expected {})",
                    snapshot.version(),
                    SNAPSHOT_SCHEMA_VERSION
                )),
                "region_store.load",
            );
        }

        NonFatal::Ok(Some(Arc::new(snapshot)))
    }

    /// Remove the persisted snapshot unconditionally
    pub async fn clear(&self) -> NonFatal<()> {
        self.latest.send_replace(None);
        match self.storage.remove_item(&self.key).await {
            Ok(()) => NonFatal::Ok(()),
            Err(e) => NonFatal::degraded((), e, "region_store.clear"),
        }
    }

    /// Receiver notified on every successful save and on clear
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CachedRegionSnapshot>>> {
        self.latest.subscribe()
    }

    async fn discard_corrupt(&self) {
        if let Err(e) = self.storage.remove_item(&self.key).await {
            tracing::warn!(key = %self.key, error = %e, "Failed to remove corrupt region snapshot");
        }
    }
}
