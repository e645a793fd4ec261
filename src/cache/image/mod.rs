//! Bounded image cache
//!
//! Blobs live in one directory, named by the SHA-256 of their source URI. A
//! JSON index beside them records size and access times so the startup sweep
//! can see entries from earlier sessions.
//!
//! Invariants:
//! - `total_size()` never exceeds the configured bound after an insert returns
//! - eviction removes the least recently accessed entry first, never the
//!   entry being inserted
//! - access times reach storage at most `IMAGE_ACCESS_PERSIST_INTERVAL_MS`
//!   after a hit, so a killed process does not lose them

use bytes::Bytes;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::CacheError;
use super::stats::CacheMetrics;
use super::storage::{sha256_hex, BlobBackend};
use crate::clock::Clock;
use crate::constants::{IMAGE_ACCESS_PERSIST_INTERVAL_MS, IMAGE_INDEX_FILE};
use crate::error::NonFatal;

mod entry;

pub use entry::{ImageCacheEntry, LocalRef};
use entry::{ImageIndex, IndexSnapshot};

const INDEX_VERSION: u32 = 1;
const BLOB_EXTENSION: &str = "img";

/// Persistent LRU cache of image bytes keyed by URI
pub struct ImageCache {
    backend: Arc<dyn BlobBackend>,
    dir: PathBuf,
    max_size_bytes: u64,
    index: RwLock<ImageIndex>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CacheMetrics>,
    /// Serializes index writes so an older index never overwrites a newer one
    persist_lock: tokio::sync::Mutex<()>,
    /// Clock time of the last index write
    persisted_at: AtomicU64,
}

impl ImageCache {
    /// Open the cache in `dir`, restoring the persisted index.
    ///
    /// A missing index opens empty. An unreadable or corrupt index also opens
    /// empty and reports the degradation; the orphaned blobs are removed by
    /// the next `clear_old_cache`.
    pub async fn open(
        backend: Arc<dyn BlobBackend>,
        dir: impl Into<PathBuf>,
        max_size_bytes: u64,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetrics>,
    ) -> NonFatal<Self> {
        let dir = dir.into();
        let persisted_at = AtomicU64::new(clock.now_ms());
        let mut cache = Self {
            backend,
            dir,
            max_size_bytes,
            index: RwLock::new(ImageIndex::new()),
            clock,
            metrics,
            persist_lock: tokio::sync::Mutex::new(()),
            persisted_at,
        };

        let created = cache.backend.create_dir_all(&cache.dir).await;
        if let Err(e) = created {
            return NonFatal::degraded(cache, e, "image_cache.open");
        }

        let loaded = cache.load_index().await;
        let result = match loaded {
            Ok(Some(index)) => {
                cache.index = RwLock::new(index);
                None
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };

        // The bound may have shrunk since the index was written
        let evicted = evict_over_bound(cache.index.get_mut(), cache.max_size_bytes, None);
        if !evicted.is_empty() {
            cache.discard_evicted(&evicted).await;
            cache.persist_logged().await;
        }

        cache.update_size_gauge();
        tracing::debug!(
            dir = %cache.dir.display(),
            entries = cache.len(),
            total_bytes = cache.total_size(),
            "Opened image cache"
        );

        match result {
            None => NonFatal::Ok(cache),
            Some(e) => NonFatal::degraded(cache, e, "image_cache.open"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Bytes currently held
    pub fn total_size(&self) -> u64 {
        self.index.read().total_size()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the entry metadata for `uri`
    pub fn entry(&self, uri: &str) -> Option<ImageCacheEntry> {
        self.index.read().get(uri).cloned()
    }

    /// Store an image fetched on demand
    pub async fn insert(&self, uri: &str, data: Bytes) -> Result<(), CacheError> {
        self.insert_inner(uri, data, false).await
    }

    /// Store an image fetched by the warmer, stamping `warmed_at`
    pub async fn insert_warmed(&self, uri: &str, data: Bytes) -> Result<(), CacheError> {
        self.insert_inner(uri, data, true).await
    }

    async fn insert_inner(&self, uri: &str, data: Bytes, warmed: bool) -> Result<(), CacheError> {
        let size_bytes = data.len() as u64;
        if size_bytes > self.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                size_bytes,
                max_bytes: self.max_size_bytes,
            });
        }

        let local_ref = LocalRef::new(format!("{}.{}", sha256_hex(uri), BLOB_EXTENSION));
        self.backend
            .write_file_atomic(&self.blob_path(&local_ref), data)
            .await?;

        let now = self.clock.now_ms();
        let evicted = {
            let mut index = self.index.write();
            index.insert(ImageCacheEntry::new(
                uri.to_string(),
                local_ref,
                size_bytes,
                now,
                warmed,
            ));

            evict_over_bound(&mut index, self.max_size_bytes, Some(uri))
        };
        self.discard_evicted(&evicted).await;

        self.update_size_gauge();
        self.persist_logged().await;
        Ok(())
    }

    /// Image bytes for `uri`, counting a hit or miss.
    ///
    /// A hit refreshes the entry's access time. An entry whose blob has gone
    /// missing is dropped and reported as a degraded miss.
    pub async fn lookup(&self, uri: &str) -> NonFatal<Option<Bytes>> {
        let local_ref = match self.index.read().get(uri) {
            Some(entry) => entry.local_ref().clone(),
            None => {
                self.metrics.increment_misses();
                return NonFatal::Ok(None);
            }
        };

        match self.backend.read_file(&self.blob_path(&local_ref)).await {
            Ok(data) => {
                self.index.write().touch(uri, self.clock.now_ms());
                self.metrics.increment_hits();
                self.persist_access_times().await;
                NonFatal::Ok(Some(data))
            }
            Err(e) => {
                self.metrics.increment_misses();
                if e.is_not_found() {
                    self.index.write().remove(uri);
                    self.update_size_gauge();
                    self.persist_logged().await;
                }
                NonFatal::degraded(None, e, "image_cache.lookup")
            }
        }
    }

    /// Refresh the access time of `uri` without reading it; false if absent
    pub async fn touch(&self, uri: &str) -> bool {
        let touched = self.index.write().touch(uri, self.clock.now_ms());
        if touched {
            self.persist_access_times().await;
        }
        touched
    }

    /// True if `uri` is cached and was warmed within `max_age_ms`
    pub fn contains_warm(&self, uri: &str, max_age_ms: u64) -> bool {
        let now = self.clock.now_ms();
        self.index
            .read()
            .get(uri)
            .map(|entry| entry.is_recently_warmed(now, max_age_ms))
            .unwrap_or(false)
    }

    /// Drop `uri` from the cache; true if it was present
    pub async fn remove(&self, uri: &str) -> NonFatal<bool> {
        let Some(entry) = self.index.write().remove(uri) else {
            return NonFatal::Ok(false);
        };
        self.update_size_gauge();

        let deleted = self.backend.delete_file(&self.blob_path(entry.local_ref())).await;
        let persisted = self.persist().await;
        match deleted.and(persisted) {
            Ok(()) => NonFatal::Ok(true),
            Err(e) => NonFatal::degraded(true, e, "image_cache.remove"),
        }
    }

    /// Drop every entry and blob
    pub async fn clear(&self) -> NonFatal<()> {
        let entries = self.index.write().clear();
        self.update_size_gauge();

        let mut first_error = None;
        for entry in &entries {
            if let Err(e) = self.backend.delete_file(&self.blob_path(entry.local_ref())).await {
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.persist().await {
            first_error.get_or_insert(e);
        }

        tracing::info!(removed = entries.len(), "Cleared image cache");
        match first_error {
            None => NonFatal::Ok(()),
            Some(e) => NonFatal::degraded((), e, "image_cache.clear"),
        }
    }

    /// Remove entries not accessed within `retention_ms`, plus any blob the
    /// index does not reference. Returns the number of entries removed.
    ///
    /// Meant to run once at startup, before anything inserts.
    pub async fn clear_old_cache(&self, retention_ms: u64) -> NonFatal<usize> {
        let cutoff = self.clock.now_ms().saturating_sub(retention_ms);
        let expired: Vec<ImageCacheEntry> = {
            let mut index = self.index.write();
            index
                .accessed_before(cutoff)
                .iter()
                .filter_map(|uri| index.remove(uri))
                .collect()
        };
        self.update_size_gauge();

        let mut first_error = None;
        for entry in &expired {
            if let Err(e) = self.backend.delete_file(&self.blob_path(entry.local_ref())).await {
                first_error.get_or_insert(e);
            }
        }

        let orphans = match self.remove_orphans().await {
            Ok(count) => count,
            Err(e) => {
                first_error.get_or_insert(e);
                0
            }
        };

        if let Err(e) = self.persist().await {
            first_error.get_or_insert(e);
        }

        tracing::info!(
            removed = expired.len(),
            orphans = orphans,
            retention_ms = retention_ms,
            remaining_bytes = self.total_size(),
            "Cleared old image cache entries"
        );

        match first_error {
            None => NonFatal::Ok(expired.len()),
            Some(e) => NonFatal::degraded(expired.len(), e, "image_cache.clear_old_cache"),
        }
    }

    /// Write the index to storage now
    pub async fn flush(&self) -> NonFatal<()> {
        match self.persist().await {
            Ok(()) => NonFatal::Ok(()),
            Err(e) => NonFatal::degraded((), e, "image_cache.flush"),
        }
    }

    fn blob_path(&self, local_ref: &LocalRef) -> PathBuf {
        self.dir.join(local_ref.file_name())
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(IMAGE_INDEX_FILE)
    }

    fn update_size_gauge(&self) {
        self.metrics.set_image_cache_bytes(self.total_size());
    }

    async fn load_index(&self) -> Result<Option<ImageIndex>, CacheError> {
        let raw = match self.backend.read_file(&self.index_path()).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let snapshot: IndexSnapshot = serde_json::from_slice(&raw)?;
        if snapshot.version != INDEX_VERSION {
            return Err(CacheError::Serialization(format!(
                "image index version {} (expected {})",
                snapshot.version, INDEX_VERSION
            )));
        }

        Ok(Some(ImageIndex::from_entries(snapshot.entries)))
    }

    async fn persist(&self) -> Result<(), CacheError> {
        let _guard = self.persist_lock.lock().await;
        let json = {
            let index = self.index.read();
            serde_json::to_vec(&IndexSnapshot {
                version: INDEX_VERSION,
                entries: index.entries().cloned().collect(),
            })?
        };
        self.backend
            .write_file_atomic(&self.index_path(), Bytes::from(json))
            .await?;
        self.persisted_at.store(self.clock.now_ms(), Ordering::SeqCst);
        Ok(())
    }

    /// Write the index if the last write is older than the access interval
    async fn persist_access_times(&self) {
        let now = self.clock.now_ms();
        let last = self.persisted_at.load(Ordering::SeqCst);
        if now.saturating_sub(last) >= IMAGE_ACCESS_PERSIST_INTERVAL_MS {
            self.persist_logged().await;
        }
    }

    async fn discard_evicted(&self, evicted: &[ImageCacheEntry]) {
        if evicted.is_empty() {
            return;
        }
        for entry in evicted {
            tracing::debug!(
                uri = %entry.uri(),
                size_bytes = entry.size_bytes(),
                last_accessed_at = entry.last_accessed_at(),
                "Evicted image"
            );
            self.delete_blob(entry.local_ref()).await;
        }
        self.metrics.add_evictions(evicted.len() as u64);
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "Failed to persist image index");
        }
    }

    async fn delete_blob(&self, local_ref: &LocalRef) {
        if let Err(e) = self.backend.delete_file(&self.blob_path(local_ref)).await {
            tracing::warn!(file = %local_ref.file_name(), error = %e, "Failed to delete image blob");
        }
    }

    async fn remove_orphans(&self) -> Result<usize, CacheError> {
        let files = self.backend.read_dir(&self.dir).await?;
        let referenced: std::collections::HashSet<String> = self
            .index
            .read()
            .entries()
            .map(|e| e.local_ref().file_name().to_string())
            .collect();

        let mut removed = 0;
        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == IMAGE_INDEX_FILE || referenced.contains(name) {
                continue;
            }
            tracing::debug!(file = %name, "Removing orphaned image file");
            self.backend.delete_file(&path).await?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Remove least recently accessed entries until the index fits `max_size_bytes`
fn evict_over_bound(
    index: &mut ImageIndex,
    max_size_bytes: u64,
    protected: Option<&str>,
) -> Vec<ImageCacheEntry> {
    let mut evicted = Vec::new();
    while index.total_size() > max_size_bytes {
        let Some(victim) = index.find_lru(protected).map(|e| e.uri().to_string()) else {
            break;
        };
        if let Some(entry) = index.remove(&victim) {
            evicted.push(entry);
        }
    }
    evicted
}
