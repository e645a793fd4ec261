//! Image cache entry and index
//!
//! The index maps source URIs to entries and keeps a running byte total.
//! LRU order is (last_accessed_at, access_seq): the sequence number breaks
//! ties between accesses within the same millisecond.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::clock::Timestamp;

/// Blob owned by the image cache.
///
/// Only the cache resolves it to a file; callers look images up by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalRef(String);

impl LocalRef {
    pub(crate) fn new(file_name: String) -> Self {
        Self(file_name)
    }

    pub(crate) fn file_name(&self) -> &str {
        &self.0
    }
}

/// Metadata for one cached image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCacheEntry {
    uri: String,
    local_ref: LocalRef,
    size_bytes: u64,
    created_at: Timestamp,
    last_accessed_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warmed_at: Option<Timestamp>,
    #[serde(default)]
    access_seq: u64,
}

impl ImageCacheEntry {
    pub(crate) fn new(
        uri: String,
        local_ref: LocalRef,
        size_bytes: u64,
        now: Timestamp,
        warmed: bool,
    ) -> Self {
        Self {
            uri,
            local_ref,
            size_bytes,
            created_at: now,
            last_accessed_at: now,
            warmed_at: warmed.then_some(now),
            access_seq: 0,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> Timestamp {
        self.last_accessed_at
    }

    pub fn warmed_at(&self) -> Option<Timestamp> {
        self.warmed_at
    }

    pub(crate) fn local_ref(&self) -> &LocalRef {
        &self.local_ref
    }

    /// True if warmed no longer than `max_age_ms` before `now`
    pub fn is_recently_warmed(&self, now: Timestamp, max_age_ms: u64) -> bool {
        self.warmed_at
            .map(|at| now.saturating_sub(at) <= max_age_ms)
            .unwrap_or(false)
    }

    fn lru_key(&self) -> (Timestamp, u64) {
        (self.last_accessed_at, self.access_seq)
    }
}

/// In-memory index of cached images
#[derive(Debug, Default)]
pub(crate) struct ImageIndex {
    entries: HashMap<String, ImageCacheEntry>,
    total_size: u64,
    next_seq: u64,
}

impl ImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from persisted entries
    pub fn from_entries(entries: Vec<ImageCacheEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.next_seq = index.next_seq.max(entry.access_seq + 1);
            index.total_size += entry.size_bytes;
            if let Some(old) = index.entries.insert(entry.uri.clone(), entry) {
                index.total_size -= old.size_bytes;
            }
        }
        index
    }

    pub fn get(&self, uri: &str) -> Option<&ImageCacheEntry> {
        self.entries.get(uri)
    }

    /// Insert or replace; returns the replaced entry
    pub fn insert(&mut self, mut entry: ImageCacheEntry) -> Option<ImageCacheEntry> {
        entry.access_seq = self.bump_seq();
        self.total_size += entry.size_bytes;
        let replaced = self.entries.insert(entry.uri.clone(), entry);
        if let Some(old) = &replaced {
            self.total_size -= old.size_bytes;
        }
        replaced
    }

    pub fn remove(&mut self, uri: &str) -> Option<ImageCacheEntry> {
        let removed = self.entries.remove(uri);
        if let Some(entry) = &removed {
            self.total_size -= entry.size_bytes;
        }
        removed
    }

    /// Record an access; returns false if `uri` is not indexed
    pub fn touch(&mut self, uri: &str, now: Timestamp) -> bool {
        let seq = self.next_seq;
        match self.entries.get_mut(uri) {
            Some(entry) => {
                entry.last_accessed_at = now;
                entry.access_seq = seq;
                self.next_seq += 1;
                true
            }
            None => false,
        }
    }

    pub fn mark_warmed(&mut self, uri: &str, now: Timestamp) -> bool {
        match self.entries.get_mut(uri) {
            Some(entry) => {
                entry.warmed_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Least recently accessed entry, skipping `protected`
    pub fn find_lru(&self, protected: Option<&str>) -> Option<&ImageCacheEntry> {
        self.entries
            .values()
            .filter(|e| Some(e.uri.as_str()) != protected)
            .min_by_key(|e| e.lru_key())
    }

    /// URIs not accessed since `cutoff`
    pub fn accessed_before(&self, cutoff: Timestamp) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.last_accessed_at < cutoff)
            .map(|e| e.uri.clone())
            .collect()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) -> Vec<ImageCacheEntry> {
        self.total_size = 0;
        self.entries.drain().map(|(_, e)| e).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ImageCacheEntry> {
        self.entries.values()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Serializable form of the index
#[derive(Serialize, Deserialize)]
pub(crate) struct IndexSnapshot {
    pub version: u32,
    pub entries: Vec<ImageCacheEntry>,
}
