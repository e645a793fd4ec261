// Cache module
//
// - `store`: the single persisted region snapshot
// - `freshness`: HIT/STALE/MISS decision for a viewport
// - `image`: bounded LRU image cache with a persisted index
// - `storage`: backends both caches persist through
// - `stats`: counters read by the monitor

pub mod error;
pub mod freshness;
pub mod image;
pub mod stats;
pub mod storage;
pub mod store;

pub use error::CacheError;
pub use freshness::{FreshnessDecision, FreshnessPolicy};
pub use image::{ImageCache, ImageCacheEntry};
pub use stats::{CacheMetrics, MetricsSnapshot};
pub use storage::{BackendStorage, BlobBackend, KeyValueStorage, MemoryBackend, TokioFsBackend};
pub use store::GeoCacheStore;
