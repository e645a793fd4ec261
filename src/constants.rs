// Constants module - centralized default values for configuration
//
// Every default used by the config layer and the cache components lives here
// so the numbers are visible in one place.

// =============================================================================
// Freshness defaults
// =============================================================================

/// Age after which a region snapshot is treated as absent (15 minutes)
pub const DEFAULT_EXPIRY_WINDOW_MS: u64 = 15 * 60 * 1000;

/// Mean Earth radius in kilometres used by the haversine distance
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// =============================================================================
// Storage defaults
// =============================================================================

/// Default directory for persisted cache data
pub const DEFAULT_STORAGE_ROOT: &str = "./mapcache-data";

/// Fixed storage key of the single region snapshot
pub const DEFAULT_SNAPSHOT_KEY: &str = "map_region_snapshot";

/// Schema version written into every persisted snapshot
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Network defaults
// =============================================================================

/// Default map backend address
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Path of the region endpoint, relative to the base URL
pub const REGION_ENDPOINT_PATH: &str = "/map/region";

/// Default region fetch timeout in seconds
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 20;

/// Default user agent for outgoing requests
pub const DEFAULT_USER_AGENT: &str = concat!("mapcache/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Image cache defaults
// =============================================================================

/// Default image cache bound in megabytes
pub const DEFAULT_IMAGE_CACHE_MAX_SIZE_MB: u64 = 100;

/// Default retention for the startup sweep (7 days)
pub const DEFAULT_IMAGE_RETENTION_DAYS: u64 = 7;

/// Default sub-directory for image blobs
pub const DEFAULT_IMAGE_DIR_NAME: &str = "images";

/// File name of the persisted image index
pub const IMAGE_INDEX_FILE: &str = "index.json";

/// Minimum gap between index writes triggered only by access-time updates
pub const IMAGE_ACCESS_PERSIST_INTERVAL_MS: u64 = 60 * 1000;

// =============================================================================
// Warming and monitoring defaults
// =============================================================================

/// Default interval between warming passes (5 minutes)
pub const DEFAULT_WARMING_INTERVAL_SECS: u64 = 300;

/// Default age after which a warmed image is prefetched again (1 hour)
pub const DEFAULT_REWARM_AFTER_SECS: u64 = 3600;

/// Default maximum number of URIs prefetched per warming pass
pub const DEFAULT_WARMING_MAX_BATCH: usize = 50;

/// Default number of concurrent prefetches within a pass
pub const DEFAULT_WARMING_CONCURRENCY: usize = 4;

/// Default interval between monitor samples (1 minute)
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 60;

// =============================================================================
// Logging defaults
// =============================================================================

/// Default log level filter
pub const DEFAULT_LOG_LEVEL: &str = "info";
