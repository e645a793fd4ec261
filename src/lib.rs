// Map data caching and freshness layer
//
// In-process library: a persisted single-region snapshot with a freshness
// policy, a fetch orchestrator with single-flight protection, and a bounded
// image cache kept warm in the background.

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod logging;
pub mod monitor;
pub mod orchestrator;
pub mod region;
pub mod service;
pub mod warming;

pub use cache::{FreshnessDecision, FreshnessPolicy, GeoCacheStore, ImageCache};
pub use error::{NetworkError, NonFatal, RegionError};
pub use geo::GeoPoint;
pub use orchestrator::{DataSource, MapDataOrchestrator, RegionResponse};
pub use region::{CachedRegionSnapshot, Event, Location, RegionData};
pub use service::{Collaborators, MapCacheService};
