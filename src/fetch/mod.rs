//! Region fetch collaborator
//!
//! The orchestrator only sees `RegionFetcher`. `HttpRegionFetcher` talks to
//! the map backend over HTTP; timeouts are enforced by the HTTP client, not by
//! the cache layer.
//!
//! Request: `GET {base_url}/map/region?longitude=..&latitude=..&radius_km=..`
//! Response: `{"events": [...], "locations": [...]}`

use async_trait::async_trait;

use crate::cache::CacheError;
use crate::config::NetworkConfig;
use crate::constants::REGION_ENDPOINT_PATH;
use crate::error::NetworkError;
use crate::geo::GeoPoint;
use crate::region::RegionData;

/// Source of region data for a center and radius
#[async_trait]
pub trait RegionFetcher: Send + Sync {
    /// One fetch attempt; no retries
    async fn fetch_region(&self, center: GeoPoint, radius_km: f64) -> Result<RegionData, NetworkError>;
}

/// `RegionFetcher` backed by reqwest
#[derive(Clone)]
pub struct HttpRegionFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRegionFetcher {
    /// Build a fetcher from the network section of the config
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` if the HTTP client cannot be created.
    pub fn new(config: &NetworkConfig) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CacheError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                REGION_ENDPOINT_PATH
            ),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RegionFetcher for HttpRegionFetcher {
    async fn fetch_region(&self, center: GeoPoint, radius_km: f64) -> Result<RegionData, NetworkError> {
        tracing::debug!(endpoint = %self.endpoint, center = %center, radius_km, "Fetching region");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("longitude", center.longitude),
                ("latitude", center.latitude),
                ("radius_km", radius_km),
            ])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }

        response.json::<RegionData>().await.map_err(map_reqwest_error)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout
    } else if e.is_decode() {
        NetworkError::Decode(e.to_string())
    } else if let Some(status) = e.status() {
        NetworkError::Status(status.as_u16())
    } else {
        NetworkError::Connection(e.to_string())
    }
}
