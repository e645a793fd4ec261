//! Image prefetch collaborator

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::cache::CacheError;
use crate::config::NetworkConfig;

/// Downloads image bytes for the warmer
#[async_trait]
pub trait ImagePrefetcher: Send + Sync {
    /// Fetch `uri`; failures are reported as `CacheError::Prefetch`
    async fn prefetch(&self, uri: &str) -> Result<Bytes, CacheError>;
}

/// `ImagePrefetcher` backed by reqwest
#[derive(Clone)]
pub struct HttpImagePrefetcher {
    client: reqwest::Client,
}

impl HttpImagePrefetcher {
    pub fn new(config: &NetworkConfig) -> Result<Self, CacheError> {
        Self::with_timeout(config.timeout(), &config.user_agent)
    }

    pub fn with_timeout(timeout: Duration, user_agent: &str) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| CacheError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImagePrefetcher for HttpImagePrefetcher {
    async fn prefetch(&self, uri: &str) -> Result<Bytes, CacheError> {
        let failed = |reason: String| CacheError::Prefetch {
            uri: uri.to_string(),
            reason,
        };

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| failed(format!("HTTP fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(failed(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| failed(format!("Failed to read HTTP body: {e}")))
    }
}
