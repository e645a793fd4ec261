//! Cache error types
//!
//! This module defines the errors raised inside the cache layer. None of
//! them reach the map screen: the store and image cache wrap them in
//! `NonFatal` results and degrade to cache-miss behaviour.

use thiserror::Error;

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    /// Persistent storage read/write failure
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Corrupt or incompatible persisted payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Single image failed to warm
    #[error("Prefetch error for {uri}: {reason}")]
    Prefetch { uri: String, reason: String },

    /// Entry rejected because it can never fit the configured bound
    #[error("Entry of {size_bytes} bytes exceeds cache bound of {max_bytes} bytes")]
    EntryTooLarge { size_bytes: u64, max_bytes: u64 },

    /// Invalid cache configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl CacheError {
    /// Short label used for log fields and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Storage(_) => "storage",
            CacheError::Serialization(_) => "serialization",
            CacheError::Prefetch { .. } => "prefetch",
            CacheError::EntryTooLarge { .. } => "entry_too_large",
            CacheError::Configuration(_) => "configuration",
        }
    }

    /// True if the persisted data was missing rather than unreadable
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Storage(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
