//! Persistent storage for the caches
//!
//! Two layers:
//! - `BlobBackend`: byte-level file operations (tokio::fs on device, a
//!   HashMap in tests and ephemeral sessions)
//! - `KeyValueStorage`: the string key/value contract the region store
//!   persists its JSON snapshot through

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::error::CacheError;

pub mod backend;
pub mod memory_backend;
pub mod tokio_backend;

pub use backend::BlobBackend;
pub use memory_backend::MemoryBackend;
pub use tokio_backend::TokioFsBackend;

/// Device key/value storage
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Value stored under `key`, or None if absent
    async fn get_item(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_item(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Remove `key`; removing a missing key succeeds
    async fn remove_item(&self, key: &str) -> Result<(), CacheError>;
}

/// Key/value storage laid out as one file per key under `root`
#[derive(Clone)]
pub struct BackendStorage {
    backend: Arc<dyn BlobBackend>,
    root: PathBuf,
}

impl BackendStorage {
    pub fn new(backend: Arc<dyn BlobBackend>, root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key_to_file_stem(key)))
    }
}

#[async_trait]
impl KeyValueStorage for BackendStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, CacheError> {
        let data = match self.backend.read_file(&self.path_for(key)).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        String::from_utf8(data.to_vec())
            .map(Some)
            .map_err(|e| CacheError::Serialization(format!("Invalid UTF-8: {}", e)))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.backend
            .write_file_atomic(&self.path_for(key), Bytes::from(value))
            .await
    }

    async fn remove_item(&self, key: &str) -> Result<(), CacheError> {
        self.backend.delete_file(&self.path_for(key)).await
    }
}

/// SHA-256 of `input` as lowercase hex
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Keys made of filename-safe characters map to themselves, anything else is hashed
fn key_to_file_stem(key: &str) -> String {
    let safe = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if safe {
        key.to_string()
    } else {
        sha256_hex(key)
    }
}
