//! In-memory backend (ephemeral storage and fault injection for tests)

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::backend::BlobBackend;
use crate::cache::error::CacheError;

/// Backend that keeps files in a HashMap
#[derive(Clone, Default)]
pub struct MemoryBackend {
    files: Arc<RwLock<HashMap<PathBuf, Bytes>>>,
    /// Simulate errors if true
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail with an I/O error
    pub fn set_fail_reads(&self, enabled: bool) {
        self.fail_reads.store(enabled, Ordering::SeqCst);
    }

    /// Make every write and delete fail with an I/O error
    pub fn set_fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    /// Store raw bytes, bypassing failure simulation
    pub fn put_raw(&self, path: impl Into<PathBuf>, data: impl Into<Bytes>) {
        self.files.write().insert(path.into(), data.into());
    }

    /// Raw bytes stored at `path`, if any
    pub fn get_raw(&self, path: &Path) -> Option<Bytes> {
        self.files.read().get(path).cloned()
    }

    /// Get number of stored files
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    fn simulated(&self, flag: &AtomicBool, op: &str) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Simulated {} failure", op),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn read_file(&self, path: &Path) -> Result<Bytes, CacheError> {
        self.simulated(&self.fail_reads, "read")?;

        self.files.read().get(path).cloned().ok_or_else(|| {
            CacheError::Storage(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "File not found",
            ))
        })
    }

    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), CacheError> {
        self.simulated(&self.fail_writes, "write")?;
        self.files.write().insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<(), CacheError> {
        self.simulated(&self.fail_writes, "delete")?;
        self.files.write().remove(path);
        Ok(())
    }

    async fn create_dir_all(&self, _path: &Path) -> Result<(), CacheError> {
        self.simulated(&self.fail_writes, "mkdir")
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, CacheError> {
        self.simulated(&self.fail_reads, "read_dir")?;

        Ok(self
            .files
            .read()
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}
