//! Backend trait for filesystem operations

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::cache::error::CacheError;

/// Abstraction over the device storage the caches persist into
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Read entire file contents
    async fn read_file(&self, path: &Path) -> Result<Bytes, CacheError>;

    /// Write file contents atomically (using temp file + rename)
    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), CacheError>;

    /// Delete a file; deleting a missing file succeeds
    async fn delete_file(&self, path: &Path) -> Result<(), CacheError>;

    /// Create directory and all parent directories
    async fn create_dir_all(&self, path: &Path) -> Result<(), CacheError>;

    /// List all files in a directory
    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, CacheError>;
}
