//! Tokio-based filesystem backend (portable, works on all platforms)

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::backend::BlobBackend;
use crate::cache::error::CacheError;

/// Distinguishes concurrent writes to the same path
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Portable filesystem backend using tokio::fs
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFsBackend;

impl TokioFsBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BlobBackend for TokioFsBackend {
    async fn read_file(&self, path: &Path) -> Result<Bytes, CacheError> {
        let data = tokio::fs::read(path).await?;
        Ok(Bytes::from(data))
    }

    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never observe a half-written file
        let temp_path = temp_path_for(path);
        if let Err(e) = tokio::fs::write(&temp_path, &data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        tokio::fs::rename(&temp_path, path).await?;

        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<(), CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, CacheError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.path());
        }
        Ok(entries)
    }
}

/// Sibling of `path` unique to this process and write
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!("{}.{}.{}.tmp", name, std::process::id(), seq))
}
