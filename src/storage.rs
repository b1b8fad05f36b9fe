//! Blob storage contract and the filesystem implementation.
//!
//! Raw uploads and extracted XML documents are archived as immutable blobs.
//! `put` tolerates overwriting an already-uploaded blob with the same
//! content — replays of a processing run must be idempotent.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Io(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, uri: &str) -> Result<Vec<u8>, StorageError>;
    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Filesystem-backed blob store. URIs are slash-separated paths below the
/// configured root; traversal outside the root is rejected.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(uri);
        let traversal = rel.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if uri.is_empty() || traversal {
            return Err(StorageError::Io(format!("invalid blob URI '{uri}'")));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(uri)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(uri.to_owned()))
            }
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }
}
