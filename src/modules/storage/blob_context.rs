//! Execution-context primitives of a platform-managed blob store.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::error::{Result, StorageError};

/// A blob as held by the platform store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Store/fetch/URL primitives supplied by the hosting platform.
///
/// The managed-blob provider cannot reach the platform on its own; callers
/// hand it one of these per call (or once, at construction).
#[async_trait]
pub trait BlobContext: Send + Sync {
    /// Persist a blob and return its opaque storage handle
    async fn store(&self, blob: StoredBlob) -> Result<String>;

    /// Resolve a handle to a fetchable URL, `None` if the handle is unknown
    async fn get_url(&self, handle: &str) -> Result<Option<String>>;

    /// Fetch a blob by handle, `None` if the handle is unknown
    async fn get(&self, handle: &str) -> Result<Option<StoredBlob>>;
}

/// Process-local blob store. Blobs are lost when it is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobContext {
    blobs: Arc<RwLock<HashMap<String, StoredBlob>>>,
}

impl InMemoryBlobContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobContext for InMemoryBlobContext {
    async fn store(&self, blob: StoredBlob) -> Result<String> {
        let handle = Uuid::now_v7().to_string();
        self.blobs.write().await.insert(handle.clone(), blob);
        tracing::debug!("Stored blob in memory with handle {}", handle);
        Ok(handle)
    }

    async fn get_url(&self, handle: &str) -> Result<Option<String>> {
        if !self.blobs.read().await.contains_key(handle) {
            return Ok(None);
        }

        Ok(Some(format!("memory://{}", handle)))
    }

    async fn get(&self, handle: &str) -> Result<Option<StoredBlob>> {
        Ok(self.blobs.read().await.get(handle).cloned())
    }
}

/// Sidecar written next to each blob
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobMeta {
    content_type: String,
    size: u64,
}

/// Blob store persisted under a local directory.
///
/// Each blob is written as `<root>/<handle>`, with its metadata in a
/// `<handle>.meta` JSON sidecar. Handles are UUIDs; anything else is treated
/// as unknown, so a handle can never address a path outside `root`.
#[derive(Debug, Clone)]
pub struct FsBlobContext {
    root: PathBuf,
}

impl FsBlobContext {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error("create blob directory", &root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `(data, meta)` paths for a handle issued by this store
    fn blob_paths(&self, handle: &str) -> Option<(PathBuf, PathBuf)> {
        let handle = Uuid::parse_str(handle.trim()).ok()?.to_string();
        Some((
            self.root.join(&handle),
            self.root.join(format!("{}.meta", handle)),
        ))
    }

    async fn read_meta(meta_path: &Path) -> Result<Option<BlobMeta>> {
        let bytes = match fs::read(meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read blob metadata", meta_path, e)),
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            StorageError::Blob(format!(
                "corrupt blob metadata {}: {}",
                meta_path.display(),
                e
            ))
        })
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Blob(format!("failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl BlobContext for FsBlobContext {
    async fn store(&self, blob: StoredBlob) -> Result<String> {
        let handle = Uuid::now_v7().to_string();
        let (data_path, meta_path) = self
            .blob_paths(&handle)
            .ok_or_else(|| StorageError::Blob(format!("invalid handle {}", handle)))?;

        let meta = BlobMeta {
            content_type: blob.content_type,
            size: blob.bytes.len() as u64,
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| StorageError::Blob(format!("failed to encode blob metadata: {}", e)))?;

        fs::write(&data_path, &blob.bytes)
            .await
            .map_err(|e| io_error("write blob", &data_path, e))?;
        // Metadata goes last: a blob without it is not visible yet
        fs::write(&meta_path, meta_bytes)
            .await
            .map_err(|e| io_error("write blob metadata", &meta_path, e))?;

        tracing::debug!(
            "Stored blob {} ({} bytes) under {}",
            handle,
            meta.size,
            self.root.display()
        );
        Ok(handle)
    }

    async fn get_url(&self, handle: &str) -> Result<Option<String>> {
        let Some((data_path, meta_path)) = self.blob_paths(handle) else {
            return Ok(None);
        };
        if Self::read_meta(&meta_path).await?.is_none() {
            return Ok(None);
        }

        let absolute = fs::canonicalize(&data_path)
            .await
            .map_err(|e| io_error("resolve blob", &data_path, e))?;
        Ok(Some(format!("file://{}", absolute.display())))
    }

    async fn get(&self, handle: &str) -> Result<Option<StoredBlob>> {
        let Some((data_path, meta_path)) = self.blob_paths(handle) else {
            return Ok(None);
        };
        let Some(meta) = Self::read_meta(&meta_path).await? else {
            return Ok(None);
        };

        let bytes = fs::read(&data_path)
            .await
            .map_err(|e| io_error("read blob", &data_path, e))?;

        Ok(Some(StoredBlob {
            bytes,
            content_type: meta.content_type,
        }))
    }
}
