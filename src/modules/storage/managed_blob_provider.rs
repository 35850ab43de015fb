//! Platform-managed blob storage provider
//!
//! Stores proofs through the [`BlobContext`] primitives of the hosting
//! platform. A context passed with a call takes precedence over the one the
//! provider was built with; with neither, operations that must reach the
//! store report a missing context.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::error::{Result, StorageError};
use crate::modules::storage::blob_context::{BlobContext, StoredBlob};
use crate::modules::storage::object_name::build_object_name;
use crate::modules::storage::provider::{
    normalize_error, DownloadUrlResult, FileContentResult, StorageProvider, UploadResult,
};

const UPLOAD_FALLBACK: &str = "Managed blob upload failed";
const DOWNLOAD_URL_FALLBACK: &str = "Managed blob download URL generation failed";
const CONTENT_FALLBACK: &str = "Managed blob file fetch failed";

/// Note attached when a raw handle is returned in place of a URL
pub const HANDLE_NOTE: &str =
    "No execution context supplied; the url is a storage handle to resolve through the platform";

#[derive(Default)]
pub struct ManagedBlobProvider {
    default_context: Option<Arc<dyn BlobContext>>,
}

impl ManagedBlobProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `context` whenever a call does not bring its own
    pub fn with_context(context: Arc<dyn BlobContext>) -> Self {
        Self {
            default_context: Some(context),
        }
    }

    fn context<'a>(&'a self, ctx: Option<&'a dyn BlobContext>) -> Option<&'a dyn BlobContext> {
        match ctx {
            Some(ctx) => Some(ctx),
            None => self.default_context.as_deref(),
        }
    }

    async fn try_upload(
        &self,
        ctx: Option<&dyn BlobContext>,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
        donation_id: &str,
    ) -> Result<UploadResult> {
        let ctx = self
            .context(ctx)
            .ok_or(StorageError::MissingContext("Managed blob upload"))?;

        let object_name = build_object_name(donation_id, file_name);
        let size = data.len();
        let handle = ctx
            .store(StoredBlob {
                bytes: data,
                content_type: content_type.to_string(),
            })
            .await?;

        debug!(
            "Stored '{}' in managed blob store ({} bytes, handle {})",
            object_name, size, handle
        );

        Ok(UploadResult::uploaded(
            handle.clone(),
            object_name,
            Some(handle),
        ))
    }

    async fn try_download_url(
        &self,
        ctx: Option<&dyn BlobContext>,
        handle: &str,
    ) -> Result<DownloadUrlResult> {
        let Some(ctx) = self.context(ctx) else {
            return Ok(DownloadUrlResult {
                note: Some(HANDLE_NOTE.to_string()),
                ..DownloadUrlResult::issued(handle.to_string(), None)
            });
        };

        let url = ctx
            .get_url(handle)
            .await?
            .ok_or_else(|| StorageError::Blob(format!("no blob stored under handle {}", handle)))?;

        Ok(DownloadUrlResult::issued(url, None))
    }

    async fn try_file_content(
        &self,
        ctx: Option<&dyn BlobContext>,
        handle: &str,
    ) -> Result<FileContentResult> {
        let ctx = self
            .context(ctx)
            .ok_or(StorageError::MissingContext("Managed blob file fetch"))?;

        let blob = ctx
            .get(handle)
            .await?
            .ok_or_else(|| StorageError::Blob(format!("no blob stored under handle {}", handle)))?;

        Ok(FileContentResult::fetched(blob.bytes, blob.content_type, None))
    }
}

#[async_trait]
impl StorageProvider for ManagedBlobProvider {
    fn name(&self) -> &str {
        "Managed Blob Store"
    }

    async fn upload_file(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
        donation_id: &str,
        ctx: Option<&dyn BlobContext>,
    ) -> UploadResult {
        match self
            .try_upload(ctx, data, file_name, content_type, donation_id)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Managed blob upload for donation {} failed: {}", donation_id, e);
                UploadResult::failed(normalize_error(&e, UPLOAD_FALLBACK))
            }
        }
    }

    async fn get_download_url(
        &self,
        file_name: &str,
        ctx: Option<&dyn BlobContext>,
    ) -> DownloadUrlResult {
        match self.try_download_url(ctx, file_name).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Managed blob URL for '{}' failed: {}", file_name, e);
                DownloadUrlResult::failed(normalize_error(&e, DOWNLOAD_URL_FALLBACK))
            }
        }
    }

    async fn get_file_content(
        &self,
        file_ref: &str,
        ctx: Option<&dyn BlobContext>,
    ) -> FileContentResult {
        match self.try_file_content(ctx, file_ref).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Managed blob fetch of '{}' failed: {}", file_ref, e);
                FileContentResult::failed(normalize_error(&e, CONTENT_FALLBACK))
            }
        }
    }
}
