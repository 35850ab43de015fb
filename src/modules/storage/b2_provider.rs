//! Backblaze B2 storage provider
//!
//! Adapts [`B2Client`] to the provider contract. The provider owns a single
//! client, so the authorization and bucket caches live as long as it does.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::config::B2Config;
use crate::core::error::{Result, StorageError};
use crate::modules::storage::b2_client::{extract_object_name, B2Client};
use crate::modules::storage::b2_transport::{B2Transport, HttpTransport};
use crate::modules::storage::blob_context::BlobContext;
use crate::modules::storage::object_name::build_object_name;
use crate::modules::storage::provider::{
    normalize_error, DownloadUrlResult, FileContentResult, StorageProvider, UploadResult,
};
use crate::shared::constants::DEFAULT_CONTENT_TYPE;
use crate::shared::content_type::{guess_content_type, to_data_url};

const UPLOAD_FALLBACK: &str = "Backblaze upload failed";
const DOWNLOAD_URL_FALLBACK: &str = "Backblaze download URL generation failed";
const CONTENT_FALLBACK: &str = "Backblaze file fetch failed";

pub struct B2Provider<T: B2Transport = HttpTransport> {
    /// Client, or the reason it could not be built (e.g. missing credentials)
    client: std::result::Result<B2Client<T>, String>,
}

impl B2Provider<HttpTransport> {
    /// Build from configuration. Missing credentials do not fail here; every
    /// call made through this provider reports them instead.
    pub fn from_config(config: &B2Config) -> Self {
        let client = B2Client::from_config(config).map_err(|e| {
            warn!("Backblaze provider unavailable: {}", e);
            match e {
                StorageError::NotConfigured(reason) => reason,
                other => other.to_string(),
            }
        });
        Self { client }
    }
}

impl<T: B2Transport> B2Provider<T> {
    pub fn with_client(client: B2Client<T>) -> Self {
        Self { client: Ok(client) }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_ok()
    }

    fn client(&self) -> Result<&B2Client<T>> {
        self.client
            .as_ref()
            .map_err(|reason| StorageError::NotConfigured(reason.clone()))
    }

    async fn try_upload(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
        donation_id: &str,
    ) -> Result<UploadResult> {
        let client = self.client()?;
        let object_name = build_object_name(donation_id, file_name);

        let uploaded = client.put_object(data, &object_name, content_type).await?;
        let url = client.public_url(&object_name).await?;

        Ok(UploadResult::uploaded(
            url,
            object_name,
            Some(uploaded.file_id),
        ))
    }

    async fn try_download_url(&self, file_name: &str) -> Result<DownloadUrlResult> {
        let client = self.client()?;
        let object_name = resolve_object_name(file_name)?;

        let download = client.issue_authorized_download_url(&object_name).await?;
        Ok(DownloadUrlResult::issued(
            download.url,
            Some(download.authorization_token),
        ))
    }

    async fn try_file_content(&self, file_ref: &str) -> Result<FileContentResult> {
        let client = self.client()?;
        let object_name = resolve_object_name(file_ref)?;

        let url = client.public_url(&object_name).await?;
        let object = client.fetch_object_bytes(&url).await?;

        let content_type = object
            .content_type
            .filter(|ct| !ct.is_empty() && ct != DEFAULT_CONTENT_TYPE && ct != "b2/x-auto")
            .unwrap_or_else(|| guess_content_type(&object_name).to_string());

        debug!(
            "Fetched '{}' from B2 ({} bytes, {})",
            object_name,
            object.bytes.len(),
            content_type
        );

        let data_url = to_data_url(&content_type, &object.bytes);
        Ok(FileContentResult::fetched(
            object.bytes,
            content_type,
            Some(data_url),
        ))
    }
}

/// Accept either a full B2 file URL or a bare object name
fn resolve_object_name(file_ref: &str) -> Result<String> {
    let file_ref = file_ref.trim();
    if file_ref.is_empty() {
        return Err(StorageError::InvalidFileRef(
            "file reference is empty".to_string(),
        ));
    }

    if file_ref.starts_with("http://") || file_ref.starts_with("https://") {
        return extract_object_name(file_ref).ok_or_else(|| {
            StorageError::InvalidFileRef(format!("not a Backblaze file URL: {}", file_ref))
        });
    }

    Ok(file_ref.to_string())
}

#[async_trait]
impl<T: B2Transport> StorageProvider for B2Provider<T> {
    fn name(&self) -> &str {
        "Backblaze B2"
    }

    async fn upload_file(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
        donation_id: &str,
        _ctx: Option<&dyn BlobContext>,
    ) -> UploadResult {
        match self
            .try_upload(data, file_name, content_type, donation_id)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Backblaze upload for donation {} failed: {}", donation_id, e);
                UploadResult::failed(normalize_error(&e, UPLOAD_FALLBACK))
            }
        }
    }

    async fn get_download_url(
        &self,
        file_name: &str,
        _ctx: Option<&dyn BlobContext>,
    ) -> DownloadUrlResult {
        match self.try_download_url(file_name).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Backblaze download URL for '{}' failed: {}", file_name, e);
                DownloadUrlResult::failed(normalize_error(&e, DOWNLOAD_URL_FALLBACK))
            }
        }
    }

    async fn get_file_content(
        &self,
        file_ref: &str,
        _ctx: Option<&dyn BlobContext>,
    ) -> FileContentResult {
        match self.try_file_content(file_ref).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Backblaze fetch of '{}' failed: {}", file_ref, e);
                FileContentResult::failed(normalize_error(&e, CONTENT_FALLBACK))
            }
        }
    }
}
