//! Provider contract shared by every storage backend.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::StorageError;
use crate::modules::storage::blob_context::BlobContext;

/// Registered storage providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageProviderName {
    /// Backblaze B2 object storage
    ObjectStorage,
    /// Blob store supplied by the hosting platform
    ManagedBlob,
}

impl StorageProviderName {
    pub const ALL: [StorageProviderName; 2] = [
        StorageProviderName::ObjectStorage,
        StorageProviderName::ManagedBlob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageProviderName::ObjectStorage => "object-storage",
            StorageProviderName::ManagedBlob => "managed-blob",
        }
    }
}

impl fmt::Display for StorageProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        StorageProviderName::ALL
            .into_iter()
            .find(|name| name.as_str() == normalized)
            .ok_or_else(|| s.trim().to_string())
    }
}

/// Outcome of an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    /// Fetchable URL (object storage) or opaque storage handle (managed blob)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn uploaded(url: String, object_name: String, object_id: Option<String>) -> Self {
        Self {
            success: true,
            url: Some(url),
            object_name: Some(object_name),
            object_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Outcome of a download-URL request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Set when the URL is not directly fetchable and must be resolved by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadUrlResult {
    pub fn issued(url: String, auth_token: Option<String>) -> Self {
        Self {
            success: true,
            url: Some(url),
            auth_token,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Outcome of a content fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileContentResult {
    pub fn fetched(content: Vec<u8>, content_type: String, url: Option<String>) -> Self {
        Self {
            success: true,
            url,
            size: Some(content.len() as u64),
            content: Some(content),
            content_type: Some(content_type),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Map any error to display-ready text, substituting `fallback` when the
/// error carries nothing a caller could show.
pub fn normalize_error(err: &StorageError, fallback: &str) -> String {
    if err.is_displayable() {
        err.to_string()
    } else {
        fallback.to_string()
    }
}

/// Contract implemented by every storage backend.
///
/// Operations never fail at the Rust level: every failure is reported as a
/// result with `success == false` and a display-ready `error`.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Human-readable name of this provider (e.g., "Backblaze B2")
    fn name(&self) -> &str;

    async fn upload_file(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
        donation_id: &str,
        ctx: Option<&dyn BlobContext>,
    ) -> UploadResult;

    async fn get_download_url(
        &self,
        file_name: &str,
        ctx: Option<&dyn BlobContext>,
    ) -> DownloadUrlResult;

    async fn get_file_content(
        &self,
        file_ref: &str,
        ctx: Option<&dyn BlobContext>,
    ) -> FileContentResult;
}
