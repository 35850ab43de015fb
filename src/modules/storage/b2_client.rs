//! Backblaze B2 client
//!
//! Wraps the native API with the bookkeeping every call needs:
//! - account authorization, cached for a configurable window
//! - bucket id resolution, cached for the client lifetime
//! - per-upload URL acquisition and SHA-1 integrity headers
//! - download authorization and authenticated fetches
//!
//! No call is retried; callers decide whether to try again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use sha1::{Digest, Sha1};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::config::B2Config;
use crate::core::error::{Result, StorageError};
use crate::modules::storage::b2_transport::{
    B2Transport, DownloadedObject, HttpTransport, UploadRequest, UploadTarget, UploadedFile,
};
use crate::modules::storage::object_name::encode_object_name;

lazy_static! {
    /// Matches `<scheme>://<host>/file/<bucket>/<object name>[?query]`
    static ref FILE_URL_REGEX: Regex =
        Regex::new(r"^https?://[^/]+/file/([^/?]+)/([^?#]+)").unwrap();
}

/// Result of one `b2_authorize_account` exchange
#[derive(Debug, Clone)]
pub struct AuthorizationSession {
    pub account_id: String,
    pub authorization_token: String,
    pub api_url: String,
    pub download_url: String,
    pub issued_at: Instant,
}

impl AuthorizationSession {
    fn is_valid(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() < ttl
    }
}

/// Credentials and tuning for one client
#[derive(Debug, Clone)]
pub struct B2ClientConfig {
    pub key_id: String,
    pub application_key: String,
    pub bucket_name: String,
    pub api_url: String,
    pub auth_session_ttl: Duration,
    pub download_auth_ttl: Duration,
}

impl B2ClientConfig {
    /// Build from application configuration; fails when credentials are missing
    pub fn from_config(config: &B2Config) -> Result<Self> {
        let (key_id, application_key, bucket_name) = config.credentials().ok_or_else(|| {
            StorageError::NotConfigured(format!(
                "Backblaze credentials missing ({})",
                config.missing_variables().join(", ")
            ))
        })?;

        Ok(Self {
            key_id: key_id.to_string(),
            application_key: application_key.to_string(),
            bucket_name: bucket_name.to_string(),
            api_url: config.api_url.clone(),
            auth_session_ttl: config.auth_session_ttl,
            download_auth_ttl: config.download_auth_ttl,
        })
    }
}

/// Authorized download URL for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedDownload {
    pub url: String,
    pub authorization_token: String,
}

/// Backblaze B2 client with authorization and bucket caches.
///
/// Caches hold immutable values; concurrent callers racing past an expired
/// session may both re-authorize, and the last write wins.
pub struct B2Client<T: B2Transport = HttpTransport> {
    config: B2ClientConfig,
    transport: T,
    session: Arc<RwLock<Option<AuthorizationSession>>>,
    bucket_id: Arc<RwLock<Option<String>>>,
}

impl B2Client<HttpTransport> {
    /// Create a client talking to the real B2 API
    pub fn from_config(config: &B2Config) -> Result<Self> {
        let client_config = B2ClientConfig::from_config(config)?;
        Ok(Self::with_transport(client_config, HttpTransport::new()?))
    }
}

impl<T: B2Transport> B2Client<T> {
    pub fn with_transport(config: B2ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            session: Arc::new(RwLock::new(None)),
            bucket_id: Arc::new(RwLock::new(None)),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.config.bucket_name
    }

    #[cfg(test)]
    pub(crate) fn transport_for_tests(&self) -> &T {
        &self.transport
    }

    /// Get a valid authorization session, authorizing only when the cached
    /// one is missing or older than the configured window
    pub async fn authorize(&self) -> Result<AuthorizationSession> {
        {
            let cache = self.session.read().await;
            if let Some(ref session) = *cache {
                if session.is_valid(self.config.auth_session_ttl) {
                    debug!(
                        "Using cached B2 authorization (age {}s)",
                        session.issued_at.elapsed().as_secs()
                    );
                    return Ok(session.clone());
                }
            }
        }

        let response = self
            .transport
            .authorize_account(
                &self.config.api_url,
                &self.config.key_id,
                &self.config.application_key,
            )
            .await
            .map_err(StorageError::Auth)?;

        let session = AuthorizationSession {
            account_id: response.account_id,
            authorization_token: response.authorization_token,
            api_url: response.api_url,
            download_url: response.download_url,
            issued_at: Instant::now(),
        };

        info!(
            "Authorized B2 account {} (api: {}, reuse window: {}s)",
            session.account_id,
            session.api_url,
            self.config.auth_session_ttl.as_secs()
        );

        let mut cache = self.session.write().await;
        *cache = Some(session.clone());

        Ok(session)
    }

    /// Resolve the configured bucket name to its id, once per client
    pub async fn resolve_bucket(&self) -> Result<String> {
        if let Some(ref id) = *self.bucket_id.read().await {
            return Ok(id.clone());
        }

        let session = self.authorize().await?;
        let buckets = self
            .transport
            .list_buckets(&session, &self.config.bucket_name)
            .await
            .map_err(|failure| {
                StorageError::BucketNotFound(format!("{} ({})", self.config.bucket_name, failure))
            })?;

        let bucket = buckets
            .into_iter()
            .find(|b| b.bucket_name == self.config.bucket_name)
            .ok_or_else(|| StorageError::BucketNotFound(self.config.bucket_name.clone()))?;

        debug!(
            "Resolved B2 bucket '{}' to {}",
            bucket.bucket_name, bucket.bucket_id
        );

        let mut cache = self.bucket_id.write().await;
        *cache = Some(bucket.bucket_id.clone());

        Ok(bucket.bucket_id)
    }

    /// Request a fresh upload URL and token; these are single-use and never cached
    pub async fn acquire_upload_target(&self) -> Result<UploadTarget> {
        let bucket_id = self.resolve_bucket().await?;
        let session = self.authorize().await?;

        self.transport
            .get_upload_url(&session, &bucket_id)
            .await
            .map_err(StorageError::Upload)
    }

    /// Upload a payload to an acquired target with its SHA-1 checksum
    pub async fn upload_object(
        &self,
        target: &UploadTarget,
        data: Vec<u8>,
        object_name: &str,
        content_type: &str,
    ) -> Result<UploadedFile> {
        let content_sha1 = hex::encode(Sha1::digest(&data));
        let size = data.len();

        let uploaded = self
            .transport
            .upload_file(
                target,
                UploadRequest {
                    object_name,
                    content_type,
                    content_sha1,
                    data,
                },
            )
            .await
            .map_err(|failure| {
                warn!("B2 upload of '{}' rejected: {}", object_name, failure);
                StorageError::Upload(failure)
            })?;

        info!(
            "Uploaded '{}' to B2 bucket '{}' ({} bytes, id {})",
            object_name, self.config.bucket_name, size, uploaded.file_id
        );

        Ok(uploaded)
    }

    /// Authorize, resolve the bucket, acquire an upload URL and upload
    pub async fn put_object(
        &self,
        data: Vec<u8>,
        object_name: &str,
        content_type: &str,
    ) -> Result<UploadedFile> {
        let target = self.acquire_upload_target().await?;
        self.upload_object(&target, data, object_name, content_type)
            .await
    }

    /// Issue a time-limited authorized URL for objects under `object_name_prefix`
    pub async fn issue_authorized_download_url(
        &self,
        object_name_prefix: &str,
    ) -> Result<AuthorizedDownload> {
        let bucket_id = self.resolve_bucket().await?;
        let session = self.authorize().await?;

        let authorization = self
            .transport
            .get_download_authorization(
                &session,
                &bucket_id,
                object_name_prefix,
                self.config.download_auth_ttl.as_secs(),
            )
            .await
            .map_err(StorageError::DownloadAuth)?;

        let url = format!(
            "{}?Authorization={}",
            Self::file_url(&session, &self.config.bucket_name, object_name_prefix),
            urlencoding::encode(&authorization.authorization_token)
        );

        Ok(AuthorizedDownload {
            url,
            authorization_token: authorization.authorization_token,
        })
    }

    /// Fetch object bytes with the current session's token
    pub async fn fetch_object_bytes(&self, url: &str) -> Result<DownloadedObject> {
        let session = self.authorize().await?;

        self.transport
            .download(url, &session.authorization_token)
            .await
            .map_err(StorageError::Fetch)
    }

    /// Direct (non-presigned) URL of an object in this client's bucket
    pub async fn public_url(&self, object_name: &str) -> Result<String> {
        let session = self.authorize().await?;
        Ok(Self::file_url(
            &session,
            &self.config.bucket_name,
            object_name,
        ))
    }

    fn file_url(session: &AuthorizationSession, bucket_name: &str, object_name: &str) -> String {
        format!(
            "{}/file/{}/{}",
            session.download_url.trim_end_matches('/'),
            bucket_name,
            encode_object_name(object_name)
        )
    }
}

/// Extract the object name from a B2 file URL
/// (`https://f005.backblazeb2.com/file/<bucket>/<object name>`).
///
/// Returns `None` if the URL does not have the `/file/<bucket>/` shape.
pub fn extract_object_name(url: &str) -> Option<String> {
    let captures = FILE_URL_REGEX.captures(url)?;
    let encoded = captures.get(2)?.as_str();
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}
