//! HTTP transport for the Backblaze B2 native API (v2).
//!
//! One method per remote call. The transport is stateless: tokens and URLs
//! are passed in by [`B2Client`](super::b2_client::B2Client), which owns the
//! authorization and bucket caches.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::core::error::{RemoteFailure, StorageError};
use crate::modules::storage::b2_client::AuthorizationSession;
use crate::modules::storage::object_name::encode_object_name;

pub const OP_AUTHORIZE_ACCOUNT: &str = "b2_authorize_account";
pub const OP_LIST_BUCKETS: &str = "b2_list_buckets";
pub const OP_GET_UPLOAD_URL: &str = "b2_get_upload_url";
pub const OP_UPLOAD_FILE: &str = "b2_upload_file";
pub const OP_GET_DOWNLOAD_AUTHORIZATION: &str = "b2_get_download_authorization";
pub const OP_DOWNLOAD_FILE: &str = "b2_download_file_by_name";

/// Response of `b2_authorize_account`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeAccountResponse {
    pub account_id: String,
    pub authorization_token: String,
    pub api_url: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub bucket_id: String,
    pub bucket_name: String,
    #[serde(default)]
    pub bucket_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

/// Short-lived upload URL and token from `b2_get_upload_url`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub bucket_id: String,
    pub upload_url: String,
    pub authorization_token: String,
}

/// Payload of a single-request upload
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    /// Raw object name; encoded by the transport
    pub object_name: &'a str,
    pub content_type: &'a str,
    /// Hex SHA-1 of `data`
    pub content_sha1: String,
    pub data: Vec<u8>,
}

/// Response of `b2_upload_file`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    pub file_name: String,
    pub content_length: u64,
    #[serde(default)]
    pub content_sha1: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Response of `b2_get_download_authorization`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAuthorization {
    pub bucket_id: String,
    pub file_name_prefix: String,
    pub authorization_token: String,
}

/// Body and content type of a downloaded object
#[derive(Debug, Clone)]
pub struct DownloadedObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Error body returned by the B2 API
#[derive(Debug, Deserialize)]
struct B2ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Remote calls made by the B2 client
#[async_trait]
pub trait B2Transport: Send + Sync {
    async fn authorize_account(
        &self,
        api_url: &str,
        key_id: &str,
        application_key: &str,
    ) -> Result<AuthorizeAccountResponse, RemoteFailure>;

    async fn list_buckets(
        &self,
        session: &AuthorizationSession,
        bucket_name: &str,
    ) -> Result<Vec<BucketInfo>, RemoteFailure>;

    async fn get_upload_url(
        &self,
        session: &AuthorizationSession,
        bucket_id: &str,
    ) -> Result<UploadTarget, RemoteFailure>;

    async fn upload_file(
        &self,
        target: &UploadTarget,
        request: UploadRequest<'_>,
    ) -> Result<UploadedFile, RemoteFailure>;

    async fn get_download_authorization(
        &self,
        session: &AuthorizationSession,
        bucket_id: &str,
        file_name_prefix: &str,
        valid_duration_secs: u64,
    ) -> Result<DownloadAuthorization, RemoteFailure>;

    async fn download(&self, url: &str, token: &str) -> Result<DownloadedObject, RemoteFailure>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent("donation-storage/0.1 (b2-native-api)")
            .build()
            .map_err(|e| {
                StorageError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn api_endpoint(api_url: &str, operation: &str) -> String {
        format!("{}/b2api/v2/{}", api_url.trim_end_matches('/'), operation)
    }

    /// Send a request and decode a JSON body, mapping non-2xx responses to
    /// a [`RemoteFailure`] carrying the B2 error code and message.
    async fn send_json<T: DeserializeOwned>(
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, RemoteFailure> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteFailure::new(operation).with_message(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::remote_failure(operation, response).await);
        }

        response.json::<T>().await.map_err(|e| {
            RemoteFailure::new(operation)
                .with_message(format!("Failed to parse response: {}", e))
        })
    }

    async fn remote_failure(operation: &'static str, response: Response) -> RemoteFailure {
        let failure = RemoteFailure::new(operation).with_status(response.status().as_u16());
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<B2ErrorBody>(&body) {
            Ok(parsed) => RemoteFailure {
                code: parsed.code,
                message: parsed.message,
                ..failure
            },
            Err(_) if !body.trim().is_empty() => failure.with_message(body),
            Err(_) => failure,
        }
    }
}

#[async_trait]
impl B2Transport for HttpTransport {
    async fn authorize_account(
        &self,
        api_url: &str,
        key_id: &str,
        application_key: &str,
    ) -> Result<AuthorizeAccountResponse, RemoteFailure> {
        let url = Self::api_endpoint(api_url, OP_AUTHORIZE_ACCOUNT);
        let credentials = STANDARD.encode(format!("{}:{}", key_id, application_key));
        debug!("Authorizing B2 account at {}", url);

        let request = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials));

        Self::send_json(OP_AUTHORIZE_ACCOUNT, request).await
    }

    async fn list_buckets(
        &self,
        session: &AuthorizationSession,
        bucket_name: &str,
    ) -> Result<Vec<BucketInfo>, RemoteFailure> {
        let request = self
            .client
            .post(Self::api_endpoint(&session.api_url, OP_LIST_BUCKETS))
            .header(header::AUTHORIZATION, &session.authorization_token)
            .json(&json!({
                "accountId": session.account_id,
                "bucketName": bucket_name,
            }));

        let response: ListBucketsResponse = Self::send_json(OP_LIST_BUCKETS, request).await?;
        Ok(response.buckets)
    }

    async fn get_upload_url(
        &self,
        session: &AuthorizationSession,
        bucket_id: &str,
    ) -> Result<UploadTarget, RemoteFailure> {
        let request = self
            .client
            .post(Self::api_endpoint(&session.api_url, OP_GET_UPLOAD_URL))
            .header(header::AUTHORIZATION, &session.authorization_token)
            .json(&json!({ "bucketId": bucket_id }));

        Self::send_json(OP_GET_UPLOAD_URL, request).await
    }

    async fn upload_file(
        &self,
        target: &UploadTarget,
        request: UploadRequest<'_>,
    ) -> Result<UploadedFile, RemoteFailure> {
        let content_length = request.data.len();
        let request = self
            .client
            .post(&target.upload_url)
            .header(header::AUTHORIZATION, &target.authorization_token)
            .header("X-Bz-File-Name", encode_object_name(request.object_name))
            .header(header::CONTENT_TYPE, request.content_type)
            .header(header::CONTENT_LENGTH, content_length)
            .header("X-Bz-Content-Sha1", &request.content_sha1)
            .body(request.data);

        Self::send_json(OP_UPLOAD_FILE, request).await
    }

    async fn get_download_authorization(
        &self,
        session: &AuthorizationSession,
        bucket_id: &str,
        file_name_prefix: &str,
        valid_duration_secs: u64,
    ) -> Result<DownloadAuthorization, RemoteFailure> {
        let request = self
            .client
            .post(Self::api_endpoint(
                &session.api_url,
                OP_GET_DOWNLOAD_AUTHORIZATION,
            ))
            .header(header::AUTHORIZATION, &session.authorization_token)
            .json(&json!({
                "bucketId": bucket_id,
                "fileNamePrefix": file_name_prefix,
                "validDurationInSeconds": valid_duration_secs,
            }));

        Self::send_json(OP_GET_DOWNLOAD_AUTHORIZATION, request).await
    }

    async fn download(&self, url: &str, token: &str) -> Result<DownloadedObject, RemoteFailure> {
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, token)
            .send()
            .await
            .map_err(|e| RemoteFailure::new(OP_DOWNLOAD_FILE).with_message(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::remote_failure(OP_DOWNLOAD_FILE, response).await);
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response.bytes().await.map_err(|e| {
            RemoteFailure::new(OP_DOWNLOAD_FILE)
                .with_message(format!("Failed to read response body: {}", e))
        })?;

        Ok(DownloadedObject {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
