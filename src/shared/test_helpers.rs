use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::RemoteFailure;
use crate::modules::storage::b2_client::{AuthorizationSession, B2ClientConfig};
use crate::modules::storage::b2_transport::{
    AuthorizeAccountResponse, B2Transport, BucketInfo, DownloadAuthorization, DownloadedObject,
    UploadRequest, UploadTarget, UploadedFile,
};

/// Every variable read by `Config::from_env`
const CONFIG_VARS: &[&str] = &[
    "STORAGE_PROVIDER",
    "STORAGE_MAX_FILE_SIZE",
    "STORAGE_BLOB_DIR",
    "B2_KEY_ID",
    "B2_APPLICATION_KEY",
    "B2_BUCKET_NAME",
    "B2_API_URL",
    "B2_AUTH_SESSION_TTL_SECS",
    "B2_DOWNLOAD_AUTH_TTL_SECS",
];

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Take exclusive access to the process environment, clear every config
/// variable and set `vars`. Hold the guard for the whole test.
pub fn lock_env(vars: &[(&str, &str)]) -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for name in CONFIG_VARS {
        env::remove_var(name);
    }
    for (name, value) in vars {
        env::set_var(name, value);
    }
    guard
}

pub const TEST_BUCKET: &str = "donasi-bukti";
pub const TEST_DOWNLOAD_URL: &str = "https://f000.example.test";

pub fn test_client_config() -> B2ClientConfig {
    B2ClientConfig {
        key_id: "test-key-id".to_string(),
        application_key: "test-application-key".to_string(),
        bucket_name: TEST_BUCKET.to_string(),
        api_url: "https://api.example.test".to_string(),
        auth_session_ttl: Duration::from_secs(3600),
        download_auth_ttl: Duration::from_secs(3600),
    }
}

/// How the mock answers `b2_upload_file`
#[derive(Debug, Clone)]
pub enum UploadBehavior {
    Accept,
    Reject(String),
    /// Fails with neither a message nor a code
    RejectSilently,
}

/// In-process stand-in for the B2 API that counts calls
pub struct MockB2Transport {
    authorize_calls: AtomicUsize,
    list_bucket_calls: AtomicUsize,
    upload_url_calls: AtomicUsize,
    reject_authorization: bool,
    upload_behavior: UploadBehavior,
    fail_downloads: bool,
    object: DownloadedObject,
    last_sha1: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl MockB2Transport {
    pub fn new() -> Self {
        Self {
            authorize_calls: AtomicUsize::new(0),
            list_bucket_calls: AtomicUsize::new(0),
            upload_url_calls: AtomicUsize::new(0),
            reject_authorization: false,
            upload_behavior: UploadBehavior::Accept,
            fail_downloads: false,
            object: DownloadedObject {
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
                content_type: Some("image/jpeg".to_string()),
            },
            last_sha1: Mutex::new(None),
        }
    }

    pub fn rejecting_authorization(mut self) -> Self {
        self.reject_authorization = true;
        self
    }

    pub fn with_upload_behavior(mut self, behavior: UploadBehavior) -> Self {
        self.upload_behavior = behavior;
        self
    }

    pub fn failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    pub fn serving(mut self, bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        self.object = DownloadedObject {
            bytes,
            content_type: content_type.map(|s| s.to_string()),
        };
        self
    }

    pub fn authorize_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    pub fn list_bucket_calls(&self) -> usize {
        self.list_bucket_calls.load(Ordering::SeqCst)
    }

    pub fn upload_url_calls(&self) -> usize {
        self.upload_url_calls.load(Ordering::SeqCst)
    }

    pub fn last_sha1(&self) -> Option<String> {
        self.last_sha1.lock().unwrap().clone()
    }
}

#[async_trait]
impl B2Transport for MockB2Transport {
    async fn authorize_account(
        &self,
        _api_url: &str,
        _key_id: &str,
        _application_key: &str,
    ) -> Result<AuthorizeAccountResponse, RemoteFailure> {
        let call = self.authorize_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.reject_authorization {
            return Err(RemoteFailure::new("b2_authorize_account")
                .with_status(401)
                .with_code("bad_auth_token")
                .with_message("Invalid authorization token"));
        }

        Ok(AuthorizeAccountResponse {
            account_id: "test-account".to_string(),
            authorization_token: format!("account-token-{}", call),
            api_url: "https://api000.example.test".to_string(),
            download_url: TEST_DOWNLOAD_URL.to_string(),
        })
    }

    async fn list_buckets(
        &self,
        _session: &AuthorizationSession,
        _bucket_name: &str,
    ) -> Result<Vec<BucketInfo>, RemoteFailure> {
        self.list_bucket_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![BucketInfo {
            bucket_id: "bucket-id-1".to_string(),
            bucket_name: TEST_BUCKET.to_string(),
            bucket_type: Some("allPrivate".to_string()),
        }])
    }

    async fn get_upload_url(
        &self,
        _session: &AuthorizationSession,
        bucket_id: &str,
    ) -> Result<UploadTarget, RemoteFailure> {
        let call = self.upload_url_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadTarget {
            bucket_id: bucket_id.to_string(),
            upload_url: format!("https://pod-000.example.test/upload/{}", call),
            authorization_token: format!("upload-token-{}", call),
        })
    }

    async fn upload_file(
        &self,
        _target: &UploadTarget,
        request: UploadRequest<'_>,
    ) -> Result<UploadedFile, RemoteFailure> {
        *self.last_sha1.lock().unwrap() = Some(request.content_sha1.clone());

        match &self.upload_behavior {
            UploadBehavior::Accept => Ok(UploadedFile {
                file_id: format!("4_z{}", request.content_sha1),
                file_name: request.object_name.to_string(),
                content_length: request.data.len() as u64,
                content_sha1: Some(request.content_sha1),
                content_type: Some(request.content_type.to_string()),
            }),
            UploadBehavior::Reject(message) => Err(RemoteFailure::new("b2_upload_file")
                .with_status(400)
                .with_code("bad_request")
                .with_message(message.clone())),
            UploadBehavior::RejectSilently => Err(RemoteFailure::new("b2_upload_file")),
        }
    }

    async fn get_download_authorization(
        &self,
        _session: &AuthorizationSession,
        bucket_id: &str,
        file_name_prefix: &str,
        _valid_duration_secs: u64,
    ) -> Result<DownloadAuthorization, RemoteFailure> {
        Ok(DownloadAuthorization {
            bucket_id: bucket_id.to_string(),
            file_name_prefix: file_name_prefix.to_string(),
            authorization_token: "download-token".to_string(),
        })
    }

    async fn download(&self, _url: &str, _token: &str) -> Result<DownloadedObject, RemoteFailure> {
        if self.fail_downloads {
            return Err(RemoteFailure::new("b2_download_file_by_name")
                .with_status(404)
                .with_code("not_found")
                .with_message("File not present"));
        }
        Ok(self.object.clone())
    }
}
