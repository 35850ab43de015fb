use std::fmt;

use thiserror::Error;

/// Failure reported by the remote B2 API (or the HTTP layer beneath it)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFailure {
    /// B2 operation name, e.g. `b2_upload_file`
    pub operation: &'static str,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl RemoteFailure {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Remote message, if it carries any text
    pub fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        match (self.code.as_deref(), self.message()) {
            (Some(code), Some(message)) => write!(f, ": {} - {}", code, message),
            (None, Some(message)) => write!(f, ": {}", message),
            (Some(code), None) => write!(f, ": {}", code),
            (None, None) => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Authorization failed: {0}")]
    Auth(RemoteFailure),

    #[error("Storage provider not configured: {0}")]
    NotConfigured(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Upload failed: {0}")]
    Upload(RemoteFailure),

    #[error("Download authorization failed: {0}")]
    DownloadAuth(RemoteFailure),

    #[error("Fetch failed: {0}")]
    Fetch(RemoteFailure),

    #[error("Unknown storage provider '{requested}'. Available providers: {}", .registered.join(", "))]
    UnknownProvider {
        requested: String,
        registered: Vec<String>,
    },

    #[error("{0} requires an execution context")]
    MissingContext(&'static str),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("Invalid file reference: {0}")]
    InvalidFileRef(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl StorageError {
    /// Whether the error carries a message worth showing to a caller.
    ///
    /// Remote failures without any text (no message and no code) are not
    /// displayable; providers substitute their fixed fallback message.
    pub fn is_displayable(&self) -> bool {
        match self {
            StorageError::Auth(f)
            | StorageError::Upload(f)
            | StorageError::DownloadAuth(f)
            | StorageError::Fetch(f) => f.message().is_some() || f.code.is_some(),
            StorageError::NotConfigured(msg)
            | StorageError::BucketNotFound(msg)
            | StorageError::Blob(msg)
            | StorageError::InvalidFileRef(msg)
            | StorageError::Validation(msg) => !msg.trim().is_empty(),
            StorageError::UnknownProvider { .. } | StorageError::MissingContext(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
