//! Storage core for donation-proof uploads.
//!
//! Uploads transfer receipts to Backblaze B2 or to a platform-managed blob
//! store behind one provider contract, selected at runtime by configuration.

pub mod core;
pub mod modules;
pub mod shared;

pub use crate::core::config::Config;
pub use crate::core::error::{RemoteFailure, Result, StorageError};
pub use crate::modules::storage::{
    BlobContext, DownloadUrlResult, FileContentResult, StorageManager, StorageProvider,
    StorageProviderName, UploadResult,
};
