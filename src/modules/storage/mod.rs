//! Storage module for donation-proof files
//!
//! Provides a provider contract with two implementations, Backblaze B2 and a
//! platform-managed blob store, and a manager that picks one per call.

pub mod b2_client;
pub mod b2_provider;
pub mod b2_transport;
pub mod blob_context;
pub mod managed_blob_provider;
pub mod manager;
pub mod object_name;
pub mod provider;

pub use b2_client::{AuthorizationSession, AuthorizedDownload, B2Client, B2ClientConfig};
pub use b2_provider::B2Provider;
pub use b2_transport::{B2Transport, HttpTransport};
pub use blob_context::{BlobContext, FsBlobContext, InMemoryBlobContext, StoredBlob};
pub use managed_blob_provider::ManagedBlobProvider;
pub use manager::StorageManager;
pub use object_name::build_object_name;
pub use provider::{
    DownloadUrlResult, FileContentResult, StorageProvider, StorageProviderName, UploadResult,
};
