//! Storage manager
//!
//! Registry of the storage providers, keyed by [`StorageProviderName`], with
//! a default chosen from configuration. Callers reach it through
//! [`StorageManager::instance`], which builds one process-wide manager on
//! first use; [`StorageManager::reset_instance`] discards it so the next
//! access re-reads configuration.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::core::config::{Config, StorageConfig};
use crate::core::error::{Result, StorageError};
use crate::modules::storage::b2_provider::B2Provider;
use crate::modules::storage::blob_context::BlobContext;
use crate::modules::storage::managed_blob_provider::ManagedBlobProvider;
use crate::modules::storage::provider::{
    DownloadUrlResult, FileContentResult, StorageProvider, StorageProviderName, UploadResult,
};
use crate::shared::content_type::is_mime_type_allowed;

/// Provider used when configuration names none (or an unknown one).
/// It needs no external credentials.
pub const FALLBACK_PROVIDER: StorageProviderName = StorageProviderName::ManagedBlob;

static INSTANCE: RwLock<Option<Arc<StorageManager>>> = RwLock::new(None);

pub struct StorageManager {
    providers: BTreeMap<StorageProviderName, Arc<dyn StorageProvider>>,
    default_provider: StorageProviderName,
    max_file_size: usize,
    warnings: Vec<String>,
}

impl StorageManager {
    /// Build a manager with the B2 and managed-blob providers from configuration
    pub fn new(config: &Config) -> Self {
        let providers: Vec<(StorageProviderName, Arc<dyn StorageProvider>)> = vec![
            (
                StorageProviderName::ObjectStorage,
                Arc::new(B2Provider::from_config(&config.b2)) as Arc<dyn StorageProvider>,
            ),
            (
                StorageProviderName::ManagedBlob,
                Arc::new(ManagedBlobProvider::new()) as Arc<dyn StorageProvider>,
            ),
        ];

        let mut manager = Self::with_providers(providers, &config.storage);
        // Configuration warnings come first, they explain any fallback below
        manager
            .warnings
            .splice(0..0, config.warnings.iter().cloned());
        manager
    }

    /// Build a manager over an explicit provider set
    pub fn with_providers(
        providers: impl IntoIterator<Item = (StorageProviderName, Arc<dyn StorageProvider>)>,
        config: &StorageConfig,
    ) -> Self {
        let providers: BTreeMap<_, _> = providers.into_iter().collect();
        let mut warnings = Vec::new();

        let default_provider = match config.preferred_provider.as_deref() {
            None => {
                debug!(
                    "No preferred storage provider configured, using {}",
                    FALLBACK_PROVIDER
                );
                FALLBACK_PROVIDER
            }
            Some(preferred) => match preferred.parse::<StorageProviderName>() {
                Ok(name) if providers.contains_key(&name) => name,
                _ => {
                    let warning = format!(
                        "Preferred storage provider '{}' is not registered, falling back to {}",
                        preferred, FALLBACK_PROVIDER
                    );
                    warn!("{}", warning);
                    warnings.push(warning);
                    FALLBACK_PROVIDER
                }
            },
        };

        let manager = Self {
            providers,
            default_provider,
            max_file_size: config.max_file_size,
            warnings,
        };

        info!(
            "Storage manager initialized: default={}, registered=[{}]",
            manager.default_provider,
            manager.registered_providers().join(", ")
        );

        manager
    }

    /// The process-wide manager, built from the environment on first access
    pub fn instance() -> Arc<StorageManager> {
        if let Some(manager) = INSTANCE
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return Arc::clone(manager);
        }

        let mut slot = INSTANCE
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Another caller may have built it while we waited for the write lock
        if let Some(manager) = slot.as_ref() {
            return Arc::clone(manager);
        }

        let config = Config::from_env();
        let manager = Arc::new(StorageManager::new(&config));
        *slot = Some(Arc::clone(&manager));
        manager
    }

    /// Discard the process-wide manager; the next [`instance`](Self::instance)
    /// call rebuilds it from current configuration
    pub fn reset_instance() {
        let mut slot = INSTANCE
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.take().is_some() {
            info!("Storage manager instance reset");
        }
    }

    pub fn default_provider(&self) -> StorageProviderName {
        self.default_provider
    }

    /// Registered provider names, in registry order
    pub fn registered_providers(&self) -> Vec<&'static str> {
        self.providers.keys().map(|name| name.as_str()).collect()
    }

    /// Warnings recorded while resolving configuration
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Resolve a provider by name, or the default when `name` is `None`
    pub fn get_provider(&self, name: Option<&str>) -> Result<Arc<dyn StorageProvider>> {
        let key = match name {
            None => self.default_provider,
            Some(requested) => requested
                .parse::<StorageProviderName>()
                .ok()
                .filter(|key| self.providers.contains_key(key))
                .ok_or_else(|| self.unknown_provider(requested))?,
        };

        self.providers
            .get(&key)
            .cloned()
            .ok_or_else(|| self.unknown_provider(key.as_str()))
    }

    fn unknown_provider(&self, requested: &str) -> StorageError {
        StorageError::UnknownProvider {
            requested: requested.to_string(),
            registered: self
                .registered_providers()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Upload a donation proof through the chosen (or default) provider.
    ///
    /// Returns `Err` only for an unknown provider name; every storage
    /// failure is reported in the result.
    pub async fn upload_file(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
        donation_id: &str,
        provider: Option<&str>,
        ctx: Option<&dyn BlobContext>,
    ) -> Result<UploadResult> {
        let provider = self.get_provider(provider)?;

        if let Err(e) = self.validate_upload(&data, file_name) {
            warn!("Rejected upload for donation {}: {}", donation_id, e);
            return Ok(UploadResult::failed(e.to_string()));
        }

        if !is_mime_type_allowed(content_type) {
            debug!(
                "Uploading '{}' with uncommon content type {}",
                file_name, content_type
            );
        }

        debug!(
            "Uploading '{}' for donation {} via {}",
            file_name,
            donation_id,
            provider.name()
        );

        Ok(provider
            .upload_file(data, file_name, content_type, donation_id, ctx)
            .await)
    }

    pub async fn get_download_url(
        &self,
        file_name: &str,
        provider: Option<&str>,
        ctx: Option<&dyn BlobContext>,
    ) -> Result<DownloadUrlResult> {
        let provider = self.get_provider(provider)?;
        Ok(provider.get_download_url(file_name, ctx).await)
    }

    pub async fn get_file_content(
        &self,
        file_ref: &str,
        provider: Option<&str>,
        ctx: Option<&dyn BlobContext>,
    ) -> Result<FileContentResult> {
        let provider = self.get_provider(provider)?;
        Ok(provider.get_file_content(file_ref, ctx).await)
    }

    fn validate_upload(&self, data: &[u8], file_name: &str) -> Result<()> {
        if file_name.trim().is_empty() {
            return Err(StorageError::Validation("file name is required".to_string()));
        }
        if data.is_empty() {
            return Err(StorageError::Validation("file is empty".to_string()));
        }
        if data.len() > self.max_file_size {
            return Err(StorageError::Validation(format!(
                "file is {} bytes, the limit is {} bytes",
                data.len(),
                self.max_file_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::storage::b2_client::B2Client;
    use crate::modules::storage::blob_context::InMemoryBlobContext;
    use crate::shared::test_helpers::{lock_env, test_client_config, MockB2Transport};
    use regex::Regex;

    fn storage_config(preferred: Option<&str>) -> StorageConfig {
        StorageConfig {
            preferred_provider: preferred.map(String::from),
            ..Default::default()
        }
    }

    fn manager(preferred: Option<&str>) -> StorageManager {
        let config = Config {
            storage: storage_config(preferred),
            ..Default::default()
        };
        StorageManager::new(&config)
    }

    fn mocked_manager(preferred: Option<&str>) -> StorageManager {
        let b2: Arc<dyn StorageProvider> = Arc::new(B2Provider::with_client(
            B2Client::with_transport(test_client_config(), MockB2Transport::new()),
        ));
        StorageManager::with_providers(
            vec![
                (StorageProviderName::ObjectStorage, b2),
                (
                    StorageProviderName::ManagedBlob,
                    Arc::new(ManagedBlobProvider::new()) as Arc<dyn StorageProvider>,
                ),
            ],
            &storage_config(preferred),
        )
    }

    #[test]
    fn test_default_without_preference_is_managed_blob() {
        let manager = manager(None);
        assert_eq!(manager.default_provider(), StorageProviderName::ManagedBlob);
        assert!(manager.warnings().is_empty());
    }

    #[test]
    fn test_unregistered_preference_falls_back_with_warning() {
        let manager = manager(Some("google-drive"));
        assert_eq!(manager.default_provider(), StorageProviderName::ManagedBlob);
        assert_eq!(manager.warnings().len(), 1);
        assert!(manager.warnings()[0].contains("google-drive"));
    }

    #[test]
    fn test_registered_preference_becomes_default() {
        let manager = manager(Some("object-storage"));
        assert_eq!(
            manager.default_provider(),
            StorageProviderName::ObjectStorage
        );
        assert!(manager.warnings().is_empty());
        assert_eq!(manager.get_provider(None).unwrap().name(), "Backblaze B2");
    }

    #[test]
    fn test_preference_for_provider_missing_from_registry() {
        let blob_only: Vec<(StorageProviderName, Arc<dyn StorageProvider>)> = vec![(
            StorageProviderName::ManagedBlob,
            Arc::new(ManagedBlobProvider::new()) as Arc<dyn StorageProvider>,
        )];
        let manager =
            StorageManager::with_providers(blob_only, &storage_config(Some("object-storage")));

        assert_eq!(manager.default_provider(), StorageProviderName::ManagedBlob);
        assert_eq!(manager.warnings().len(), 1);
        assert_eq!(manager.registered_providers(), vec!["managed-blob"]);
    }

    #[test]
    fn test_unknown_provider_lists_registered_names() {
        let manager = manager(None);

        for requested in ["unregistered", "s3", ""] {
            let err = match manager.get_provider(Some(requested)) {
                Err(e) => e,
                Ok(_) => panic!("'{}' should not resolve", requested),
            };
            match &err {
                StorageError::UnknownProvider { registered, .. } => {
                    assert_eq!(registered, &vec!["object-storage", "managed-blob"]);
                }
                other => panic!("unexpected error: {}", other),
            }
            assert!(err
                .to_string()
                .ends_with("Available providers: object-storage, managed-blob"));
        }
    }

    #[tokio::test]
    async fn test_end_to_end_upload_via_default_managed_blob() {
        let manager = manager(Some("managed-blob"));
        let ctx = InMemoryBlobContext::new();

        let result = manager
            .upload_file(
                vec![0xAB; 1024],
                "test.jpg",
                "image/jpeg",
                "test-donation-123",
                None,
                Some(&ctx),
            )
            .await
            .unwrap();

        assert!(result.success);
        let handle = result.url.unwrap();
        assert!(ctx.get(&handle).await.unwrap().is_some());
        assert!(Regex::new(r"^bukti-transfer/test-donation-123/\d+-test\.jpg$")
            .unwrap()
            .is_match(&result.object_name.unwrap()));
    }

    #[tokio::test]
    async fn test_explicit_provider_dispatch() {
        let manager = mocked_manager(None);

        let result = manager
            .upload_file(
                vec![1; 64],
                "bukti.png",
                "image/png",
                "d-7",
                Some("object-storage"),
                None,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert!(result
            .url
            .unwrap()
            .starts_with("https://f000.example.test/file/donasi-bukti/bukti-transfer/d-7/"));

        let content = manager
            .get_file_content(&result.object_name.unwrap(), Some("object-storage"), None)
            .await
            .unwrap();
        assert!(content.success);
    }

    #[tokio::test]
    async fn test_context_passed_through_unchanged() {
        let manager = mocked_manager(None);
        let ctx = InMemoryBlobContext::new();

        let upload = manager
            .upload_file(vec![9; 10], "a.pdf", "application/pdf", "d", None, Some(&ctx))
            .await
            .unwrap();
        let handle = upload.url.unwrap();

        let url = manager
            .get_download_url(&handle, None, Some(&ctx))
            .await
            .unwrap();
        assert_eq!(url.url, Some(format!("memory://{}", handle)));

        let content = manager
            .get_file_content(&handle, Some("managed-blob"), Some(&ctx))
            .await
            .unwrap();
        assert_eq!(content.size, Some(10));
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let manager = manager(None);
        let ctx = InMemoryBlobContext::new();

        let empty = manager
            .upload_file(vec![], "a.jpg", "image/jpeg", "d", None, Some(&ctx))
            .await
            .unwrap();
        assert_eq!(
            empty,
            UploadResult::failed("Validation error: file is empty")
        );

        let too_large = manager
            .upload_file(
                vec![0; 10 * 1024 * 1024 + 1],
                "a.jpg",
                "image/jpeg",
                "d",
                None,
                Some(&ctx),
            )
            .await
            .unwrap();
        assert!(!too_large.success);
        assert!(ctx.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_raised_from_operations() {
        let manager = manager(None);
        let result = manager
            .get_download_url("x", Some("ftp"), None)
            .await;
        assert!(matches!(result, Err(StorageError::UnknownProvider { .. })));
    }

    #[test]
    fn test_config_warnings_are_recorded() {
        let config = Config {
            storage: storage_config(Some("object-storage")),
            warnings: vec!["B2_AUTH_SESSION_TTL_SECS must be a valid number".to_string()],
            ..Default::default()
        };
        let manager = StorageManager::new(&config);

        assert_eq!(
            manager.default_provider(),
            StorageProviderName::ObjectStorage
        );
        assert_eq!(manager.warnings(), &config.warnings[..]);
    }

    #[test]
    fn test_singleton_lifecycle() {
        let _env = lock_env(&[]);
        StorageManager::reset_instance();

        let barrier = Arc::new(std::sync::Barrier::new(100));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    StorageManager::instance()
                })
            })
            .collect();
        let managers: Vec<Arc<StorageManager>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let first = &managers[0];
        assert!(managers.iter().all(|m| Arc::ptr_eq(m, first)));

        StorageManager::reset_instance();
        let rebuilt = StorageManager::instance();
        assert!(!Arc::ptr_eq(first, &rebuilt));
        assert!(Arc::ptr_eq(&rebuilt, &StorageManager::instance()));
        StorageManager::reset_instance();
    }

    #[test]
    fn test_reset_rereads_configuration() {
        let _env = lock_env(&[("STORAGE_PROVIDER", "managed-blob")]);
        StorageManager::reset_instance();
        assert_eq!(
            StorageManager::instance().default_provider(),
            StorageProviderName::ManagedBlob
        );

        std::env::set_var("STORAGE_PROVIDER", "object-storage");
        // Still the cached instance
        assert_eq!(
            StorageManager::instance().default_provider(),
            StorageProviderName::ManagedBlob
        );

        StorageManager::reset_instance();
        let rebuilt = StorageManager::instance();
        assert_eq!(
            rebuilt.default_provider(),
            StorageProviderName::ObjectStorage
        );
        assert!(rebuilt.warnings().is_empty());
        StorageManager::reset_instance();
    }

    #[test]
    fn test_malformed_variable_keeps_configured_provider() {
        let _env = lock_env(&[
            ("STORAGE_PROVIDER", "object-storage"),
            ("B2_KEY_ID", "key-id"),
            ("B2_APPLICATION_KEY", "app-key"),
            ("B2_BUCKET_NAME", "donasi-bukti"),
            ("B2_AUTH_SESSION_TTL_SECS", "23h"),
        ]);
        StorageManager::reset_instance();

        let manager = StorageManager::instance();
        assert_eq!(
            manager.default_provider(),
            StorageProviderName::ObjectStorage
        );
        assert_eq!(manager.warnings().len(), 1);
        assert!(manager.warnings()[0].contains("B2_AUTH_SESSION_TTL_SECS"));
        StorageManager::reset_instance();
    }
}
