use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub storage: StorageConfig,
    pub b2: B2Config,
    /// Variables that were set but malformed and fell back to their defaults
    pub warnings: Vec<String>,
}

/// Provider selection and upload limits
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Preferred provider name as configured (validated by the storage manager)
    pub preferred_provider: Option<String>,
    /// Maximum accepted upload size in bytes
    pub max_file_size: usize,
    /// Directory backing the managed blob store of the CLI
    pub managed_blob_dir: PathBuf,
}

/// Backblaze B2 configuration
///
/// Credentials are optional: a process without them still starts, and only
/// operations routed to the B2 provider fail.
#[derive(Debug, Clone)]
pub struct B2Config {
    /// Application key id
    pub key_id: Option<String>,
    /// Application key
    pub application_key: Option<String>,
    /// Bucket that receives donation proofs
    pub bucket_name: Option<String>,
    /// Base URL of the account authorization endpoint
    pub api_url: String,
    /// How long an authorization session is reused before re-authorizing
    pub auth_session_ttl: Duration,
    /// Validity of download authorization tokens
    pub download_auth_ttl: Duration,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// Never fails: a malformed value only resets its own variable to the
    /// default and is reported in `warnings`.
    pub fn from_env() -> Self {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let mut warnings = Vec::new();
        let storage = StorageConfig::from_env(&mut warnings);
        let b2 = B2Config::from_env(&mut warnings);

        Config {
            storage,
            b2,
            warnings,
        }
    }
}

/// Non-empty, trimmed value of a variable
fn env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a numeric variable; a malformed value falls back to `default`
/// with a warning
fn env_number_or<T>(name: &str, default: T, warnings: &mut Vec<String>) -> T
where
    T: FromStr + Display,
{
    let Some(raw) = env_non_empty(name) else {
        return default;
    };

    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            let warning = format!(
                "{} must be a valid number (got '{}'), using default {}",
                name, raw, default
            );
            warn!("{}", warning);
            warnings.push(warning);
            default
        }
    }
}

impl StorageConfig {
    const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10MB
    const DEFAULT_MANAGED_BLOB_DIR: &'static str = "data/blobs";

    pub fn from_env(warnings: &mut Vec<String>) -> Self {
        Self {
            preferred_provider: env_non_empty("STORAGE_PROVIDER"),
            max_file_size: env_number_or(
                "STORAGE_MAX_FILE_SIZE",
                Self::DEFAULT_MAX_FILE_SIZE,
                warnings,
            ),
            managed_blob_dir: env_non_empty("STORAGE_BLOB_DIR")
                .unwrap_or_else(|| Self::DEFAULT_MANAGED_BLOB_DIR.to_string())
                .into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            preferred_provider: None,
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            managed_blob_dir: Self::DEFAULT_MANAGED_BLOB_DIR.into(),
        }
    }
}

impl B2Config {
    const DEFAULT_API_URL: &'static str = "https://api.backblazeb2.com";
    // B2 account tokens are valid for 24 hours; re-authorize an hour early
    const DEFAULT_AUTH_SESSION_TTL_SECS: u64 = 23 * 60 * 60;
    const DEFAULT_DOWNLOAD_AUTH_TTL_SECS: u64 = 3600; // 1 hour

    pub fn from_env(warnings: &mut Vec<String>) -> Self {
        let api_url = env_non_empty("B2_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| Self::DEFAULT_API_URL.to_string());

        let auth_session_ttl_secs = env_number_or(
            "B2_AUTH_SESSION_TTL_SECS",
            Self::DEFAULT_AUTH_SESSION_TTL_SECS,
            warnings,
        );
        let download_auth_ttl_secs = env_number_or(
            "B2_DOWNLOAD_AUTH_TTL_SECS",
            Self::DEFAULT_DOWNLOAD_AUTH_TTL_SECS,
            warnings,
        );

        Self {
            // Only use credentials if they are non-empty
            key_id: env_non_empty("B2_KEY_ID"),
            application_key: env_non_empty("B2_APPLICATION_KEY"),
            bucket_name: env_non_empty("B2_BUCKET_NAME"),
            api_url,
            auth_session_ttl: Duration::from_secs(auth_session_ttl_secs),
            download_auth_ttl: Duration::from_secs(download_auth_ttl_secs),
        }
    }

    /// Returns `(key_id, application_key, bucket_name)` when all three are set
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        match (&self.key_id, &self.application_key, &self.bucket_name) {
            (Some(id), Some(key), Some(bucket)) => Some((id, key, bucket)),
            _ => None,
        }
    }

    /// Names of the credential variables that are not set
    pub fn missing_variables(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.key_id.is_none() {
            missing.push("B2_KEY_ID");
        }
        if self.application_key.is_none() {
            missing.push("B2_APPLICATION_KEY");
        }
        if self.bucket_name.is_none() {
            missing.push("B2_BUCKET_NAME");
        }
        missing
    }
}

impl Default for B2Config {
    fn default() -> Self {
        Self {
            key_id: None,
            application_key: None,
            bucket_name: None,
            api_url: Self::DEFAULT_API_URL.to_string(),
            auth_session_ttl: Duration::from_secs(Self::DEFAULT_AUTH_SESSION_TTL_SECS),
            download_auth_ttl: Duration::from_secs(Self::DEFAULT_DOWNLOAD_AUTH_TTL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::lock_env;

    #[test]
    fn test_b2_credentials_require_all_fields() {
        let mut config = B2Config {
            key_id: Some("key-id".to_string()),
            application_key: Some("app-key".to_string()),
            ..Default::default()
        };
        assert!(config.credentials().is_none());
        assert_eq!(config.missing_variables(), vec!["B2_BUCKET_NAME"]);

        config.bucket_name = Some("donasi-bukti".to_string());
        assert_eq!(
            config.credentials(),
            Some(("key-id", "app-key", "donasi-bukti"))
        );
        assert!(config.missing_variables().is_empty());
    }

    #[test]
    fn test_b2_defaults() {
        let config = B2Config::default();
        assert_eq!(config.api_url, "https://api.backblazeb2.com");
        assert_eq!(config.auth_session_ttl, Duration::from_secs(82_800));
        assert_eq!(config.download_auth_ttl, Duration::from_secs(3600));
        assert_eq!(config.missing_variables().len(), 3);
    }

    #[test]
    fn test_storage_from_env_trims_provider() {
        let _env = lock_env(&[("STORAGE_PROVIDER", "  object-storage \n")]);
        let config = Config::from_env();
        assert_eq!(
            config.storage.preferred_provider.as_deref(),
            Some("object-storage")
        );
        assert!(config.warnings.is_empty());

        env::set_var("STORAGE_PROVIDER", "   ");
        assert!(Config::from_env().storage.preferred_provider.is_none());
    }

    #[test]
    fn test_empty_credential_counts_as_missing() {
        let _env = lock_env(&[
            ("B2_KEY_ID", ""),
            ("B2_APPLICATION_KEY", "app-key"),
            ("B2_BUCKET_NAME", "donasi-bukti"),
            ("B2_API_URL", "https://api005.backblazeb2.com/"),
        ]);
        let config = Config::from_env();

        assert!(config.b2.credentials().is_none());
        assert_eq!(config.b2.missing_variables(), vec!["B2_KEY_ID"]);
        assert_eq!(config.b2.api_url, "https://api005.backblazeb2.com");
    }

    #[test]
    fn test_malformed_number_falls_back_per_variable() {
        let _env = lock_env(&[
            ("STORAGE_MAX_FILE_SIZE", "ten"),
            ("B2_AUTH_SESSION_TTL_SECS", "600"),
            ("B2_DOWNLOAD_AUTH_TTL_SECS", "1h"),
            ("B2_KEY_ID", "key-id"),
            ("B2_APPLICATION_KEY", "app-key"),
            ("B2_BUCKET_NAME", "donasi-bukti"),
        ]);
        let config = Config::from_env();

        assert_eq!(config.storage.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.b2.auth_session_ttl, Duration::from_secs(600));
        assert_eq!(config.b2.download_auth_ttl, Duration::from_secs(3600));
        assert!(config.b2.credentials().is_some());

        assert_eq!(config.warnings.len(), 2);
        assert!(config.warnings[0].starts_with("STORAGE_MAX_FILE_SIZE must be a valid number"));
        assert!(config.warnings[1]
            .starts_with("B2_DOWNLOAD_AUTH_TTL_SECS must be a valid number"));
    }

    #[test]
    fn test_blob_dir_from_env() {
        let _env = lock_env(&[("STORAGE_BLOB_DIR", "/var/lib/donasi/blobs")]);
        assert_eq!(
            Config::from_env().storage.managed_blob_dir,
            PathBuf::from("/var/lib/donasi/blobs")
        );
    }
}
