//! Configuration module
//!
//! Environment-variable fallback for the storage configuration. The persisted
//! tenant settings record always wins when it is available; these variables cover
//! cold starts and settings-store outages.

use std::env;
use std::fmt;

use crate::storage_types::StorageBackend;

/// Local directory used when neither settings nor environment name one.
pub const DEFAULT_LOCAL_STORAGE_PATH: &str = "./uploads";

pub const ENV_STORAGE_TYPE: &str = "STORAGE_TYPE";
pub const ENV_STORAGE_PATH: &str = "STORAGE_PATH";
pub const ENV_REMOTE_ACCOUNT_ID: &str = "REMOTE_ACCOUNT_ID";
pub const ENV_REMOTE_ACCESS_KEY_ID: &str = "REMOTE_ACCESS_KEY_ID";
pub const ENV_REMOTE_SECRET_ACCESS_KEY: &str = "REMOTE_SECRET_ACCESS_KEY";
pub const ENV_REMOTE_BUCKET: &str = "REMOTE_BUCKET";
pub const ENV_REMOTE_PUBLIC_URL: &str = "REMOTE_PUBLIC_URL";

/// Storage variables as found in the process environment.
///
/// Blank values are treated as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StorageEnv {
    pub storage_type: Option<String>,
    pub storage_path: Option<String>,
    pub remote_account_id: Option<String>,
    pub remote_access_key_id: Option<String>,
    pub remote_secret_access_key: Option<String>,
    pub remote_bucket: Option<String>,
    pub remote_public_url: Option<String>,
}

impl StorageEnv {
    /// Read the storage variables from the process environment, loading `.env` first.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary lookup function (used by tests and embedders).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        StorageEnv {
            storage_type: read(ENV_STORAGE_TYPE),
            storage_path: read(ENV_STORAGE_PATH),
            remote_account_id: read(ENV_REMOTE_ACCOUNT_ID),
            remote_access_key_id: read(ENV_REMOTE_ACCESS_KEY_ID),
            remote_secret_access_key: read(ENV_REMOTE_SECRET_ACCESS_KEY),
            remote_bucket: read(ENV_REMOTE_BUCKET),
            remote_public_url: read(ENV_REMOTE_PUBLIC_URL),
        }
    }

    /// Parsed `STORAGE_TYPE`, `None` when unset.
    pub fn backend(&self) -> Result<Option<StorageBackend>, anyhow::Error> {
        self.storage_type
            .as_deref()
            .map(|s| {
                s.parse::<StorageBackend>().map_err(|_| {
                    anyhow::anyhow!("{} must be LOCAL or REMOTE, got {}", ENV_STORAGE_TYPE, s)
                })
            })
            .transpose()
    }
}

impl fmt::Debug for StorageEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageEnv")
            .field("storage_type", &self.storage_type)
            .field("storage_path", &self.storage_path)
            .field("remote_account_id", &self.remote_account_id)
            .field("remote_access_key_id", &self.remote_access_key_id)
            .field(
                "remote_secret_access_key",
                &self.remote_secret_access_key.as_ref().map(|_| "***"),
            )
            .field("remote_bucket", &self.remote_bucket)
            .field("remote_public_url", &self.remote_public_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> StorageEnv {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StorageEnv::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn reads_all_storage_variables() {
        let env = env_of(&[
            ("STORAGE_TYPE", "REMOTE"),
            ("REMOTE_ACCOUNT_ID", "acc"),
            ("REMOTE_ACCESS_KEY_ID", "key"),
            ("REMOTE_SECRET_ACCESS_KEY", "secret"),
            ("REMOTE_BUCKET", "bucket"),
            ("REMOTE_PUBLIC_URL", "https://cdn.example.com"),
        ]);

        assert_eq!(env.backend().unwrap(), Some(StorageBackend::Remote));
        assert_eq!(env.remote_bucket.as_deref(), Some("bucket"));
        assert_eq!(env.remote_public_url.as_deref(), Some("https://cdn.example.com"));
        assert!(env.storage_path.is_none());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let env = env_of(&[("STORAGE_TYPE", "  "), ("REMOTE_BUCKET", "")]);
        assert_eq!(env.backend().unwrap(), None);
        assert!(env.remote_bucket.is_none());
    }

    #[test]
    fn invalid_storage_type_is_an_error() {
        let env = env_of(&[("STORAGE_TYPE", "ftp")]);
        assert!(env.backend().is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let env = env_of(&[("REMOTE_SECRET_ACCESS_KEY", "hunter2")]);
        assert!(!format!("{:?}", env).contains("hunter2"));
    }
}
