//! Storage configuration resolution.
//!
//! Precedence: the persisted settings record, then environment variables, then a
//! local default. A remote selection with missing fields is an error at whichever
//! level selected it; it never degrades to local storage.

use crate::traits::{StorageError, StorageResult};
use crate::types::{RemoteConfig, StorageConfig};
use campus_core::config::{
    ENV_REMOTE_ACCESS_KEY_ID, ENV_REMOTE_ACCOUNT_ID, ENV_REMOTE_BUCKET,
    ENV_REMOTE_SECRET_ACCESS_KEY,
};
use campus_core::{
    NoSettingsStore, SettingsStore, StorageBackend, StorageEnv, StorageSettings,
    DEFAULT_LOCAL_STORAGE_PATH,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a resolved configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Settings,
    Environment,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigSource::Settings => "settings",
            ConfigSource::Environment => "environment",
            ConfigSource::Default => "default",
        })
    }
}

/// Determines the active storage configuration.
pub struct ConfigResolver {
    settings: Arc<dyn SettingsStore>,
    env: StorageEnv,
}

impl ConfigResolver {
    pub fn new(settings: Arc<dyn SettingsStore>, env: StorageEnv) -> Self {
        Self { settings, env }
    }

    /// Resolver without a settings store, reading the process environment.
    pub fn from_env() -> Self {
        Self::new(Arc::new(NoSettingsStore), StorageEnv::from_env())
    }

    pub async fn resolve(&self) -> StorageResult<StorageConfig> {
        self.resolve_with_source().await.map(|(config, _)| config)
    }

    /// Resolve the configuration and report which level supplied it.
    pub async fn resolve_with_source(&self) -> StorageResult<(StorageConfig, ConfigSource)> {
        match self.settings.load_storage_settings().await {
            Ok(Some(settings)) => {
                if let Some(config) = config_from_settings(&settings)? {
                    return Ok(resolved(config, ConfigSource::Settings));
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Settings store unavailable, using environment storage configuration"
                );
            }
        }

        if let Some(config) = config_from_env(&self.env)? {
            return Ok(resolved(config, ConfigSource::Environment));
        }

        Ok(resolved(
            StorageConfig::Local {
                path: PathBuf::from(DEFAULT_LOCAL_STORAGE_PATH),
            },
            ConfigSource::Default,
        ))
    }
}

fn resolved(config: StorageConfig, source: ConfigSource) -> (StorageConfig, ConfigSource) {
    match &config {
        StorageConfig::Local { path } => tracing::info!(
            source = %source,
            backend = %config.backend(),
            path = %path.display(),
            "Storage configuration resolved"
        ),
        StorageConfig::Remote(remote) => tracing::info!(
            source = %source,
            backend = %config.backend(),
            bucket = %remote.bucket,
            endpoint = %remote.endpoint(),
            "Storage configuration resolved"
        ),
    }
    (config, source)
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn local_path(path: Option<&String>) -> PathBuf {
    PathBuf::from(non_blank(path).unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_PATH.to_string()))
}

/// Build a remote configuration, naming every missing required field.
fn remote_config(
    source: ConfigSource,
    required: [(&'static str, Option<String>); 4],
    public_url: Option<String>,
) -> StorageResult<RemoteConfig> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(StorageError::ConfigError(format!(
            "Remote storage selected in {} but missing: {}",
            source,
            missing.join(", ")
        )));
    }

    let [account_id, access_key_id, secret_access_key, bucket] =
        required.map(|(_, value)| value.unwrap_or_default());

    Ok(RemoteConfig {
        account_id,
        access_key_id,
        secret_access_key,
        bucket,
        public_url,
    })
}

/// `None` when the record does not choose a backend.
fn config_from_settings(settings: &StorageSettings) -> StorageResult<Option<StorageConfig>> {
    let config = match settings.storage_type {
        None => return Ok(None),
        Some(StorageBackend::Local) => StorageConfig::Local {
            path: local_path(settings.storage_local_path.as_ref()),
        },
        Some(StorageBackend::Remote) => StorageConfig::Remote(remote_config(
            ConfigSource::Settings,
            [
                (
                    "storageRemoteAccountId",
                    non_blank(settings.storage_remote_account_id.as_ref()),
                ),
                (
                    "storageRemoteAccessKeyId",
                    non_blank(settings.storage_remote_access_key_id.as_ref()),
                ),
                (
                    "storageRemoteSecretAccessKey",
                    non_blank(settings.storage_remote_secret_access_key.as_ref()),
                ),
                (
                    "storageRemoteBucket",
                    non_blank(settings.storage_remote_bucket.as_ref()),
                ),
            ],
            non_blank(settings.storage_remote_public_url.as_ref()),
        )?),
    };
    Ok(Some(config))
}

/// `None` when neither `STORAGE_TYPE` nor `STORAGE_PATH` is set.
fn config_from_env(env: &StorageEnv) -> StorageResult<Option<StorageConfig>> {
    let backend = env
        .backend()
        .map_err(|e| StorageError::ConfigError(e.to_string()))?;

    let config = match backend {
        None if env.storage_path.is_none() => return Ok(None),
        None | Some(StorageBackend::Local) => StorageConfig::Local {
            path: local_path(env.storage_path.as_ref()),
        },
        Some(StorageBackend::Remote) => StorageConfig::Remote(remote_config(
            ConfigSource::Environment,
            [
                (ENV_REMOTE_ACCOUNT_ID, non_blank(env.remote_account_id.as_ref())),
                (
                    ENV_REMOTE_ACCESS_KEY_ID,
                    non_blank(env.remote_access_key_id.as_ref()),
                ),
                (
                    ENV_REMOTE_SECRET_ACCESS_KEY,
                    non_blank(env.remote_secret_access_key.as_ref()),
                ),
                (ENV_REMOTE_BUCKET, non_blank(env.remote_bucket.as_ref())),
            ],
            non_blank(env.remote_public_url.as_ref()),
        )?),
    };
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedSettings(Result<Option<StorageSettings>, String>);

    #[async_trait]
    impl SettingsStore for FixedSettings {
        async fn load_storage_settings(&self) -> Result<Option<StorageSettings>, String> {
            self.0.clone()
        }
    }

    fn env_of(pairs: &[(&str, &str)]) -> StorageEnv {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StorageEnv::from_lookup(|name| map.get(name).cloned())
    }

    fn resolver(
        settings: Result<Option<StorageSettings>, String>,
        env: StorageEnv,
    ) -> ConfigResolver {
        ConfigResolver::new(Arc::new(FixedSettings(settings)), env)
    }

    fn remote_settings() -> StorageSettings {
        StorageSettings {
            storage_type: Some(StorageBackend::Remote),
            storage_remote_account_id: Some("acc".to_string()),
            storage_remote_access_key_id: Some("AKIA".to_string()),
            storage_remote_secret_access_key: Some("secret".to_string()),
            storage_remote_bucket: Some("school-files".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn settings_record_wins_over_environment() {
        let env = env_of(&[("STORAGE_TYPE", "LOCAL"), ("STORAGE_PATH", "/srv/env")]);
        let (config, source) = resolver(Ok(Some(remote_settings())), env)
            .resolve_with_source()
            .await
            .unwrap();

        assert_eq!(source, ConfigSource::Settings);
        match config {
            StorageConfig::Remote(remote) => {
                assert_eq!(remote.bucket, "school-files");
                assert_eq!(remote.endpoint(), "https://acc.r2.cloudflarestorage.com");
                assert!(remote.public_url.is_none());
            }
            other => panic!("expected remote config, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn incomplete_remote_settings_fail_fast() {
        let settings = StorageSettings {
            storage_remote_bucket: Some("  ".to_string()),
            storage_remote_secret_access_key: None,
            ..remote_settings()
        };
        let env = env_of(&[("STORAGE_TYPE", "LOCAL")]);

        let err = resolver(Ok(Some(settings)), env).resolve().await.unwrap_err();
        match err {
            StorageError::ConfigError(msg) => {
                assert!(msg.contains("storageRemoteBucket"), "{}", msg);
                assert!(msg.contains("storageRemoteSecretAccessKey"), "{}", msg);
                assert!(!msg.contains("storageRemoteAccountId"), "{}", msg);
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn settings_store_outage_falls_back_to_environment() {
        let env = env_of(&[
            ("STORAGE_TYPE", "REMOTE"),
            ("REMOTE_ACCOUNT_ID", "http://localhost:9000"),
            ("REMOTE_ACCESS_KEY_ID", "minio"),
            ("REMOTE_SECRET_ACCESS_KEY", "minio123"),
            ("REMOTE_BUCKET", "campus"),
            ("REMOTE_PUBLIC_URL", "https://files.school.test"),
        ]);

        let (config, source) = resolver(Err("connection refused".to_string()), env)
            .resolve_with_source()
            .await
            .unwrap();

        assert_eq!(source, ConfigSource::Environment);
        match config {
            StorageConfig::Remote(remote) => {
                assert_eq!(remote.endpoint(), "http://localhost:9000");
                assert_eq!(remote.public_url.as_deref(), Some("https://files.school.test"));
            }
            other => panic!("expected remote config, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn record_without_type_defers_to_environment() {
        let settings = StorageSettings {
            storage_local_path: Some("/ignored".to_string()),
            ..Default::default()
        };
        let env = env_of(&[("STORAGE_PATH", "/srv/uploads")]);

        let (config, source) = resolver(Ok(Some(settings)), env)
            .resolve_with_source()
            .await
            .unwrap();

        assert_eq!(source, ConfigSource::Environment);
        assert_eq!(
            config,
            StorageConfig::Local {
                path: PathBuf::from("/srv/uploads")
            }
        );
    }

    #[tokio::test]
    async fn incomplete_remote_environment_fails_fast() {
        let env = env_of(&[("STORAGE_TYPE", "remote"), ("REMOTE_BUCKET", "campus")]);
        let err = resolver(Ok(None), env).resolve().await.unwrap_err();

        match err {
            StorageError::ConfigError(msg) => {
                assert!(msg.contains("REMOTE_ACCOUNT_ID"), "{}", msg);
                assert!(!msg.contains("REMOTE_BUCKET"), "{}", msg);
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_storage_type_is_a_config_error() {
        let env = env_of(&[("STORAGE_TYPE", "ftp")]);
        let err = resolver(Ok(None), env).resolve().await.unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[tokio::test]
    async fn defaults_to_local_uploads() {
        let (config, source) = resolver(Ok(None), StorageEnv::default())
            .resolve_with_source()
            .await
            .unwrap();

        assert_eq!(source, ConfigSource::Default);
        assert_eq!(
            config,
            StorageConfig::Local {
                path: PathBuf::from("./uploads")
            }
        );
    }

    #[tokio::test]
    async fn local_settings_without_path_use_default() {
        let settings = StorageSettings {
            storage_type: Some(StorageBackend::Local),
            storage_local_path: Some("".to_string()),
            ..Default::default()
        };

        let config = resolver(Ok(Some(settings)), StorageEnv::default())
            .resolve()
            .await
            .unwrap();
        assert_eq!(
            config,
            StorageConfig::Local {
                path: PathBuf::from(DEFAULT_LOCAL_STORAGE_PATH)
            }
        );
    }
}
