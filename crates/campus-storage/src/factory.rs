#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::resolver::ConfigResolver;
use crate::types::{ConnectionTestResult, StorageConfig};
use crate::{Storage, StorageResult};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Create a storage backend for a resolved configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config {
        #[cfg(feature = "storage-local")]
        StorageConfig::Local { path } => {
            let storage = LocalStorage::new(path.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageConfig::Local { .. } => Err(crate::StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-s3")]
        StorageConfig::Remote(remote) => {
            let storage = S3Storage::new(remote).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageConfig::Remote(_) => Err(crate::StorageError::ConfigError(
            "Remote storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),
    }
}

/// Process-wide handle to the active storage adapter.
///
/// The adapter is built from the resolver's output on first use and cached until
/// [`StorageHandle::reset`]. Clones share the same cache.
#[derive(Clone)]
pub struct StorageHandle {
    resolver: Arc<ConfigResolver>,
    active: Arc<RwLock<Option<Arc<dyn Storage>>>>,
}

impl StorageHandle {
    pub fn new(resolver: ConfigResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
            active: Arc::new(RwLock::new(None)),
        }
    }

    /// Handle seeded with an already-built adapter. `reset` still falls back to
    /// the resolver.
    pub fn with_active(resolver: ConfigResolver, storage: Arc<dyn Storage>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            active: Arc::new(RwLock::new(Some(storage))),
        }
    }

    /// Handle over the process environment, without a settings store.
    pub fn from_env() -> Self {
        Self::new(ConfigResolver::from_env())
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// The active adapter, building it if none is cached.
    ///
    /// Concurrent first calls build a single adapter. Failed resolution or
    /// construction leaves the handle uninitialized.
    pub async fn get_active(&self) -> StorageResult<Arc<dyn Storage>> {
        if let Some(storage) = self.active.read().await.as_ref() {
            return Ok(Arc::clone(storage));
        }

        let mut active = self.active.write().await;
        if let Some(storage) = active.as_ref() {
            return Ok(Arc::clone(storage));
        }

        let config = self.resolver.resolve().await?;
        let storage = create_storage(&config).await.map_err(|e| {
            tracing::error!(
                error = %e,
                backend = %config.backend(),
                "Failed to initialize storage adapter"
            );
            e
        })?;

        tracing::info!(backend = %storage.backend_type(), "Storage adapter initialized");
        *active = Some(Arc::clone(&storage));
        Ok(storage)
    }

    /// Drop the cached adapter; the next `get_active` re-resolves configuration.
    ///
    /// Callers still holding the previous adapter keep a working instance.
    pub async fn reset(&self) {
        let previous = self.active.write().await.take();
        match previous {
            Some(storage) => tracing::info!(
                backend = %storage.backend_type(),
                "Storage adapter reset"
            ),
            None => tracing::debug!("Storage adapter reset before initialization"),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Probe a candidate configuration with a throwaway adapter.
    ///
    /// The cached adapter is not touched. Construction failures are reported in the
    /// result like any other probe failure.
    pub async fn test_config(config: &StorageConfig) -> ConnectionTestResult {
        match create_storage(config).await {
            Ok(storage) => storage.test_connection().await,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backend = %config.backend(),
                    "Storage configuration test failed during setup"
                );
                ConnectionTestResult::failed(e.to_string())
            }
        }
    }
}
