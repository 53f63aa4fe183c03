//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::types::{ConnectionTestResult, StorageObject, UploadRequest, UploadResult};
use crate::StorageBackend;
use async_trait::async_trait;
use campus_core::AppError;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage backend unreachable: {0}")]
    Connectivity(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("File not found: {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::ConfigError(msg) => AppError::StorageConfig(msg),
            StorageError::Connectivity(msg) => AppError::StorageUnavailable(msg),
            StorageError::IoError(e) => AppError::Storage(e.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// All storage backends (local filesystem, S3-compatible) implement this trait so
/// the rest of the application never depends on which one is active.
///
/// Errors are propagated unchanged; there is no retry at this layer. The only
/// operation that never fails is [`Storage::test_connection`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store the payload under `request.key`, creating intermediate structure and
    /// overwriting any existing object.
    async fn upload(&self, request: UploadRequest) -> StorageResult<UploadResult>;

    /// Download an object. Fails with `NotFound` when nothing is stored at `key`.
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete many objects, batched to what the backend accepts per request.
    ///
    /// Keys that are already absent do not fail the operation.
    async fn delete_many(&self, keys: &[String]) -> StorageResult<()>;

    /// URL for reading an object.
    ///
    /// Public backends return a stable URL; otherwise a signed URL valid for
    /// `expires_in` (one hour by default).
    async fn get_url(&self, key: &str, expires_in: Option<Duration>) -> StorageResult<String>;

    /// Whether an object exists. Absence is `Ok(false)`, never an error.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Every object whose key starts with `prefix`, across all result pages.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<StorageObject>>;

    /// Probe the backend. Failures are reported in the result, never raised.
    async fn test_connection(&self) -> ConnectionTestResult;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
