//! Campus Storage Library
//!
//! Object storage for school assets (photos, documents, course materials,
//! question images) behind one `Storage` trait with two backends: a local
//! directory tree and an S3-compatible object store.
//!
//! # Storage key format
//!
//! Every key is tenant-scoped: `tenants/{tenant_id}/{category}/{subpath}` where
//! `category` is one of the fixed [`StorageCategory`] values. The tenant segment
//! is the only isolation mechanism at this layer; callers must have verified the
//! tenant before building a [`TenantStorageService`].
//!
//! # Backend selection
//!
//! [`ConfigResolver`] picks the active configuration (settings record, then
//! environment, then a local default) and [`StorageHandle`] caches the adapter
//! built from it until [`StorageHandle::reset`] is called.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod resolver;
#[cfg(feature = "storage-s3")]
pub mod s3;
#[cfg(feature = "storage-s3")]
pub mod s3_api;
pub mod service;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use campus_core::StorageBackend;
pub use factory::{create_storage, StorageHandle};
pub use keys::{build_key, StorageCategory};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use resolver::{ConfigResolver, ConfigSource};
#[cfg(feature = "storage-s3")]
pub use s3::{S3Storage, DELETE_BATCH_LIMIT};
#[cfg(feature = "storage-s3")]
pub use s3_api::{AwsS3Api, ListPage, S3Api};
pub use service::{CategoryUsage, TenantStorageService, TenantStorageUsage};
pub use traits::{Storage, StorageError, StorageResult};
pub use types::{
    ConnectionTestResult, IncomingFile, RemoteConfig, StorageConfig, StorageObject,
    UploadRequest, UploadResult,
};
