//! Campus Core Library
//!
//! This crate provides the configuration, tenant and error types shared by the
//! Campus storage layer and the binaries built on top of it.

pub mod config;
pub mod error;
pub mod hooks;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{StorageEnv, DEFAULT_LOCAL_STORAGE_PATH};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use hooks::{NoSettingsStore, SettingsStore};
pub use models::settings::StorageSettings;
pub use models::tenant::TenantId;
pub use storage_types::StorageBackend;
