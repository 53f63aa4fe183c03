//! Hooks for external collaborators
//!
//! The settings record lives in the application database, which this workspace
//! does not own. The application implements `SettingsStore` over its ORM and
//! hands it to the storage resolver.

use async_trait::async_trait;

use crate::models::settings::StorageSettings;

/// Source of the persisted storage settings record.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the storage settings.
    ///
    /// `Ok(None)` means no record has been saved yet. `Err` means the store itself
    /// could not be reached; the resolver then falls back to the environment.
    async fn load_storage_settings(&self) -> Result<Option<StorageSettings>, String>;
}

/// Store used when no settings database is wired in (CLI tools, tests).
pub struct NoSettingsStore;

#[async_trait]
impl SettingsStore for NoSettingsStore {
    async fn load_storage_settings(&self) -> Result<Option<StorageSettings>, String> {
        Ok(None)
    }
}
