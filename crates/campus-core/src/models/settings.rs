//! Persisted per-tenant storage settings record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage_types::StorageBackend;

/// Storage fields of the tenant settings record, as kept by the settings store.
///
/// Every field is optional because the record is edited piecemeal from the
/// administration screens; the resolver decides whether the combination is usable.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    pub storage_type: Option<StorageBackend>,
    pub storage_local_path: Option<String>,
    pub storage_remote_account_id: Option<String>,
    pub storage_remote_access_key_id: Option<String>,
    pub storage_remote_secret_access_key: Option<String>,
    pub storage_remote_bucket: Option<String>,
    pub storage_remote_public_url: Option<String>,
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("storage_type", &self.storage_type)
            .field("storage_local_path", &self.storage_local_path)
            .field("storage_remote_account_id", &self.storage_remote_account_id)
            .field("storage_remote_access_key_id", &self.storage_remote_access_key_id)
            .field(
                "storage_remote_secret_access_key",
                &self.storage_remote_secret_access_key.as_ref().map(|_| "***"),
            )
            .field("storage_remote_bucket", &self.storage_remote_bucket)
            .field("storage_remote_public_url", &self.storage_remote_public_url)
            .finish()
    }
}
