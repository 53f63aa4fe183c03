//! Value types shared by every storage backend.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StorageBackend;

/// Lifetime of a signed URL when the caller does not ask for one.
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Metadata of a stored object as observed at listing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Only reported by the remote backend.
    pub etag: Option<String>,
}

/// A payload to store under `key`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub key: String,
    pub data: Bytes,
    pub content_type: Option<String>,
    /// Free-form metadata; backends may ignore it.
    pub metadata: HashMap<String, String>,
    /// Whether the object is meant to be reachable through a public URL.
    pub is_public: bool,
}

impl UploadRequest {
    pub fn new(key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
            content_type: None,
            metadata: HashMap::new(),
            is_public: false,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Outcome of a backend liveness probe. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            // Failures always carry a non-empty message.
            error: Some(if error.is_empty() {
                "unknown error".to_string()
            } else {
                error
            }),
        }
    }
}

/// A file handed over by the HTTP layer, before a key has been chosen for it.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl IncomingFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// The storage configuration in effect. Exactly one backend is active at a time.
///
/// Switching variants does not migrate objects already stored by the other backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local { path: PathBuf },
    Remote(RemoteConfig),
}

impl StorageConfig {
    pub fn backend(&self) -> StorageBackend {
        match self {
            StorageConfig::Local { .. } => StorageBackend::Local,
            StorageConfig::Remote(_) => StorageBackend::Remote,
        }
    }
}

/// Connection details for an S3-compatible bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Cloudflare account id, or a full `http(s)://` endpoint for other providers.
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// CDN or public bucket domain; when set, URLs are public and never expire.
    pub public_url: Option<String>,
}

impl RemoteConfig {
    /// Endpoint URL the S3 client talks to.
    pub fn endpoint(&self) -> String {
        let account = self.account_id.trim();
        if account.starts_with("http://") || account.starts_with("https://") {
            account.trim_end_matches('/').to_string()
        } else {
            format!("https://{}.r2.cloudflarestorage.com", account)
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("bucket", &self.bucket)
            .field("public_url", &self.public_url)
            .finish()
    }
}
