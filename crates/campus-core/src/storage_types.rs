use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// `Local` keeps objects in a directory tree on this host, `Remote` talks to an
/// S3-compatible object store (Cloudflare R2, MinIO, AWS S3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[serde(alias = "LOCAL")]
    Local,
    #[serde(alias = "REMOTE", alias = "r2", alias = "R2", alias = "s3", alias = "S3")]
    Remote,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "remote" | "r2" | "s3" => Ok(StorageBackend::Remote),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::Remote => write!(f, "remote"),
        }
    }
}
