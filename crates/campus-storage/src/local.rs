use crate::keys::{validate_key, validate_prefix};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::types::{ConnectionTestResult, StorageObject, UploadRequest, UploadResult};
use crate::StorageBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Route under which the HTTP layer serves locally stored files.
pub const LOCAL_URL_PREFIX: &str = "/api/storage";

/// Suffix of in-flight upload files; `list` never reports them.
const UPLOAD_TEMP_SUFFIX: &str = ".upload";

/// A missing file, or a key that descends through a regular file.
fn is_missing(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

fn is_upload_temp(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(UPLOAD_TEMP_SUFFIX)
}

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path`
    /// (e.g., "./uploads"). The directory is created if missing.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let base_path = fs::canonicalize(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to canonicalize base path {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys with traversal sequences, then checks that the deepest existing
    /// ancestor of the target still resolves inside the base directory, so a
    /// symlink planted in the tree cannot redirect writes elsewhere.
    async fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;
        let path = self.base_path.join(storage_key);
        self.ensure_inside_base(&path).await?;
        Ok(path)
    }

    async fn ensure_inside_base(&self, path: &Path) -> StorageResult<()> {
        let mut current = path.to_path_buf();
        loop {
            match fs::canonicalize(&current).await {
                Ok(canonical) => {
                    if canonical.strip_prefix(&self.base_path).is_err() {
                        return Err(StorageError::InvalidKey(
                            "Storage key resolves outside storage directory".to_string(),
                        ));
                    }
                    return Ok(());
                }
                Err(e) if is_missing(&e) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => return Ok(()),
                },
                Err(e) => return Err(StorageError::IoError(e)),
            }
        }
    }

    /// Normalize a path under the base directory to a `/`-separated key.
    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(segments.join("/"))
    }

    /// Generate the URL for a file
    fn generate_url(key: &str) -> String {
        format!("{}/{}", LOCAL_URL_PREFIX, key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Sibling of `path` that an upload writes before renaming it into place.
    fn upload_temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(
            ".{}.{}{}",
            name,
            Uuid::new_v4().simple(),
            UPLOAD_TEMP_SUFFIX
        ))
    }

    /// Write `data` to `temp`, flush it to disk and rename it over `path`.
    ///
    /// Readers see either the previous object or the complete new one.
    async fn write_and_replace(&self, path: &Path, temp: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = match fs::File::create(temp).await {
            Ok(file) => file,
            // A concurrent delete may prune the parent between create_dir_all and create.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::File::create(temp).await?
            }
            Err(e) => return Err(e),
        };
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(temp, path).await
    }

    /// Remove now-empty directories from `dir` upwards, stopping at the base directory.
    async fn prune_empty_dirs(&self, dir: Option<&Path>) {
        let mut current = dir.map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == self.base_path || dir.strip_prefix(&self.base_path).is_err() {
                break;
            }
            // remove_dir fails on non-empty directories, which ends the walk.
            if fs::remove_dir(&dir).await.is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }

    async fn run_connection_probe(&self, probe_dir: &Path) -> Result<(), String> {
        let probe_file = probe_dir.join("probe.txt");
        let payload = format!("connection test {}", Utc::now().to_rfc3339());

        fs::create_dir_all(probe_dir)
            .await
            .map_err(|e| format!("Failed to create {}: {}", probe_dir.display(), e))?;
        fs::write(&probe_file, payload.as_bytes())
            .await
            .map_err(|e| format!("Failed to write {}: {}", probe_file.display(), e))?;
        let read_back = fs::read(&probe_file)
            .await
            .map_err(|e| format!("Failed to read {}: {}", probe_file.display(), e))?;
        if read_back != payload.as_bytes() {
            return Err(format!(
                "Read back different content from {}",
                probe_file.display()
            ));
        }
        fs::remove_file(&probe_file)
            .await
            .map_err(|e| format!("Failed to delete {}: {}", probe_file.display(), e))?;
        fs::remove_dir(probe_dir)
            .await
            .map_err(|e| format!("Failed to delete {}: {}", probe_dir.display(), e))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, request: UploadRequest) -> StorageResult<UploadResult> {
        let path = self.key_to_path(&request.key).await?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let temp = Self::upload_temp_path(&path);
        if let Err(e) = self.write_and_replace(&path, &temp, &request.data).await {
            let _ = fs::remove_file(&temp).await;
            tracing::error!(
                error = %e,
                path = %path.display(),
                key = %request.key,
                "Local storage upload failed"
            );
            return Err(StorageError::IoError(e));
        }

        let size = request.data.len() as u64;
        let url = Self::generate_url(&request.key);

        tracing::info!(
            path = %path.display(),
            key = %request.key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(UploadResult {
            key: request.key,
            url,
            size,
            etag: None,
        })
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(storage_key).await?;
        let start = std::time::Instant::now();

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if is_missing(&e) => return Err(StorageError::NotFound(storage_key.to_string())),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %path.display(),
                    key = %storage_key,
                    "Local storage download failed"
                );
                return Err(StorageError::IoError(e));
            }
        };

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(data)
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key).await?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if is_missing(&e) => {
                tracing::debug!(key = %storage_key, "Local storage delete of missing file");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %path.display(),
                    key = %storage_key,
                    "Local storage delete failed"
                );
                return Err(StorageError::IoError(e));
            }
        }

        self.prune_empty_dirs(path.parent()).await;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    async fn get_url(
        &self,
        storage_key: &str,
        _expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        validate_key(storage_key)?;
        Ok(Self::generate_url(storage_key))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key).await?;
        let exists = match fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(e) if is_missing(&e) => false,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %path.display(),
                    key = %storage_key,
                    "Local storage exists check failed"
                );
                return Err(StorageError::IoError(e));
            }
        };

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            exists = exists,
            "Local storage exists check successful"
        );

        Ok(exists)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StorageObject>> {
        validate_prefix(prefix)?;
        let start = std::time::Instant::now();

        // Walk from the deepest directory the prefix fully names; a partial last
        // segment ("tenants/T1/stu") is matched by the starts_with filter below.
        let root = if prefix.is_empty() || prefix.ends_with('/') {
            self.base_path.join(prefix)
        } else {
            match prefix.rsplit_once('/') {
                Some((dir, _)) => self.base_path.join(dir),
                None => self.base_path.clone(),
            }
        };
        self.ensure_inside_base(&root).await?;

        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(Vec::new()),
            Err(e) if is_missing(&e) => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::IoError(e)),
        }

        let mut objects = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // Removed by a concurrent delete since it was discovered.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::IoError(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() || is_upload_temp(&entry.file_name().to_string_lossy()) {
                    continue;
                }

                let Some(key) = self.path_to_key(&path) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }

                let meta = entry.metadata().await?;
                let last_modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_default();

                objects.push(StorageObject {
                    key,
                    size: meta.len(),
                    last_modified,
                    etag: None,
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));

        tracing::info!(
            prefix = %prefix,
            count = objects.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage list successful"
        );

        Ok(objects)
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        let probe_dir = self
            .base_path
            .join(format!(".connection-test-{}", Uuid::new_v4()));

        match self.run_connection_probe(&probe_dir).await {
            Ok(()) => {
                tracing::info!(
                    path = %self.base_path.display(),
                    "Local storage connection test passed"
                );
                ConnectionTestResult::ok()
            }
            Err(message) => {
                let _ = fs::remove_dir_all(&probe_dir).await;
                tracing::warn!(
                    path = %self.base_path.display(),
                    error = %message,
                    "Local storage connection test failed"
                );
                ConnectionTestResult::failed(message)
            }
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
