use crate::keys::{validate_key, validate_prefix};
use crate::s3_api::{AwsS3Api, S3Api};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::types::{
    ConnectionTestResult, RemoteConfig, StorageObject, UploadRequest, UploadResult,
    DEFAULT_URL_EXPIRY,
};
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Most keys a single DeleteObjects request may carry.
pub const DELETE_BATCH_LIMIT: usize = 1000;

/// Page size of the connection probe.
const PROBE_PAGE_SIZE: i32 = 1;

/// S3-compatible storage implementation (R2, MinIO, AWS S3)
#[derive(Clone)]
pub struct S3Storage {
    api: Arc<dyn S3Api>,
    bucket: String,
    public_url: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage backed by the AWS SDK client.
    pub async fn new(config: &RemoteConfig) -> StorageResult<Self> {
        let api = AwsS3Api::new(config).await?;
        Ok(Self::with_api(
            Arc::new(api),
            config.bucket.clone(),
            config.public_url.clone(),
        ))
    }

    /// Create an S3Storage over any `S3Api` implementation.
    ///
    /// A blank `public_url` counts as unset.
    pub fn with_api(
        api: Arc<dyn S3Api>,
        bucket: impl Into<String>,
        public_url: Option<String>,
    ) -> Self {
        let public_url = public_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        S3Storage {
            api,
            bucket: bucket.into(),
            public_url,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn public_url(&self) -> Option<&str> {
        self.public_url.as_deref()
    }

    fn public_object_url(&self, key: &str) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{}/{}", base, key))
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, request: UploadRequest) -> StorageResult<UploadResult> {
        validate_key(&request.key)?;

        let size = request.data.len() as u64;
        let start = Instant::now();

        let etag = self.api.put_object(&request).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %request.key,
                size_bytes = size,
                duration_ms = elapsed_ms(start),
                "S3 upload failed"
            );
            e
        })?;

        let url = match self.public_object_url(&request.key) {
            Some(url) if request.is_public => url,
            _ => self.get_url(&request.key, None).await?,
        };

        tracing::info!(
            bucket = %self.bucket,
            key = %request.key,
            size_bytes = size,
            duration_ms = elapsed_ms(start),
            "S3 upload successful"
        );

        Ok(UploadResult {
            key: request.key,
            url,
            size,
            etag,
        })
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        let start = Instant::now();

        let data = self.api.get_object(key).await.map_err(|e| {
            if !matches!(e, StorageError::NotFound(_)) {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = elapsed_ms(start),
                    "S3 download failed"
                );
            }
            e
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = elapsed_ms(start),
            "S3 download successful"
        );

        Ok(data)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let start = Instant::now();

        self.api.delete_object(key).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                duration_ms = elapsed_ms(start),
                "S3 delete failed"
            );
            e
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = elapsed_ms(start),
            "S3 delete successful"
        );

        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        for key in keys {
            validate_key(key)?;
        }

        let start = Instant::now();

        // Batches run one after another; the first failing batch aborts the rest.
        for (batch, chunk) in keys.chunks(DELETE_BATCH_LIMIT).enumerate() {
            self.api.delete_objects(chunk).await.map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    batch = batch,
                    batch_size = chunk.len(),
                    total_keys = keys.len(),
                    "S3 batch delete failed"
                );
                e
            })?;
        }

        tracing::info!(
            bucket = %self.bucket,
            total_keys = keys.len(),
            batches = keys.len().div_ceil(DELETE_BATCH_LIMIT),
            duration_ms = elapsed_ms(start),
            "S3 batch delete successful"
        );

        Ok(())
    }

    async fn get_url(&self, key: &str, expires_in: Option<Duration>) -> StorageResult<String> {
        validate_key(key)?;

        if let Some(url) = self.public_object_url(key) {
            return Ok(url);
        }

        let expires_in = expires_in.unwrap_or(DEFAULT_URL_EXPIRY);
        self.api.presign_get(key, expires_in).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                expires_in_secs = expires_in.as_secs(),
                "S3 presign failed"
            );
            e
        })
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let start = Instant::now();

        let exists = self.api.head_object(key).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                duration_ms = elapsed_ms(start),
                "S3 exists check failed"
            );
            e
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            exists = exists,
            duration_ms = elapsed_ms(start),
            "S3 exists check successful"
        );

        Ok(exists)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StorageObject>> {
        validate_prefix(prefix)?;

        let start = Instant::now();
        let mut objects = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .api
                .list_objects_page(prefix, token.as_deref(), None)
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        prefix = %prefix,
                        pages = pages,
                        "S3 list failed"
                    );
                    e
                })?;

            pages += 1;
            objects.extend(page.objects);

            match page.next_continuation_token {
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(StorageError::Connectivity(format!(
                            "Listing of {:?} returned a repeated continuation token",
                            prefix
                        )));
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            prefix = %prefix,
            pages = pages,
            object_count = objects.len(),
            duration_ms = elapsed_ms(start),
            "S3 list successful"
        );

        Ok(objects)
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        match self
            .api
            .list_objects_page("", None, Some(PROBE_PAGE_SIZE))
            .await
        {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "S3 connection test passed");
                ConnectionTestResult::ok()
            }
            Err(e) => {
                tracing::warn!(error = %e, bucket = %self.bucket, "S3 connection test failed");
                ConnectionTestResult::failed(e.to_string())
            }
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Remote
    }
}
