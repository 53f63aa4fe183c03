//! Wire-level access to an S3-compatible bucket.
//!
//! `S3Api` is the narrow set of calls `S3Storage` needs. Keeping it behind a trait
//! lets the adapter's batching and pagination logic run against an in-memory
//! bucket in tests.

use crate::traits::{StorageError, StorageResult};
use crate::types::{RemoteConfig, StorageObject, UploadRequest};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Region name accepted by R2 and most S3-compatible services.
const REMOTE_REGION: &str = "auto";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<StorageObject>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next_continuation_token: Option<String>,
}

#[async_trait]
pub trait S3Api: Send + Sync {
    /// PUT an object; returns its ETag when the service reports one.
    async fn put_object(&self, request: &UploadRequest) -> StorageResult<Option<String>>;

    /// GET an object body. Missing objects are `StorageError::NotFound`.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// HEAD an object; `Ok(false)` when it does not exist.
    async fn head_object(&self, key: &str) -> StorageResult<bool>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// One DeleteObjects request. Callers keep `keys` within the service limit.
    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()>;

    /// One ListObjectsV2 request.
    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: Option<i32>,
    ) -> StorageResult<ListPage>;

    /// Presigned GET URL valid for `expires_in`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}

/// `S3Api` over the AWS SDK client.
#[derive(Clone, Debug)]
pub struct AwsS3Api {
    client: Client,
    bucket: String,
}

impl AwsS3Api {
    /// Build a client for the configured bucket.
    ///
    /// Uses the static credentials from the configuration only, path-style
    /// addressing (required by MinIO and friends) and no SDK-level retries: retry
    /// policy belongs to the caller.
    pub async fn new(config: &RemoteConfig) -> StorageResult<Self> {
        let endpoint = config.endpoint();
        if endpoint.trim_start_matches("https://").trim_start_matches("http://").is_empty() {
            return Err(StorageError::ConfigError(
                "Remote storage endpoint is empty".to_string(),
            ));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "campus-storage-settings",
        );

        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .operation_timeout(OPERATION_TIMEOUT)
            .build();

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(REMOTE_REGION))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(timeout_config)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }
}

fn connectivity<E: std::error::Error>(err: &E) -> StorageError {
    StorageError::Connectivity(DisplayErrorContext(err).to_string())
}

fn is_http_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    err.raw_response()
        .map(|response| response.status().as_u16() == 404)
        .unwrap_or(false)
}

/// Token for the following page. A truncated page must carry one.
fn next_page_token(
    prefix: &str,
    is_truncated: bool,
    token: Option<&str>,
) -> StorageResult<Option<String>> {
    match (is_truncated, token) {
        (false, _) => Ok(None),
        (true, Some(token)) => Ok(Some(token.to_string())),
        (true, None) => Err(StorageError::Connectivity(format!(
            "Listing of {:?} was truncated without a continuation token",
            prefix
        ))),
    }
}

fn clean_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[async_trait]
impl S3Api for AwsS3Api {
    async fn put_object(&self, request: &UploadRequest) -> StorageResult<Option<String>> {
        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .body(ByteStream::from(request.data.clone()))
            .set_content_type(request.content_type.clone());

        if !request.metadata.is_empty() {
            put = put.set_metadata(Some(request.metadata.clone()));
        }

        let output = put.send().await.map_err(|e| connectivity(&e))?;
        Ok(output.e_tag().map(clean_etag))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|service_err| service_err.is_no_such_key())
                    .unwrap_or(false);
                if missing || is_http_not_found(&e) {
                    StorageError::NotFound(key.to_string())
                } else {
                    connectivity(&e)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Connectivity(e.to_string()))?;

        Ok(data.into_bytes().to_vec())
    }

    async fn head_object(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|service_err| service_err.is_not_found())
                    .unwrap_or(false);
                if missing || is_http_not_found(&e) {
                    Ok(false)
                } else {
                    Err(connectivity(&e))
                }
            }
        }
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_http_not_found(&e) => Ok(()),
            Err(e) => Err(connectivity(&e)),
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()> {
        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::InvalidKey(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::InvalidKey(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| connectivity(&e))?;

        let failures: Vec<String> = output
            .errors()
            .iter()
            .filter(|err| err.code() != Some("NoSuchKey"))
            .map(|err| {
                format!(
                    "{}: {}",
                    err.key().unwrap_or("<unknown key>"),
                    err.message().or(err.code()).unwrap_or("unknown error")
                )
            })
            .collect();

        if !failures.is_empty() {
            return Err(StorageError::Connectivity(format!(
                "{} of {} objects could not be deleted: {}",
                failures.len(),
                keys.len(),
                failures.join("; ")
            )));
        }

        Ok(())
    }

    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: Option<i32>,
    ) -> StorageResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
            .set_continuation_token(continuation_token.map(str::to_string))
            .set_max_keys(max_keys)
            .send()
            .await
            .map_err(|e| connectivity(&e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(StorageObject {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                        .unwrap_or_default(),
                    etag: object.e_tag().map(clean_etag),
                })
            })
            .collect();

        let next_continuation_token = next_page_token(
            prefix,
            output.is_truncated().unwrap_or(false),
            output.next_continuation_token(),
        )?;

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| connectivity(&e))?;

        Ok(presigned_request.uri().to_string())
    }
}
