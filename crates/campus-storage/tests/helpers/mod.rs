#![allow(dead_code)]

use async_trait::async_trait;
use campus_core::{NoSettingsStore, StorageEnv, TenantId};
use campus_storage::{
    ConfigResolver, IncomingFile, ListPage, S3Api, S3Storage, Storage, StorageError,
    StorageHandle, StorageObject, StorageResult, TenantStorageService, UploadRequest,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Largest page the fake bucket returns, matching S3's ListObjectsV2 cap.
pub const FAKE_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct FakeObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub last_modified: DateTime<Utc>,
}

/// In-memory S3-compatible bucket.
///
/// Pages listings at [`FAKE_PAGE_SIZE`] using the last returned key as the
/// continuation token, and records every list and batch-delete request.
#[derive(Default)]
pub struct FakeS3Api {
    objects: Mutex<BTreeMap<String, FakeObject>>,
    delete_batches: Mutex<Vec<usize>>,
    list_requests: Mutex<Vec<Option<i32>>>,
    unreachable: Option<String>,
    fail_delete_batch: Option<usize>,
}

impl FakeS3Api {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call fails as if the endpoint rejected the credentials.
    pub fn unreachable(message: &str) -> Arc<Self> {
        Arc::new(Self {
            unreachable: Some(message.to_string()),
            ..Default::default()
        })
    }

    /// The batch delete with this zero-based index fails.
    pub fn failing_delete_batch(batch: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_delete_batch: Some(batch),
            ..Default::default()
        })
    }

    pub fn delete_batches(&self) -> Vec<usize> {
        self.delete_batches.lock().unwrap().clone()
    }

    pub fn list_requests(&self) -> Vec<Option<i32>> {
        self.list_requests.lock().unwrap().clone()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn object(&self, key: &str) -> Option<FakeObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            FakeObject {
                data: data.to_vec(),
                content_type: None,
                metadata: HashMap::new(),
                last_modified: Utc::now(),
            },
        );
    }

    fn check_reachable(&self) -> StorageResult<()> {
        match &self.unreachable {
            Some(message) => Err(StorageError::Connectivity(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl S3Api for FakeS3Api {
    async fn put_object(&self, request: &UploadRequest) -> StorageResult<Option<String>> {
        self.check_reachable()?;
        self.objects.lock().unwrap().insert(
            request.key.clone(),
            FakeObject {
                data: request.data.to_vec(),
                content_type: request.content_type.clone(),
                metadata: request.metadata.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(Some(format!("etag-{}", request.data.len())))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.check_reachable()?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn head_object(&self, key: &str) -> StorageResult<bool> {
        self.check_reachable()?;
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.check_reachable()?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()> {
        self.check_reachable()?;
        assert!(keys.len() <= 1000, "batch of {} keys exceeds S3 limit", keys.len());

        let batch = {
            let mut batches = self.delete_batches.lock().unwrap();
            batches.push(keys.len());
            batches.len() - 1
        };
        if self.fail_delete_batch == Some(batch) {
            return Err(StorageError::Connectivity(format!(
                "batch {} rejected",
                batch
            )));
        }

        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: Option<i32>,
    ) -> StorageResult<ListPage> {
        self.list_requests.lock().unwrap().push(max_keys);
        self.check_reachable()?;

        let page_size = max_keys
            .map(|n| n.clamp(1, FAKE_PAGE_SIZE as i32) as usize)
            .unwrap_or(FAKE_PAGE_SIZE);

        let objects = self.objects.lock().unwrap();
        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| continuation_token.map_or(true, |after| key.as_str() > after));

        let page: Vec<StorageObject> = matching
            .by_ref()
            .take(page_size)
            .map(|(key, object)| StorageObject {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
                etag: Some(format!("etag-{}", object.data.len())),
            })
            .collect();

        let next_continuation_token = match matching.next() {
            Some(_) => page.last().map(|object| object.key.clone()),
            None => None,
        };

        Ok(ListPage {
            objects: page,
            next_continuation_token,
        })
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        self.check_reachable()?;
        Ok(format!(
            "https://fake-s3.test/campus/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}

pub fn remote_storage(api: Arc<FakeS3Api>, public_url: Option<&str>) -> S3Storage {
    S3Storage::with_api(api, "campus", public_url.map(str::to_string))
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

/// Handle seeded with `storage`, resolving from an empty environment after reset.
pub fn handle_over(storage: Arc<dyn Storage>) -> StorageHandle {
    StorageHandle::with_active(
        ConfigResolver::new(Arc::new(NoSettingsStore), StorageEnv::default()),
        storage,
    )
}

pub fn service_over(storage: Arc<dyn Storage>, tenant_id: &str) -> TenantStorageService {
    TenantStorageService::new(handle_over(storage), tenant(tenant_id))
}

/// Upload `count` small objects named `{prefix}{index:05}.txt`.
pub async fn seed_objects(storage: &dyn Storage, prefix: &str, count: usize) -> Vec<String> {
    let mut keys = Vec::with_capacity(count);
    for i in 0..count {
        let key = format!("{}{:05}.txt", prefix, i);
        storage
            .upload(UploadRequest::new(key.clone(), format!("object {}", i).into_bytes()))
            .await
            .unwrap();
        keys.push(key);
    }
    keys
}

pub fn text_file(name: &str, body: &str) -> IncomingFile {
    IncomingFile::new(name, body.as_bytes().to_vec()).with_content_type("text/plain")
}
