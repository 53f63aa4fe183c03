//! Tenant-scoped storage operations.
//!
//! Every key this service touches lives under `tenants/{tenant_id}/`. The tenant
//! comes from the authenticated session and is fixed at construction; methods only
//! take entity ids, which are validated as single path segments.

use crate::factory::StorageHandle;
use crate::keys::{
    build_key, category_prefix, file_extension, sanitize_file_name, tenant_prefix,
    validate_segment, StorageCategory,
};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::types::{IncomingFile, UploadRequest, UploadResult};
use campus_core::TenantId;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

const PROFILE_PHOTO_NAME: &str = "profile.jpg";

/// Object count and bytes for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUsage {
    pub objects: u64,
    pub bytes: u64,
}

/// Storage consumed by one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStorageUsage {
    pub tenant_id: String,
    pub total_objects: u64,
    pub total_bytes: u64,
    pub by_category: BTreeMap<StorageCategory, CategoryUsage>,
}

#[derive(Clone)]
pub struct TenantStorageService {
    handle: StorageHandle,
    tenant: TenantId,
}

impl TenantStorageService {
    pub fn new(handle: StorageHandle, tenant: TenantId) -> Self {
        Self { handle, tenant }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Public profile photo; re-uploading replaces the previous one.
    pub async fn upload_student_photo(
        &self,
        student_id: &str,
        file: IncomingFile,
    ) -> StorageResult<UploadResult> {
        validate_segment(student_id)?;
        let subpath = format!("photos/{}/{}", student_id, PROFILE_PHOTO_NAME);
        self.store(StorageCategory::Students, &subpath, file, true)
            .await
    }

    pub async fn upload_teacher_photo(
        &self,
        teacher_id: &str,
        file: IncomingFile,
    ) -> StorageResult<UploadResult> {
        validate_segment(teacher_id)?;
        let subpath = format!("photos/{}/{}", teacher_id, PROFILE_PHOTO_NAME);
        self.store(StorageCategory::Teachers, &subpath, file, true)
            .await
    }

    /// Private student document named after its type, e.g. `birth_certificate.pdf`.
    pub async fn upload_student_document(
        &self,
        student_id: &str,
        document_type: &str,
        file: IncomingFile,
    ) -> StorageResult<UploadResult> {
        validate_segment(student_id)?;
        validate_segment(document_type)?;
        let extension = file_extension(&file.file_name).unwrap_or_else(|| "bin".to_string());
        let subpath = format!(
            "documents/{}/{}.{}",
            student_id, document_type, extension
        );
        self.store(StorageCategory::Students, &subpath, file, false)
            .await
    }

    /// Private assignment submission. Each version gets its own object so earlier
    /// submissions stay available.
    pub async fn upload_submission(
        &self,
        assignment_id: &str,
        student_id: &str,
        version: u32,
        file: IncomingFile,
    ) -> StorageResult<UploadResult> {
        validate_segment(assignment_id)?;
        validate_segment(student_id)?;
        if version == 0 {
            return Err(StorageError::InvalidKey(
                "Submission versions start at 1".to_string(),
            ));
        }
        let extension = file_extension(&file.file_name).unwrap_or_else(|| "bin".to_string());
        let subpath = format!(
            "{}/submissions/{}/submission_v{}.{}",
            assignment_id, student_id, version, extension
        );
        self.store(StorageCategory::Assignments, &subpath, file, false)
            .await
    }

    pub async fn upload_course_material(
        &self,
        course_id: &str,
        file: IncomingFile,
    ) -> StorageResult<UploadResult> {
        validate_segment(course_id)?;
        let subpath = format!(
            "{}/materials/{}_{}",
            course_id,
            timestamp(),
            sanitize_file_name(&file.file_name)
        );
        self.store(StorageCategory::Courses, &subpath, file, false)
            .await
    }

    pub async fn upload_question_image(
        &self,
        question_id: &str,
        file: IncomingFile,
    ) -> StorageResult<UploadResult> {
        validate_segment(question_id)?;
        let extension = file_extension(&file.file_name).unwrap_or_else(|| "png".to_string());
        let subpath = format!(
            "{}/{}_{}.{}",
            question_id,
            timestamp(),
            short_id(),
            extension
        );
        self.store(StorageCategory::Questions, &subpath, file, false)
            .await
    }

    /// Generated report, e.g. `report_type = "attendance"`.
    pub async fn upload_report(
        &self,
        report_type: &str,
        file: IncomingFile,
    ) -> StorageResult<UploadResult> {
        validate_segment(report_type)?;
        let subpath = format!(
            "{}/{}_{}",
            report_type,
            timestamp(),
            sanitize_file_name(&file.file_name)
        );
        self.store(StorageCategory::Reports, &subpath, file, false)
            .await
    }

    /// Delete a student's photo and documents. Returns the number of objects removed.
    pub async fn delete_student_files(&self, student_id: &str) -> StorageResult<usize> {
        validate_segment(student_id)?;
        let storage = self.handle.get_active().await?;
        let students = category_prefix(&self.tenant, StorageCategory::Students);

        let mut deleted = 0;
        for folder in ["photos", "documents"] {
            let prefix = format!("{}{}/{}/", students, folder, student_id);
            deleted += self.delete_by_prefix(storage.as_ref(), &prefix).await?;
        }
        Ok(deleted)
    }

    pub async fn delete_teacher_files(&self, teacher_id: &str) -> StorageResult<usize> {
        validate_segment(teacher_id)?;
        let prefix = format!(
            "{}photos/{}/",
            category_prefix(&self.tenant, StorageCategory::Teachers),
            teacher_id
        );
        let storage = self.handle.get_active().await?;
        self.delete_by_prefix(storage.as_ref(), &prefix).await
    }

    pub async fn delete_assignment_files(&self, assignment_id: &str) -> StorageResult<usize> {
        self.delete_entity(StorageCategory::Assignments, assignment_id)
            .await
    }

    pub async fn delete_course_files(&self, course_id: &str) -> StorageResult<usize> {
        self.delete_entity(StorageCategory::Courses, course_id).await
    }

    pub async fn delete_question_files(&self, question_id: &str) -> StorageResult<usize> {
        self.delete_entity(StorageCategory::Questions, question_id)
            .await
    }

    /// URL for one of this tenant's objects.
    pub async fn file_url(&self, key: &str, expires_in: Option<Duration>) -> StorageResult<String> {
        self.ensure_owned(key)?;
        let storage = self.handle.get_active().await?;
        storage.get_url(key, expires_in).await
    }

    pub async fn download_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.ensure_owned(key)?;
        let storage = self.handle.get_active().await?;
        storage.download(key).await
    }

    pub async fn delete_file(&self, key: &str) -> StorageResult<()> {
        self.ensure_owned(key)?;
        let storage = self.handle.get_active().await?;
        storage.delete(key).await
    }

    /// Object count and bytes per category, from a single listing of the tenant.
    pub async fn usage(&self) -> StorageResult<TenantStorageUsage> {
        let storage = self.handle.get_active().await?;
        let root = tenant_prefix(&self.tenant);
        let objects = storage.list(&root).await?;

        let mut usage = TenantStorageUsage {
            tenant_id: self.tenant.to_string(),
            ..Default::default()
        };

        for object in &objects {
            usage.total_objects += 1;
            usage.total_bytes += object.size;

            let category = object
                .key
                .strip_prefix(&root)
                .and_then(|rest| rest.split('/').next())
                .and_then(|segment| segment.parse::<StorageCategory>().ok());
            if let Some(category) = category {
                let entry = usage.by_category.entry(category).or_default();
                entry.objects += 1;
                entry.bytes += object.size;
            }
        }

        Ok(usage)
    }

    async fn store(
        &self,
        category: StorageCategory,
        subpath: &str,
        file: IncomingFile,
        is_public: bool,
    ) -> StorageResult<UploadResult> {
        let key = build_key(&self.tenant, category, subpath)?;

        let mut request = UploadRequest::new(key, file.data)
            .with_metadata("tenantId", self.tenant.as_str())
            .with_metadata("originalName", sanitize_file_name(&file.file_name));
        if let Some(content_type) = file.content_type {
            request = request.with_content_type(content_type);
        }
        if is_public {
            request = request.public();
        }

        let storage = self.handle.get_active().await?;
        let result = storage.upload(request).await?;

        tracing::info!(
            tenant_id = %self.tenant,
            category = %category,
            key = %result.key,
            size_bytes = result.size,
            public = is_public,
            "Tenant file stored"
        );

        Ok(result)
    }

    async fn delete_entity(
        &self,
        category: StorageCategory,
        entity_id: &str,
    ) -> StorageResult<usize> {
        validate_segment(entity_id)?;
        let prefix = format!("{}{}/", category_prefix(&self.tenant, category), entity_id);
        let storage = self.handle.get_active().await?;
        self.delete_by_prefix(storage.as_ref(), &prefix).await
    }

    /// Cascade delete: list everything under `prefix`, then delete it in bulk.
    async fn delete_by_prefix(&self, storage: &dyn Storage, prefix: &str) -> StorageResult<usize> {
        let keys: Vec<String> = storage
            .list(prefix)
            .await?
            .into_iter()
            .map(|object| object.key)
            .collect();

        if !keys.is_empty() {
            storage.delete_many(&keys).await?;
        }

        tracing::info!(
            tenant_id = %self.tenant,
            prefix = %prefix,
            deleted = keys.len(),
            "Cascade delete completed"
        );

        Ok(keys.len())
    }

    fn ensure_owned(&self, key: &str) -> StorageResult<()> {
        if key.starts_with(&tenant_prefix(&self.tenant)) {
            Ok(())
        } else {
            Err(StorageError::InvalidKey(format!(
                "Key is outside tenant {}: {}",
                self.tenant, key
            )))
        }
    }
}

impl std::fmt::Debug for TenantStorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantStorageService")
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

fn timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

/// Eight hex characters separating uploads that share a millisecond.
fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::resolver::ConfigResolver;
    use crate::LocalStorage;
    use campus_core::{NoSettingsStore, StorageEnv};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn service(dir: &TempDir, tenant: &str) -> TenantStorageService {
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let handle = StorageHandle::with_active(
            ConfigResolver::new(Arc::new(NoSettingsStore), StorageEnv::default()),
            Arc::new(storage),
        );
        TenantStorageService::new(handle, TenantId::new(tenant).unwrap())
    }

    fn jpeg() -> IncomingFile {
        IncomingFile::new("me.JPG", b"\xff\xd8jpeg".to_vec()).with_content_type("image/jpeg")
    }

    #[tokio::test]
    async fn student_photo_lands_at_fixed_public_key() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "T1").await;

        let result = service.upload_student_photo("S1", jpeg()).await.unwrap();

        assert_eq!(result.key, "tenants/T1/students/photos/S1/profile.jpg");
        assert_eq!(
            result.url,
            "/api/storage/tenants/T1/students/photos/S1/profile.jpg"
        );
        assert!(dir
            .path()
            .join("tenants/T1/students/photos/S1/profile.jpg")
            .is_file());
    }

    #[tokio::test]
    async fn key_layouts() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "T1").await;

        let doc = service
            .upload_student_document(
                "S1",
                "birth_certificate",
                IncomingFile::new("scan.PDF", b"%PDF".to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(doc.key, "tenants/T1/students/documents/S1/birth_certificate.pdf");

        let submission = service
            .upload_submission("A1", "S1", 2, IncomingFile::new("essay.docx", b"doc".to_vec()))
            .await
            .unwrap();
        assert_eq!(
            submission.key,
            "tenants/T1/assignments/A1/submissions/S1/submission_v2.docx"
        );

        let material = service
            .upload_course_material("C1", IncomingFile::new("Week 1 notes.pdf", b"n".to_vec()))
            .await
            .unwrap();
        assert!(material.key.starts_with("tenants/T1/courses/C1/materials/"));
        assert!(material.key.ends_with("_Week_1_notes.pdf"));

        let image = service
            .upload_question_image("Q1", IncomingFile::new("diagram", b"png".to_vec()))
            .await
            .unwrap();
        assert!(image.key.starts_with("tenants/T1/questions/Q1/"));
        assert!(image.key.ends_with(".png"));

        let report = service
            .upload_report("attendance", IncomingFile::new("march.csv", b"a,b".to_vec()))
            .await
            .unwrap();
        assert!(report.key.starts_with("tenants/T1/reports/attendance/"));
        assert!(report.key.ends_with("_march.csv"));
    }

    #[tokio::test]
    async fn question_images_uploaded_together_get_distinct_keys() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "T1").await;

        let mut keys = Vec::new();
        for _ in 0..5 {
            let image = service
                .upload_question_image("Q1", IncomingFile::new("figure.png", b"img".to_vec()))
                .await
                .unwrap();
            keys.push(image.key);
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 5);

        let storage = service.handle.get_active().await.unwrap();
        let listed = storage.list("tenants/T1/questions/Q1/").await.unwrap();
        assert_eq!(listed.len(), 5);
    }

    #[tokio::test]
    async fn rejects_forged_entity_ids() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "T1").await;

        for bad in ["..", "../T2", "a/b", ""] {
            assert!(matches!(
                service.upload_student_photo(bad, jpeg()).await,
                Err(StorageError::InvalidKey(_))
            ));
        }
        assert!(service
            .upload_submission("A1", "S1", 0, jpeg())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn student_cascade_delete_leaves_similar_ids_alone() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "T1").await;

        service.upload_student_photo("S1", jpeg()).await.unwrap();
        service
            .upload_student_document(
                "S1",
                "transcript",
                IncomingFile::new("t.pdf", b"t".to_vec()),
            )
            .await
            .unwrap();
        service.upload_student_photo("S10", jpeg()).await.unwrap();

        assert_eq!(service.delete_student_files("S1").await.unwrap(), 2);
        assert_eq!(service.delete_student_files("S1").await.unwrap(), 0);

        let usage = service.usage().await.unwrap();
        assert_eq!(usage.total_objects, 1);
        assert!(dir
            .path()
            .join("tenants/T1/students/photos/S10/profile.jpg")
            .is_file());
    }

    #[tokio::test]
    async fn file_access_is_confined_to_the_tenant() {
        let dir = TempDir::new().unwrap();
        let t1 = service(&dir, "T1").await;
        let t2 = service(&dir, "T2").await;

        let photo = t2.upload_student_photo("S1", jpeg()).await.unwrap();

        assert!(matches!(
            t1.file_url(&photo.key, None).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            t1.delete_file(&photo.key).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(t2.file_url(&photo.key, None).await.is_ok());
        assert_eq!(t2.download_file(&photo.key).await.unwrap(), b"\xff\xd8jpeg");
    }

    #[tokio::test]
    async fn usage_groups_by_category() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, "T1").await;

        service.upload_student_photo("S1", jpeg()).await.unwrap();
        service.upload_teacher_photo("P1", jpeg()).await.unwrap();
        service
            .upload_course_material("C1", IncomingFile::new("a.txt", b"12345".to_vec()))
            .await
            .unwrap();

        let usage = service.usage().await.unwrap();
        assert_eq!(usage.tenant_id, "T1");
        assert_eq!(usage.total_objects, 3);
        assert_eq!(usage.total_bytes, 6 + 6 + 5);
        assert_eq!(
            usage.by_category.get(&StorageCategory::Courses),
            Some(&CategoryUsage { objects: 1, bytes: 5 })
        );
        assert!(!usage.by_category.contains_key(&StorageCategory::Exams));

        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["totalObjects"], 3);
        assert_eq!(json["byCategory"]["courses"]["bytes"], 5);
    }
}
