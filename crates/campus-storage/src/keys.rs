//! Shared key generation for storage backends.
//!
//! Key format: `tenants/{tenant_id}/{category}/{subpath}`. Keys use `/` as the
//! separator on every platform and must not contain `..` segments, a leading `/`
//! or backslashes. Key generation is centralized here so all backends and the
//! tenant service stay consistent.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use campus_core::TenantId;
use serde::Serialize;

use crate::traits::{StorageError, StorageResult};

/// Root segment of every tenant namespace.
pub const TENANT_ROOT: &str = "tenants";

/// Top-level folders inside a tenant namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageCategory {
    Students,
    Teachers,
    Courses,
    Assignments,
    Exams,
    Library,
    Notices,
    Reports,
    Questions,
}

impl StorageCategory {
    pub const ALL: [StorageCategory; 9] = [
        StorageCategory::Students,
        StorageCategory::Teachers,
        StorageCategory::Courses,
        StorageCategory::Assignments,
        StorageCategory::Exams,
        StorageCategory::Library,
        StorageCategory::Notices,
        StorageCategory::Reports,
        StorageCategory::Questions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageCategory::Students => "students",
            StorageCategory::Teachers => "teachers",
            StorageCategory::Courses => "courses",
            StorageCategory::Assignments => "assignments",
            StorageCategory::Exams => "exams",
            StorageCategory::Library => "library",
            StorageCategory::Notices => "notices",
            StorageCategory::Reports => "reports",
            StorageCategory::Questions => "questions",
        }
    }
}

impl Display for StorageCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageCategory {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorageCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StorageError::InvalidKey(format!("Unknown storage category: {}", s)))
    }
}

/// `tenants/{tenant_id}/`
pub fn tenant_prefix(tenant_id: &TenantId) -> String {
    format!("{}/{}/", TENANT_ROOT, tenant_id)
}

/// `tenants/{tenant_id}/{category}/`
pub fn category_prefix(tenant_id: &TenantId, category: StorageCategory) -> String {
    format!("{}{}/", tenant_prefix(tenant_id), category)
}

/// Build a tenant-scoped key: `tenants/{tenant_id}/{category}/{subpath}`.
///
/// Distinct tenant ids never produce overlapping keys because a `TenantId` cannot
/// contain `/`.
pub fn build_key(
    tenant_id: &TenantId,
    category: StorageCategory,
    subpath: &str,
) -> StorageResult<String> {
    validate_key(subpath)?;
    Ok(format!("{}{}", category_prefix(tenant_id, category), subpath))
}

/// Validate a complete object key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.ends_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key must name an object, not a folder: {}",
            key
        )));
    }
    validate_prefix(key)
}

/// Validate a listing prefix. The empty prefix and a trailing `/` are allowed.
pub fn validate_prefix(prefix: &str) -> StorageResult<()> {
    if prefix.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key must be relative: {}",
            prefix
        )));
    }
    if prefix.contains('\\') || prefix.contains('\0') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    let mut segments = prefix.split('/').peekable();
    while let Some(segment) = segments.next() {
        let is_last = segments.peek().is_none();
        if segment == ".." || segment == "." || (segment.is_empty() && !is_last) {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains an invalid path segment: {}",
                prefix
            )));
        }
    }
    Ok(())
}

/// Validate a single path segment such as an entity id.
pub fn validate_segment(segment: &str) -> StorageResult<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(StorageError::InvalidKey(format!(
            "Invalid key segment: {:?}",
            segment
        )));
    }
    Ok(())
}

/// Reduce a client-supplied file name to a safe single segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lower-cased extension of a file name, if it has a plausible one.
pub fn file_extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 10 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
