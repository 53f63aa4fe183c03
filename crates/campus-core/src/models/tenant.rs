use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identifier of an isolated school (tenant).
///
/// Tenant ids become a path segment of every storage key, so construction rejects
/// anything that could escape or alias another tenant's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self, AppError> {
        let id = id.into();

        if id.is_empty() {
            return Err(AppError::InvalidInput("Tenant id must not be empty".to_string()));
        }
        if id == "." || id.contains("..") {
            return Err(AppError::InvalidInput(format!(
                "Tenant id contains a relative path component: {}",
                id
            )));
        }
        if id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
        {
            return Err(AppError::InvalidInput(format!(
                "Tenant id contains invalid characters: {}",
                id
            )));
        }

        Ok(TenantId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TenantId::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}
