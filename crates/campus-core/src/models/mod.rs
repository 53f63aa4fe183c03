pub mod settings;
pub mod tenant;

pub use settings::StorageSettings;
pub use tenant::TenantId;
