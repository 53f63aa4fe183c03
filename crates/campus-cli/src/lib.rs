use anyhow::{bail, Result};

/// Human-readable byte count using 1024-based units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Reject prefixes a bulk delete must never run against.
///
/// The prefix has to end at a folder boundary so `tenants/T1/` cannot also match
/// `tenants/T10/`, and it has to stay inside a tenant namespace.
pub fn check_delete_prefix(prefix: &str) -> Result<()> {
    if !prefix.ends_with('/') {
        bail!("Prefix must end with '/': {}", prefix);
    }

    let mut segments = prefix.trim_end_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("tenants"), Some(tenant)) if !tenant.is_empty() => Ok(()),
        _ => bail!("Prefix must start with tenants/<tenant_id>/: {}", prefix),
    }
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_small() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn format_bytes_scaled() {
        assert_eq!(format_bytes(1024), "1.0 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn delete_prefix_must_end_at_folder_boundary() {
        assert!(check_delete_prefix("tenants/T1").is_err());
        assert!(check_delete_prefix("tenants/T1/courses/C1").is_err());
        assert!(check_delete_prefix("tenants/T1/").is_ok());
        assert!(check_delete_prefix("tenants/T1/courses/C1/").is_ok());
    }

    #[test]
    fn delete_prefix_must_name_a_tenant() {
        assert!(check_delete_prefix("").is_err());
        assert!(check_delete_prefix("/").is_err());
        assert!(check_delete_prefix("tenants/").is_err());
        assert!(check_delete_prefix("uploads/").is_err());
    }
}
