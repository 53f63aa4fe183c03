//! Campus storage administration tool.
//!
//! Resolves the storage configuration from the environment (STORAGE_TYPE,
//! STORAGE_PATH, REMOTE_*; `.env` is loaded if present) the same way the server
//! does when its settings store is unavailable.

use anyhow::{Context, Result};
use campus_cli::{check_delete_prefix, format_bytes, init_tracing};
use campus_core::TenantId;
use campus_storage::{StorageConfig, StorageHandle, TenantStorageService};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "campus-storage", about = "Campus object storage administration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the configured storage backend
    TestConnection,
    /// List objects under a key prefix
    List {
        /// Key prefix, e.g. tenants/T1/students/
        #[arg(default_value = "")]
        prefix: String,
        /// Output format: json or table
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Print a URL for an object
    Url {
        /// Object key
        key: String,
        /// Lifetime of a signed URL in seconds (default: 3600)
        #[arg(long)]
        expires_in: Option<u64>,
    },
    /// Delete every object under a key prefix
    DeletePrefix {
        /// Key prefix ending in '/', inside a tenant namespace
        prefix: String,
        /// Actually delete; without it only the count is reported
        #[arg(long)]
        yes: bool,
    },
    /// Storage usage of a tenant, per category
    Usage {
        /// Tenant id
        tenant: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionReport {
    source: String,
    backend: String,
    location: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let handle = StorageHandle::from_env();

    match cli.command {
        Commands::TestConnection => test_connection(&handle).await,
        Commands::List { prefix, format } => list(&handle, &prefix, &format).await,
        Commands::Url { key, expires_in } => url(&handle, &key, expires_in).await,
        Commands::DeletePrefix { prefix, yes } => delete_prefix(&handle, &prefix, yes).await,
        Commands::Usage { tenant } => usage(handle, &tenant).await,
    }
}

async fn test_connection(handle: &StorageHandle) -> Result<()> {
    let (config, source) = handle
        .resolver()
        .resolve_with_source()
        .await
        .context("Failed to resolve storage configuration")?;

    let location = match &config {
        StorageConfig::Local { path } => path.display().to_string(),
        StorageConfig::Remote(remote) => format!("{}/{}", remote.endpoint(), remote.bucket),
    };

    let result = StorageHandle::test_config(&config).await;
    let success = result.success;

    print_json(&ConnectionReport {
        source: source.to_string(),
        backend: config.backend().to_string(),
        location,
        success,
        error: result.error,
    })?;

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn list(handle: &StorageHandle, prefix: &str, format: &str) -> Result<()> {
    let storage = handle
        .get_active()
        .await
        .context("Failed to initialize storage")?;
    let objects = storage
        .list(prefix)
        .await
        .with_context(|| format!("Failed to list {:?}", prefix))?;

    match format {
        "json" => print_json(&objects)?,
        "table" => {
            for object in &objects {
                println!(
                    "{:>10}  {}  {}",
                    format_bytes(object.size),
                    object.last_modified.format("%Y-%m-%d %H:%M:%S"),
                    object.key
                );
            }
            let total: u64 = objects.iter().map(|o| o.size).sum();
            println!("{} objects, {}", objects.len(), format_bytes(total));
        }
        other => anyhow::bail!("Unknown format {:?}; use json or table", other),
    }
    Ok(())
}

async fn url(handle: &StorageHandle, key: &str, expires_in: Option<u64>) -> Result<()> {
    let storage = handle
        .get_active()
        .await
        .context("Failed to initialize storage")?;
    let url = storage
        .get_url(key, expires_in.map(Duration::from_secs))
        .await
        .with_context(|| format!("Failed to build URL for {}", key))?;
    println!("{}", url);
    Ok(())
}

async fn delete_prefix(handle: &StorageHandle, prefix: &str, yes: bool) -> Result<()> {
    check_delete_prefix(prefix)?;

    let storage = handle
        .get_active()
        .await
        .context("Failed to initialize storage")?;
    let keys: Vec<String> = storage
        .list(prefix)
        .await
        .with_context(|| format!("Failed to list {:?}", prefix))?
        .into_iter()
        .map(|object| object.key)
        .collect();

    if !yes {
        println!(
            "{} objects under {} would be deleted; re-run with --yes to delete them",
            keys.len(),
            prefix
        );
        return Ok(());
    }

    storage
        .delete_many(&keys)
        .await
        .with_context(|| format!("Failed to delete objects under {}", prefix))?;
    tracing::info!(prefix = %prefix, deleted = keys.len(), "Prefix deleted");
    println!("Deleted {} objects under {}", keys.len(), prefix);
    Ok(())
}

async fn usage(handle: StorageHandle, tenant: &str) -> Result<()> {
    let tenant = TenantId::new(tenant).context("Invalid tenant id")?;
    let service = TenantStorageService::new(handle, tenant);
    let usage = service
        .usage()
        .await
        .context("Failed to compute storage usage")?;
    print_json(&usage)
}
