//! Hearth Server Entry Point
//!
//! Connects to PostgreSQL and the cache, applies migrations, boots the
//! storages and serves the storage client until interrupted.

use std::sync::Arc;

use hearth_migrate::MigrationConfig;
use hearth_pg::{DbConfig, PgDatabase};
use hearth_server::{
    boot, init_tracing, BootConfig, LocalStorageClient, ServiceResult, StorageClient,
};
use hearth_storage::{CacheSettings, DatabaseAdapter};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    init_tracing()?;

    let db_config = DbConfig::from_env();
    let db: Arc<dyn DatabaseAdapter> = Arc::new(PgDatabase::from_config(&db_config)?);
    let cache = CacheSettings::from_env().build()?;

    let outcome = boot(
        db,
        cache,
        &BootConfig::from_env(),
        MigrationConfig::from_env(),
    )
    .await?;

    let client = LocalStorageClient::new(outcome.registry.clone());
    for name in [
        hearth_storage::domain::user::NAME,
        hearth_storage::domain::character::NAME,
        hearth_storage::domain::penalty::NAME,
        hearth_storage::domain::log::NAME,
    ] {
        if !client.has_storage(name) {
            tracing::warn!(storage = %name, "storage unavailable for this session");
        }
    }
    tracing::info!(
        host = %db_config.host,
        complete = outcome.is_complete(),
        "Hearth server ready"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    Ok(())
}
