//! Process boot: migrate, construct storages, register the ready ones.
//!
//! Failures are logged and reported, never raised. A failed migration run or
//! a storage that misses its deadline leaves the server partially
//! initialised; features backed by the missing storages are unavailable.

use std::sync::Arc;

use hearth_core::HearthResult;
use hearth_migrate::{MigrationConfig, MigrationRunner, RunReport};
use hearth_storage::{
    boot_storages, BootReport, CacheAdapter, CharacterStorage, DatabaseAdapter, LogStorage,
    ManagedStorage, PenaltyStorage, StorageRegistry, UserStorage,
};
use tracing::{error, info, warn};

use crate::config::BootConfig;

/// What boot achieved.
#[derive(Debug)]
pub struct BootOutcome {
    pub migrations: RunReport,
    pub storages: BootReport,
    pub registry: Arc<StorageRegistry>,
}

impl BootOutcome {
    pub fn is_complete(&self) -> bool {
        self.migrations.success && self.storages.is_complete()
    }
}

/// The four domain storages, in boot order.
pub fn domain_storages(
    db: &Arc<dyn DatabaseAdapter>,
    cache: &Arc<dyn CacheAdapter>,
) -> HearthResult<Vec<Arc<dyn ManagedStorage>>> {
    Ok(vec![
        Arc::new(UserStorage::new(db.clone(), cache.clone())?),
        Arc::new(CharacterStorage::new(db.clone(), cache.clone())?),
        Arc::new(PenaltyStorage::new(db.clone(), cache.clone())?),
        Arc::new(LogStorage::new(db.clone(), cache.clone())?),
    ])
}

pub async fn boot(
    db: Arc<dyn DatabaseAdapter>,
    cache: Arc<dyn CacheAdapter>,
    config: &BootConfig,
    migration_config: MigrationConfig,
) -> HearthResult<BootOutcome> {
    let runner = MigrationRunner::new(db.clone(), migration_config);

    let migrations = if config.renew_on_boot {
        warn!("HEARTH_RENEW_ON_BOOT set; renewing database before boot");
        match runner.renew_database().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Database renew failed; continuing with normal migrations");
                runner.run_pending().await
            }
        }
    } else {
        runner.run_pending().await
    };
    if !migrations.success {
        error!(
            executed = migrations.executed,
            halted_at = migrations.halted_at.as_deref().unwrap_or(""),
            "Migrations did not complete"
        );
    }

    let registry = Arc::new(StorageRegistry::new());
    let storages = boot_storages(
        &registry,
        domain_storages(&db, &cache)?,
        config.storage_ready_timeout,
    )
    .await;

    info!(
        migrations_executed = migrations.executed,
        storages = ?storages.registered,
        complete = migrations.success && storages.is_complete(),
        "Boot finished"
    );

    Ok(BootOutcome {
        migrations,
        storages,
        registry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_migrate::history;
    use hearth_test_utils::{MemoryCache, MockDatabase, MockMethod};
    use std::time::Duration;

    fn scripted_db() -> Arc<MockDatabase> {
        let db = Arc::new(MockDatabase::new());
        db.on_raw(history::CREATE_TABLE);
        db.on_single(history::SELECT_APPLIED, |_| None);
        db.on_execute(history::RECORD, |_| 1);
        db
    }

    fn configs(dir: &tempfile::TempDir) -> (BootConfig, MigrationConfig) {
        (
            BootConfig {
                storage_ready_timeout: Duration::from_millis(100),
                renew_on_boot: false,
            },
            MigrationConfig {
                dir: dir.path().to_path_buf(),
                ready_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_full_boot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_init.sql"), "CREATE TABLE t ();").unwrap();
        let db = scripted_db();
        db.on_raw("CREATE TABLE t ();");
        let (boot_config, migration_config) = configs(&dir);

        let outcome = boot(db, Arc::new(MemoryCache::new()), &boot_config, migration_config)
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.migrations.executed, 1);
        assert_eq!(outcome.registry.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_migration_does_not_stop_storage_boot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_init.sql"), "BROKEN").unwrap();
        let db = scripted_db();
        db.fail(MockMethod::Raw, "BROKEN", "syntax error");
        let (boot_config, migration_config) = configs(&dir);

        let outcome = boot(db, Arc::new(MemoryCache::new()), &boot_config, migration_config)
            .await
            .unwrap();

        assert!(!outcome.is_complete());
        assert!(!outcome.migrations.success);
        assert!(outcome.storages.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_outage_leaves_registry_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = scripted_db();
        let (boot_config, migration_config) = configs(&dir);

        let outcome = boot(
            db,
            Arc::new(MemoryCache::not_ready()),
            &boot_config,
            migration_config,
        )
        .await
        .unwrap();

        assert!(outcome.migrations.success);
        assert_eq!(outcome.storages.failed.as_deref(), Some("users"));
        assert!(outcome.registry.is_empty());
    }

    #[tokio::test]
    async fn test_renew_on_boot_is_refused_outside_development() {
        let dir = tempfile::tempdir().unwrap();
        let db = scripted_db();
        let (mut boot_config, migration_config) = configs(&dir);
        boot_config.renew_on_boot = true;

        let outcome = boot(db.clone(), Arc::new(MemoryCache::new()), &boot_config, migration_config)
            .await
            .unwrap();

        // Refused renew falls back to a plain run; nothing was dropped.
        assert!(outcome.migrations.success);
        assert_eq!(db.count(MockMethod::Query), 0);
    }
}
