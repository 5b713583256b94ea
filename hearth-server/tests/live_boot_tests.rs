//! Boot against a live PostgreSQL with the shipped migrations.
//!
//! Run with `--features db-tests`; connection settings come from `HEARTH_DB_*`.

#![cfg(feature = "db-tests")]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hearth_migrate::MigrationConfig;
use hearth_pg::{DbConfig, PgDatabase};
use hearth_server::{boot, BootConfig, LocalStorageClient, StorageClient, StorageRequest, StorageResponse};
use hearth_test_utils::MemoryCache;

#[tokio::test]
async fn live_boot_then_user_round_trip() {
    let db = Arc::new(PgDatabase::from_config(&DbConfig::from_env()).expect("pool config"));
    let migrations = MigrationConfig {
        dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../migrations"),
        ready_timeout: Duration::from_secs(10),
        ..Default::default()
    };

    let outcome = boot(db, Arc::new(MemoryCache::new()), &BootConfig::default(), migrations)
        .await
        .unwrap();
    assert!(outcome.is_complete(), "{:?}", outcome.migrations.error);

    let client = LocalStorageClient::new(outcome.registry);
    let license = format!("license:live-{}", std::process::id());
    client
        .call(StorageRequest::CreateUser {
            license: license.clone(),
            username: "live".into(),
            discord: None,
        })
        .await
        .unwrap();

    match client
        .call(StorageRequest::GetUser { license: license.clone() })
        .await
        .unwrap()
    {
        StorageResponse::User(Some(user)) => assert_eq!(user.license, license),
        other => panic!("unexpected response: {:?}", other),
    }
}
