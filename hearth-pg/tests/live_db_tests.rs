//! Round trips against a live PostgreSQL, configured through `HEARTH_DB_*`.
//!
//! Run with `--features db-tests`.

#![cfg(feature = "db-tests")]

use std::time::Duration;

use hearth_core::{params, Params};
use hearth_pg::{DbConfig, PgDatabase};
use hearth_storage::DatabaseAdapter;
use serde_json::json;

async fn connect() -> PgDatabase {
    let db = PgDatabase::from_config(&DbConfig::from_env()).expect("pool config");
    assert!(db.await_ready(Duration::from_secs(10)).await, "database not reachable");
    db
}

#[tokio::test]
async fn live_insert_select_update_delete() {
    let db = connect().await;
    db.raw_query(
        "CREATE TABLE IF NOT EXISTS hearth_probe (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            tags TEXT[],
            data JSONB,
            seen_at TIMESTAMPTZ
        )",
    )
    .await
    .unwrap();

    let id = db
        .insert(
            "INSERT INTO hearth_probe (name, tags, data, seen_at) VALUES (:name, :tags, :data, :seen_at)",
            &params! {
                "name" => "probe",
                "tags" => vec!["a", "b"],
                "data" => json!({"k": 1}),
                "seen_at" => "2024-03-01T12:00:00Z",
            },
        )
        .await
        .unwrap()
        .expect("generated id");

    let row = db
        .single("SELECT * FROM hearth_probe WHERE id = :id", &params! { "id" => id })
        .await
        .unwrap()
        .expect("row");
    assert_eq!(row["name"], json!("probe"));
    assert_eq!(row["tags"], json!(["a", "b"]));
    assert_eq!(row["data"], json!({"k": 1}));
    assert_eq!(row["seen_at"], json!("2024-03-01T12:00:00Z"));

    let updated = db
        .update(
            "UPDATE hearth_probe SET name = :name WHERE id = :id",
            &params! { "id" => id, "name" => "renamed" },
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let deleted = db
        .execute("DELETE FROM hearth_probe WHERE id = :id", &params! { "id" => id })
        .await
        .unwrap();
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn live_bad_sql_is_an_error_value() {
    let db = connect().await;
    let err = db.query("SELECT * FROM no_such_table", &Params::new()).await;
    assert!(err.is_err());
}
