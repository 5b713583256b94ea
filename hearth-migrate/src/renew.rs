//! Destructive database renew for development environments.
//!
//! Drops every table, view, enum type and function in the managed schemas,
//! checks that nothing survived, then replays all migrations from empty.
//! Irreversible. Refused unless [`MigrationConfig::renew_allowed`] holds.
//!
//! [`MigrationConfig::renew_allowed`]: crate::MigrationConfig::renew_allowed

use hearth_core::{params, row_str, ConfigError, HearthResult, MigrationError, Row};
use tracing::warn;

use crate::runner::{MigrationRunner, RunReport};

const LIST_TABLES: &str =
    "SELECT tablename::text AS name FROM pg_tables WHERE schemaname = :schema";

const LIST_VIEWS: &str = "SELECT viewname::text AS name FROM pg_views WHERE schemaname = :schema";

const LIST_ENUMS: &str = "SELECT t.typname::text AS name FROM pg_type t \
     JOIN pg_namespace n ON n.oid = t.typnamespace \
     WHERE t.typtype = 'e' AND n.nspname = :schema";

// Extension-owned functions are left to their extension.
const LIST_FUNCTIONS: &str = "SELECT p.proname::text AS name, \
     pg_get_function_identity_arguments(p.oid) AS args FROM pg_proc p \
     JOIN pg_namespace n ON n.oid = p.pronamespace \
     WHERE p.prokind = 'f' AND n.nspname = :schema \
     AND NOT EXISTS (SELECT 1 FROM pg_depend d WHERE d.objid = p.oid AND d.deptype = 'e')";

/// Quote an identifier for interpolation into DDL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl MigrationRunner {
    /// Wipe the managed schemas and rerun every migration.
    pub async fn renew_database(&self) -> HearthResult<RunReport> {
        if !self.config.renew_allowed() {
            warn!(
                environment = %self.config.environment,
                "Database renew refused: requires a development environment and HEARTH_ALLOW_DB_RENEW=true"
            );
            return Err(ConfigError::RenewDisabled.into());
        }
        if !self.db.await_ready(self.config.ready_timeout).await {
            return Err(MigrationError::NotReady.into());
        }

        warn!(schemas = ?self.config.managed_schemas, "RENEWING DATABASE: all data will be destroyed");

        for schema in &self.config.managed_schemas {
            let s = quote_ident(schema);

            let tables = self.list(LIST_TABLES, schema).await?;
            warn!(schema = %schema, count = tables.len(), "Dropping tables");
            for row in &tables {
                self.drop_named("TABLE", &s, row).await?;
            }

            let views = self.list(LIST_VIEWS, schema).await?;
            warn!(schema = %schema, count = views.len(), "Dropping views");
            for row in &views {
                self.drop_named("VIEW", &s, row).await?;
            }

            let enums = self.list(LIST_ENUMS, schema).await?;
            warn!(schema = %schema, count = enums.len(), "Dropping enum types");
            for row in &enums {
                self.drop_named("TYPE", &s, row).await?;
            }

            let functions = self.list(LIST_FUNCTIONS, schema).await?;
            warn!(schema = %schema, count = functions.len(), "Dropping functions");
            for row in &functions {
                let Some(name) = row_str(row, "name") else {
                    continue;
                };
                let args = row_str(row, "args").unwrap_or_default();
                self.db
                    .raw_query(&format!(
                        "DROP FUNCTION IF EXISTS {}.{}({}) CASCADE",
                        s,
                        quote_ident(&name),
                        args
                    ))
                    .await?;
            }
        }

        let mut survivors = Vec::new();
        for schema in &self.config.managed_schemas {
            for row in self.list(LIST_TABLES, schema).await? {
                if let Some(name) = row_str(&row, "name") {
                    survivors.push(format!("{}.{}", schema, name));
                }
            }
        }
        if !survivors.is_empty() {
            tracing::error!(survivors = ?survivors, "Tables survived database renew");
            return Err(MigrationError::RenewVerification { survivors }.into());
        }

        for schema in &self.config.managed_schemas {
            warn!(schema = %schema, "Recreating schema");
            self.db
                .raw_query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
                .await?;
        }

        warn!("Database emptied; replaying migrations");
        Ok(self.run_pending().await)
    }

    async fn list(&self, query: &str, schema: &str) -> HearthResult<Vec<Row>> {
        self.db.query(query, &params! { "schema" => schema }).await
    }

    async fn drop_named(&self, kind: &str, schema: &str, row: &Row) -> HearthResult<()> {
        let Some(name) = row_str(row, "name") else {
            return Ok(());
        };
        self.db
            .raw_query(&format!(
                "DROP {} IF EXISTS {}.{} CASCADE",
                kind,
                schema,
                quote_ident(&name)
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;
    use crate::runner::tests::{raw_calls, scripted_history, write};
    use hearth_core::HearthError;
    use hearth_storage::MockDatabase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn renew_config(dir: &std::path::Path) -> MigrationConfig {
        MigrationConfig {
            dir: dir.to_path_buf(),
            ready_timeout: Duration::from_millis(200),
            environment: "development".into(),
            allow_renew: true,
            ..Default::default()
        }
    }

    fn named(name: &str) -> Row {
        params! { "name" => name }
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_renew_refused_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(MockDatabase::new());
        let runner = MigrationRunner::new(
            db.clone(),
            MigrationConfig {
                dir: dir.path().to_path_buf(),
                ..Default::default()
            },
        );

        let err = runner.renew_database().await.unwrap_err();
        assert_eq!(err, HearthError::Config(ConfigError::RenewDisabled));
        assert_eq!(db.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_renew_drops_everything_then_replays() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_users.sql", "CREATE TABLE users ();");

        let db = Arc::new(MockDatabase::new());
        scripted_history(&db);

        let listed = Arc::new(AtomicUsize::new(0));
        let counter = listed.clone();
        db.on_query(LIST_TABLES, move |_| {
            // Present before the drop, gone when verified.
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                vec![named("users"), named("schema_migrations")]
            } else {
                Vec::new()
            }
        });
        db.on_query(LIST_VIEWS, |_| vec![named("active_bans")]);
        db.on_query(LIST_ENUMS, |_| vec![named("penalty_kind")]);
        db.on_query(LIST_FUNCTIONS, |_| {
            vec![params! { "name" => "touch", "args" => "integer, text" }]
        });

        db.on_raw("DROP TABLE IF EXISTS \"public\".\"users\" CASCADE");
        db.on_raw("DROP TABLE IF EXISTS \"public\".\"schema_migrations\" CASCADE");
        db.on_raw("DROP VIEW IF EXISTS \"public\".\"active_bans\" CASCADE");
        db.on_raw("DROP TYPE IF EXISTS \"public\".\"penalty_kind\" CASCADE");
        db.on_raw("DROP FUNCTION IF EXISTS \"public\".\"touch\"(integer, text) CASCADE");
        db.on_raw("CREATE SCHEMA IF NOT EXISTS \"public\"");
        db.on_raw("CREATE TABLE users ();");

        let runner = MigrationRunner::new(db.clone(), renew_config(dir.path()));
        let report = runner.renew_database().await.unwrap();

        assert!(report.success);
        assert_eq!(report.executed, 1);
        let calls = raw_calls(&db);
        assert_eq!(
            calls,
            vec![
                "DROP TABLE IF EXISTS \"public\".\"users\" CASCADE",
                "DROP TABLE IF EXISTS \"public\".\"schema_migrations\" CASCADE",
                "DROP VIEW IF EXISTS \"public\".\"active_bans\" CASCADE",
                "DROP TYPE IF EXISTS \"public\".\"penalty_kind\" CASCADE",
                "DROP FUNCTION IF EXISTS \"public\".\"touch\"(integer, text) CASCADE",
                "CREATE SCHEMA IF NOT EXISTS \"public\"",
                "CREATE TABLE users ();",
            ]
        );
        assert_eq!(listed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_renew_reports_surviving_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(MockDatabase::new());
        db.on_query(LIST_TABLES, |_| vec![named("stubborn")]);
        db.on_query(LIST_VIEWS, |_| Vec::new());
        db.on_query(LIST_ENUMS, |_| Vec::new());
        db.on_query(LIST_FUNCTIONS, |_| Vec::new());
        db.on_raw("DROP TABLE IF EXISTS \"public\".\"stubborn\" CASCADE");

        let runner = MigrationRunner::new(db.clone(), renew_config(dir.path()));
        let err = runner.renew_database().await.unwrap_err();
        assert_eq!(
            err,
            HearthError::Migration(MigrationError::RenewVerification {
                survivors: vec!["public.stubborn".to_string()],
            })
        );
        assert!(!raw_calls(&db).iter().any(|c| c.starts_with("CREATE SCHEMA")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_waits_for_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(MockDatabase::new());
        db.set_ready(false);

        let runner = MigrationRunner::new(db.clone(), renew_config(dir.path()));
        let err = runner.renew_database().await.unwrap_err();
        assert_eq!(err, HearthError::Migration(MigrationError::NotReady));
        assert_eq!(db.total_calls(), 0);
    }
}
