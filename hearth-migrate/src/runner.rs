//! Sequential, fail-fast migration runner.
//!
//! Each discovered file moves through
//! `Discovered -> AlreadyApplied | ChecksumMismatch | Executing -> Recorded`.
//! Execution failures are recorded in the history table and reported in the
//! [`RunReport`]; they are never returned as errors.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hearth_core::{params, HearthError, HearthResult, MigrationError};
use hearth_storage::domain::{decode_all, decode_opt};
use hearth_storage::DatabaseAdapter;
use tracing::{error, info, warn};

use crate::checksum::checksum;
use crate::config::MigrationConfig;
use crate::discovery::{discover, MigrationFile};
use crate::history::{self, MigrationRecord};

/// What happened to one migration during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    AlreadyApplied,
    Applied { execution_time_ms: i64 },
    Failed { error: String },
    /// The file changed since it was applied. Nothing was executed.
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    pub version: String,
    pub name: String,
    pub outcome: MigrationOutcome,
}

/// Summary of [`MigrationRunner::run_pending`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Migrations executed successfully in this run.
    pub executed: usize,
    pub success: bool,
    pub outcomes: Vec<MigrationResult>,
    /// Version that stopped the run, if one did.
    pub halted_at: Option<String>,
    pub error: Option<HearthError>,
}

impl RunReport {
    fn aborted(error: HearthError) -> Self {
        Self {
            executed: 0,
            success: false,
            outcomes: Vec::new(),
            halted_at: None,
            error: Some(error),
        }
    }

    fn halt(&mut self, file: &MigrationFile, outcome: MigrationOutcome, error: HearthError) {
        self.push(file, outcome);
        self.success = false;
        self.halted_at = Some(file.version.clone());
        self.error = Some(error);
    }

    fn push(&mut self, file: &MigrationFile, outcome: MigrationOutcome) {
        self.outcomes.push(MigrationResult {
            version: file.version.clone(),
            name: file.name.clone(),
            outcome,
        });
    }
}

/// State of a discovered migration relative to the history table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applied,
    ChecksumMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    pub checksum: String,
    pub state: MigrationState,
}

/// Applies migration files from [`MigrationConfig::dir`] in version order.
pub struct MigrationRunner {
    pub(crate) db: Arc<dyn DatabaseAdapter>,
    pub(crate) config: MigrationConfig,
}

impl MigrationRunner {
    pub fn new(db: Arc<dyn DatabaseAdapter>, config: MigrationConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Apply every pending migration, stopping at the first failure.
    pub async fn run_pending(&self) -> RunReport {
        if !self.db.await_ready(self.config.ready_timeout).await {
            error!(
                timeout_ms = self.config.ready_timeout.as_millis() as u64,
                "Database not ready; no migrations were run"
            );
            return RunReport::aborted(MigrationError::NotReady.into());
        }

        if let Err(e) = self.ensure_history_table().await {
            error!(error = %e, "Could not create migration history table");
            return RunReport::aborted(e);
        }

        let files = match discover(&self.config.dir) {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "Migration discovery failed");
                return RunReport::aborted(e);
            }
        };

        let mut report = RunReport {
            executed: 0,
            success: true,
            outcomes: Vec::with_capacity(files.len()),
            halted_at: None,
            error: None,
        };

        for file in &files {
            let sql = match file.read_sql() {
                Ok(sql) => sql,
                Err(e) => {
                    error!(version = %file.version, error = %e, "Could not read migration");
                    report.halt(file, MigrationOutcome::Failed { error: e.to_string() }, e);
                    break;
                }
            };
            let actual = checksum(sql.as_bytes());

            match self.applied_record(&file.version).await {
                Ok(Some(record)) if record.checksum == actual => {
                    report.push(file, MigrationOutcome::AlreadyApplied);
                    continue;
                }
                Ok(Some(record)) => {
                    error!(
                        version = %file.version,
                        file = %file.filename,
                        expected = %record.checksum,
                        actual = %actual,
                        "CHECKSUM MISMATCH: applied migration was modified; refusing to continue"
                    );
                    let err = MigrationError::ChecksumMismatch {
                        version: file.version.clone(),
                        expected: record.checksum.clone(),
                        actual: actual.clone(),
                    };
                    report.halt(
                        file,
                        MigrationOutcome::ChecksumMismatch {
                            expected: record.checksum,
                            actual,
                        },
                        err.into(),
                    );
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(version = %file.version, error = %e, "Could not read migration history");
                    report.halt(file, MigrationOutcome::Failed { error: e.to_string() }, e);
                    break;
                }
            }

            let started = Instant::now();
            let result = self.db.raw_query(&sql).await;
            let elapsed_ms = started.elapsed().as_millis() as i64;
            let failure = result.err().map(|e| e.to_string());

            if let Err(e) = self
                .record(file, &actual, elapsed_ms, failure.as_deref())
                .await
            {
                error!(version = %file.version, error = %e, "Could not record migration outcome");
                let err = MigrationError::HistoryTable {
                    reason: e.to_string(),
                };
                report.halt(file, MigrationOutcome::Failed { error: e.to_string() }, err.into());
                break;
            }

            match failure {
                None => {
                    info!(
                        version = %file.version,
                        name = %file.name,
                        execution_time_ms = elapsed_ms,
                        "Migration applied"
                    );
                    report.executed += 1;
                    report.push(
                        file,
                        MigrationOutcome::Applied {
                            execution_time_ms: elapsed_ms,
                        },
                    );
                }
                Some(reason) => {
                    error!(version = %file.version, name = %file.name, error = %reason, "Migration failed");
                    let err = MigrationError::Execution {
                        version: file.version.clone(),
                        reason: reason.clone(),
                    };
                    report.halt(file, MigrationOutcome::Failed { error: reason }, err.into());
                    break;
                }
            }
        }

        if report.success {
            info!(executed = report.executed, total = files.len(), "Migrations complete");
        } else {
            warn!(
                executed = report.executed,
                halted_at = report.halted_at.as_deref().unwrap_or(""),
                "Migration run halted"
            );
        }
        report
    }

    /// Every discovered migration with its state against the history table.
    pub async fn status(&self) -> HearthResult<Vec<MigrationStatus>> {
        self.ensure_history_table().await?;
        let mut statuses = Vec::new();
        for file in discover(&self.config.dir)? {
            let sum = checksum(file.read_sql()?.as_bytes());
            let state = match self.applied_record(&file.version).await? {
                None => MigrationState::Pending,
                Some(record) if record.checksum == sum => MigrationState::Applied,
                Some(_) => MigrationState::ChecksumMismatch,
            };
            statuses.push(MigrationStatus {
                version: file.version,
                name: file.name,
                checksum: sum,
                state,
            });
        }
        Ok(statuses)
    }

    /// Every row of the history table, oldest first.
    pub async fn history(&self) -> HearthResult<Vec<MigrationRecord>> {
        self.ensure_history_table().await?;
        decode_all(self.db.query(history::SELECT_ALL, &params! {}).await?)
    }

    async fn ensure_history_table(&self) -> HearthResult<()> {
        self.db
            .raw_query(history::CREATE_TABLE)
            .await
            .map_err(|e| {
                MigrationError::HistoryTable {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    async fn applied_record(&self, version: &str) -> HearthResult<Option<MigrationRecord>> {
        let row = self
            .db
            .single(history::SELECT_APPLIED, &params! { "version" => version })
            .await?;
        decode_opt(row)
    }

    async fn record(
        &self,
        file: &MigrationFile,
        checksum: &str,
        execution_time_ms: i64,
        error_message: Option<&str>,
    ) -> HearthResult<()> {
        self.db
            .execute(
                history::RECORD,
                &params! {
                    "version" => file.version,
                    "name" => file.name,
                    "checksum" => checksum,
                    "executed_at" => Utc::now(),
                    "execution_time_ms" => execution_time_ms,
                    "success" => error_message.is_none(),
                    "error_message" => error_message,
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hearth_core::Row;
    use hearth_storage::mock::normalize_query;
    use hearth_storage::{MockDatabase, MockMethod};
    use serde_json::{json, Value as JsonValue};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// History table kept in memory with the same upsert rule as the SQL.
    pub(crate) fn scripted_history(db: &MockDatabase) -> Arc<Mutex<Vec<Row>>> {
        let rows: Arc<Mutex<Vec<Row>>> = Arc::new(Mutex::new(Vec::new()));
        db.on_raw(history::CREATE_TABLE);

        let table = rows.clone();
        db.on_single(history::SELECT_APPLIED, move |params| {
            table
                .lock()
                .unwrap()
                .iter()
                .find(|row| row["version"] == params["version"] && row["success"] == json!(true))
                .cloned()
        });

        let table = rows.clone();
        db.on_query(history::SELECT_ALL, move |_| table.lock().unwrap().clone());

        let table = rows.clone();
        db.on_execute(history::RECORD, move |params| {
            let mut rows = table.lock().unwrap();
            match rows.iter_mut().find(|row| row["version"] == params["version"]) {
                Some(existing) if existing["success"] == json!(true) => 0,
                Some(existing) => {
                    *existing = params.clone();
                    1
                }
                None => {
                    rows.push(params.clone());
                    1
                }
            }
        });
        rows
    }

    pub(crate) fn write(dir: &Path, filename: &str, sql: &str) {
        std::fs::write(dir.join(filename), sql).unwrap();
    }

    pub(crate) fn runner(db: Arc<MockDatabase>, dir: &TempDir) -> MigrationRunner {
        MigrationRunner::new(
            db,
            MigrationConfig {
                dir: dir.path().to_path_buf(),
                ready_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    /// Raw statements issued, minus the history table bootstrap.
    pub(crate) fn raw_calls(db: &MockDatabase) -> Vec<String> {
        let bootstrap = normalize_query(history::CREATE_TABLE);
        db.calls()
            .into_iter()
            .filter(|c| c.method == MockMethod::Raw && c.query != bootstrap)
            .map(|c| c.query)
            .collect()
    }

    fn rows_for<'a>(rows: &'a [Row], version: &str) -> Vec<&'a Row> {
        rows.iter().filter(|r| r["version"] == json!(version)).collect()
    }

    #[tokio::test]
    async fn test_runs_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "010_c.sql", "CREATE TABLE c ();");
        write(dir.path(), "002_b.sql", "CREATE TABLE b ();");
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");

        let db = Arc::new(MockDatabase::new());
        let rows = scripted_history(&db);
        for sql in ["CREATE TABLE a ();", "CREATE TABLE b ();", "CREATE TABLE c ();"] {
            db.on_raw(sql);
        }

        let report = runner(db.clone(), &dir).run_pending().await;
        assert!(report.success);
        assert_eq!(report.executed, 3);
        assert_eq!(
            raw_calls(&db),
            vec!["CREATE TABLE a ();", "CREATE TABLE b ();", "CREATE TABLE c ();"]
        );

        let rows = rows.lock().unwrap();
        let versions: Vec<_> = rows.iter().map(|r| r["version"].clone()).collect();
        assert_eq!(versions, vec![json!("001"), json!("002"), json!("010")]);
        assert!(rows.iter().all(|r| r["checksum"].as_str().unwrap().len() == 64));
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");
        write(dir.path(), "002_b.sql", "CREATE TABLE b ();");

        let db = Arc::new(MockDatabase::new());
        let rows = scripted_history(&db);
        db.on_raw("CREATE TABLE a ();");
        db.on_raw("CREATE TABLE b ();");
        let runner = runner(db.clone(), &dir);

        assert_eq!(runner.run_pending().await.executed, 2);
        db.reset_calls();

        let second = runner.run_pending().await;
        assert!(second.success);
        assert_eq!(second.executed, 0);
        assert!(second
            .outcomes
            .iter()
            .all(|o| o.outcome == MigrationOutcome::AlreadyApplied));
        assert!(raw_calls(&db).is_empty());

        let rows = rows.lock().unwrap();
        for version in ["001", "002"] {
            let matching = rows_for(&rows, version);
            assert_eq!(matching.len(), 1);
            assert_eq!(matching[0]["success"], json!(true));
        }
    }

    #[tokio::test]
    async fn test_modified_migration_aborts_with_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");
        write(dir.path(), "002_b.sql", "CREATE TABLE b ();");

        let db = Arc::new(MockDatabase::new());
        let rows = scripted_history(&db);
        db.on_raw("CREATE TABLE a ();");
        db.on_raw("CREATE TABLE b ();");
        db.on_raw("CREATE TABLE a (id INT);");
        let runner = runner(db.clone(), &dir);
        assert!(runner.run_pending().await.success);

        write(dir.path(), "001_a.sql", "CREATE TABLE a (id INT);");
        db.reset_calls();
        let report = runner.run_pending().await;

        assert!(!report.success);
        assert_eq!(report.executed, 0);
        assert_eq!(report.halted_at.as_deref(), Some("001"));
        assert!(matches!(
            report.outcomes[0].outcome,
            MigrationOutcome::ChecksumMismatch { .. }
        ));
        assert!(matches!(
            report.error,
            Some(HearthError::Migration(MigrationError::ChecksumMismatch { .. }))
        ));
        assert!(raw_calls(&db).is_empty(), "modified SQL must not run");
        assert_eq!(db.count(MockMethod::Execute), 0);
        assert_eq!(rows_for(&rows.lock().unwrap(), "001").len(), 1);
    }

    #[tokio::test]
    async fn test_failure_stops_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");
        write(dir.path(), "002_b.sql", "CREATE TABLE broken (;");
        write(dir.path(), "003_c.sql", "CREATE TABLE c ();");

        let db = Arc::new(MockDatabase::new());
        let rows = scripted_history(&db);
        db.on_raw("CREATE TABLE a ();");
        db.fail(MockMethod::Raw, "CREATE TABLE broken (;", "syntax error at or near \";\"");
        db.on_raw("CREATE TABLE c ();");

        let report = runner(db.clone(), &dir).run_pending().await;
        assert!(!report.success);
        assert_eq!(report.executed, 1);
        assert_eq!(report.halted_at.as_deref(), Some("002"));
        assert_eq!(report.outcomes.len(), 2);
        assert!(!raw_calls(&db).contains(&"CREATE TABLE c ();".to_string()));

        let rows = rows.lock().unwrap();
        let failed = rows_for(&rows, "002");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["success"], json!(false));
        assert!(failed[0]["error_message"]
            .as_str()
            .unwrap()
            .contains("syntax error"));
        assert!(rows_for(&rows, "003").is_empty());
    }

    #[tokio::test]
    async fn test_failed_migration_is_retried_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");

        let db = Arc::new(MockDatabase::new());
        let rows = scripted_history(&db);
        db.fail(MockMethod::Raw, "CREATE TABLE a ();", "connection reset");
        let runner = runner(db.clone(), &dir);
        assert!(!runner.run_pending().await.success);

        db.on_raw("CREATE TABLE a ();");
        let report = runner.run_pending().await;
        assert!(report.success);
        assert_eq!(report.executed, 1);

        let rows = rows.lock().unwrap();
        let matching = rows_for(&rows, "001");
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0]["success"], json!(true));
        assert_eq!(matching[0]["error_message"], JsonValue::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");

        let db = Arc::new(MockDatabase::new());
        scripted_history(&db);
        db.set_ready(false);

        let report = runner(db.clone(), &dir).run_pending().await;
        assert!(!report.success);
        assert_eq!(report.executed, 0);
        assert_eq!(report.error, Some(MigrationError::NotReady.into()));
        assert_eq!(db.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_version_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");
        write(dir.path(), "001_b.sql", "CREATE TABLE b ();");

        let db = Arc::new(MockDatabase::new());
        let rows = scripted_history(&db);

        let report = runner(db.clone(), &dir).run_pending().await;
        assert!(!report.success);
        assert_eq!(report.executed, 0);
        assert!(report.outcomes.is_empty());
        assert!(matches!(
            report.error,
            Some(HearthError::Migration(MigrationError::Discovery { .. }))
        ));
        assert!(raw_calls(&db).is_empty());
        assert!(rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_table_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");

        let db = Arc::new(MockDatabase::new());
        db.fail(MockMethod::Raw, history::CREATE_TABLE, "permission denied");

        let report = runner(db.clone(), &dir).run_pending().await;
        assert!(!report.success);
        assert_eq!(report.executed, 0);
        assert!(matches!(
            report.error,
            Some(HearthError::Migration(MigrationError::HistoryTable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_status_and_history() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_a.sql", "CREATE TABLE a ();");
        write(dir.path(), "002_b.sql", "CREATE TABLE b ();");

        let db = Arc::new(MockDatabase::new());
        let rows = scripted_history(&db);
        db.on_raw("CREATE TABLE a ();");
        let runner = runner(db.clone(), &dir);

        // Only 001 is applied.
        rows.lock().unwrap().push(params! {
            "version" => "001",
            "name" => "a",
            "checksum" => checksum(b"CREATE TABLE a ();"),
            "executed_at" => "2024-03-01T12:00:00Z",
            "execution_time_ms" => 4,
            "success" => true,
            "error_message" => JsonValue::Null,
        });

        let status = runner.status().await.unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].state, MigrationState::Applied);
        assert_eq!(status[1].state, MigrationState::Pending);

        write(dir.path(), "001_a.sql", "CREATE TABLE a (changed INT);");
        let status = runner.status().await.unwrap();
        assert_eq!(status[0].state, MigrationState::ChecksumMismatch);

        let history = runner.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, "001");
        assert_eq!(history[0].execution_time_ms, 4);
        assert!(history[0].success);
    }
}
