//! [`DatabaseAdapter`] over a deadpool-postgres pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool, PoolError};
use hearth_core::{HearthError, HearthResult, Params, RetryPolicy, Row};
use hearth_storage::DatabaseAdapter;
use serde_json::Value as JsonValue;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Statement;

use crate::config::DbConfig;
use crate::params::{bind, has_returning, rewrite, BoxedParam};
use crate::rows::decode_row;

/// Map a driver error to a storage error, logging the full detail.
fn db_error(err: tokio_postgres::Error) -> HearthError {
    tracing::error!("Database error: {:?}", err);
    match err.as_db_error() {
        Some(db) => HearthError::database(format!("{} ({})", db.message(), db.code().code())),
        None => HearthError::database(err.to_string()),
    }
}

fn pool_error(err: PoolError) -> HearthError {
    tracing::error!("Connection pool error: {:?}", err);
    match err {
        PoolError::Timeout(_) => HearthError::database("Timed out waiting for a database connection"),
        PoolError::Closed => HearthError::database("Database connection pool is closed"),
        PoolError::Backend(e) => db_error(e),
        other => HearthError::database(format!("Failed to acquire database connection: {}", other)),
    }
}

/// PostgreSQL adapter.
///
/// Readiness flips to `true` after a successful `SELECT 1` probe and back
/// to `false` when the pool cannot hand out a connection.
pub struct PgDatabase {
    pool: Pool,
    ready: AtomicBool,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PgDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDatabase")
            .field("pool_size", &self.pool.status().size)
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

impl PgDatabase {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            ready: AtomicBool::new(false),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &DbConfig) -> HearthResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> HearthResult<Object> {
        match self.pool.get().await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                self.ready.store(false, Ordering::SeqCst);
                Err(pool_error(e))
            }
        }
    }

    /// Probe the server once and record the result.
    pub async fn ping(&self) -> bool {
        let ok = match self.pool.get().await {
            Ok(conn) => conn.simple_query("SELECT 1").await.is_ok(),
            Err(e) => {
                tracing::debug!(error = %e, "database ping failed");
                false
            }
        };
        self.ready.store(ok, Ordering::SeqCst);
        ok
    }

    /// Prepare `query` and bind `params` against the inferred parameter types.
    async fn prepare(
        &self,
        conn: &Object,
        query: &str,
        params: &Params,
    ) -> HearthResult<(Statement, Vec<BoxedParam>)> {
        let positional = rewrite(query);
        let stmt = conn.prepare_cached(&positional.sql).await.map_err(db_error)?;

        let values = positional
            .names
            .iter()
            .zip(stmt.params())
            .map(|(name, ty)| match params.get(name) {
                Some(value) => bind(name, value, ty),
                None => Err(HearthError::database(format!("missing query parameter :{}", name))),
            })
            .collect::<HearthResult<Vec<_>>>()?;

        Ok((stmt, values))
    }
}

fn as_refs(values: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    values
        .iter()
        .map(|v| v.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl DatabaseAdapter for PgDatabase {
    async fn single(&self, query: &str, params: &Params) -> HearthResult<Option<Row>> {
        let conn = self.conn().await?;
        let (stmt, values) = self.prepare(&conn, query, params).await?;
        let rows = conn.query(&stmt, &as_refs(&values)).await.map_err(db_error)?;
        Ok(rows.first().map(decode_row))
    }

    async fn query(&self, query: &str, params: &Params) -> HearthResult<Vec<Row>> {
        let conn = self.conn().await?;
        let (stmt, values) = self.prepare(&conn, query, params).await?;
        let rows = conn.query(&stmt, &as_refs(&values)).await.map_err(db_error)?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn insert(&self, query: &str, params: &Params) -> HearthResult<Option<i64>> {
        let query = if has_returning(query) {
            query.to_string()
        } else {
            format!("{} RETURNING id", query.trim_end().trim_end_matches(';'))
        };

        let conn = self.conn().await?;
        let (stmt, values) = self.prepare(&conn, &query, params).await?;
        let rows = conn.query(&stmt, &as_refs(&values)).await.map_err(db_error)?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let id = match row.columns().first().map(|c| c.type_().clone()) {
            Some(Type::INT8) => row.try_get::<_, Option<i64>>(0).map_err(db_error)?,
            Some(Type::INT4) => row
                .try_get::<_, Option<i32>>(0)
                .map_err(db_error)?
                .map(i64::from),
            _ => match decode_row(row).into_iter().next() {
                Some((_, JsonValue::Number(n))) => n.as_i64(),
                _ => None,
            },
        };
        Ok(id)
    }

    async fn update(&self, query: &str, params: &Params) -> HearthResult<u64> {
        self.execute(query, params).await
    }

    async fn execute(&self, query: &str, params: &Params) -> HearthResult<u64> {
        let conn = self.conn().await?;
        let (stmt, values) = self.prepare(&conn, query, params).await?;
        conn.execute(&stmt, &as_refs(&values)).await.map_err(db_error)
    }

    async fn raw_query(&self, sql: &str) -> HearthResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(sql).await.map_err(db_error)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn await_ready(&self, timeout: Duration) -> bool {
        let ready = self.retry.wait_until(timeout, || self.ping()).await;
        if !ready {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "database not ready");
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_db() -> PgDatabase {
        let config = DbConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            max_size: 1,
            timeout: Duration::from_millis(200),
            ..Default::default()
        };
        PgDatabase::from_config(&config)
            .unwrap()
            .with_retry(RetryPolicy::fixed(Duration::from_millis(20), 3))
    }

    #[tokio::test]
    async fn test_starts_not_ready() {
        assert!(!unreachable_db().is_ready());
    }

    #[tokio::test]
    async fn test_unreachable_server_times_out() {
        let db = unreachable_db();
        assert!(!db.await_ready(Duration::from_millis(500)).await);
        assert!(!db.is_ready());
    }

    #[tokio::test]
    async fn test_unreachable_server_query_is_error() {
        let db = unreachable_db();
        let err = db.single("SELECT 1", &Params::new()).await.unwrap_err();
        assert!(matches!(err, HearthError::Storage(_)));
    }
}
