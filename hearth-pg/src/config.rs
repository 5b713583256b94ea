//! Connection pool configuration.

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime, Timeouts};
use hearth_core::{ConfigError, HearthResult};
use tokio_postgres::NoTls;

/// Database connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Time to wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "hearth".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HEARTH_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("HEARTH_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("HEARTH_DB_NAME").unwrap_or_else(|_| "hearth".to_string()),
            user: std::env::var("HEARTH_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("HEARTH_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("HEARTH_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("HEARTH_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened here; the pool connects lazily.
    pub fn create_pool(&self) -> HearthResult<Pool> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "HEARTH_DB_POOL_SIZE".to_string(),
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            }
            .into());
        }

        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                ConfigError::InvalidValue {
                    field: "database".to_string(),
                    value: format!("{}:{}/{}", self.host, self.port, self.dbname),
                    reason: format!("Failed to create pool: {}", e),
                }
                .into()
            })
    }
}
