//! Append-only audit log. Caching is disabled for this storage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_core::{params, HearthResult, StorageConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{decode_all, decode_opt, now, require};
use crate::adapter::{CacheAdapter, DatabaseAdapter};
use crate::base::{BaseStorage, CreateOptions, QueryOptions, ReadOptions};

pub const NAME: &str = "logs";
const PREFIX: &str = "log";
const TTL: Duration = Duration::from_secs(300);

pub mod queries {
    pub const SELECT_BY_ID: &str = "SELECT * FROM logs WHERE id = :id";
    pub const INSERT: &str = "INSERT INTO logs (category, action, actor, target, data, created_at) \
         VALUES (:category, :action, :actor, :target, :data, :created_at)";
    pub const RECENT_BY_CATEGORY: &str =
        "SELECT * FROM logs WHERE category = :category ORDER BY created_at DESC, id DESC LIMIT :limit";
    pub const BY_ACTOR_SINCE: &str =
        "SELECT * FROM logs WHERE actor = :actor AND created_at >= :since ORDER BY created_at";
    pub const PRUNE: &str =
        "DELETE FROM logs WHERE created_at < NOW() - make_interval(days => :days)";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub category: String,
    pub action: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub data: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewLogEntry {
    pub category: String,
    pub action: String,
    pub actor: Option<String>,
    pub target: Option<String>,
    pub data: JsonValue,
}

#[derive(Debug, Clone)]
pub struct LogStorage {
    base: BaseStorage,
}

impl LogStorage {
    pub fn new(db: Arc<dyn DatabaseAdapter>, cache: Arc<dyn CacheAdapter>) -> HearthResult<Self> {
        let config = StorageConfig::new(NAME, PREFIX)?
            .with_ttl(TTL)
            .with_cache(false);
        Ok(Self {
            base: BaseStorage::new(config, db, cache).with_identifier_field("id"),
        })
    }

    pub fn base(&self) -> &BaseStorage {
        &self.base
    }

    /// Append an entry and return its id.
    pub async fn write(&self, entry: NewLogEntry) -> HearthResult<i64> {
        require("category", &entry.category)?;
        require("action", &entry.action)?;

        let data = match entry.data {
            JsonValue::Null => JsonValue::Object(Default::default()),
            data => data,
        };
        let params = params! {
            "category" => entry.category,
            "action" => entry.action,
            "actor" => entry.actor,
            "target" => entry.target,
            "data" => data,
            "created_at" => now(),
        };
        self.base
            .create(queries::INSERT, &params, CreateOptions::default())
            .await
    }

    pub async fn get_by_id(&self, id: i64) -> HearthResult<Option<LogEntry>> {
        let row = self
            .base
            .get(
                &id.to_string(),
                queries::SELECT_BY_ID,
                &params! { "id" => id },
                ReadOptions::default(),
            )
            .await?;
        decode_opt(row)
    }

    pub async fn recent_by_category(&self, category: &str, limit: i64) -> HearthResult<Vec<LogEntry>> {
        require("category", category)?;
        let rows = self
            .base
            .custom_query_many(
                &format!("{}:recent", category),
                queries::RECENT_BY_CATEGORY,
                &params! { "category" => category, "limit" => limit.max(1) },
                QueryOptions::uncached(),
            )
            .await?;
        decode_all(rows)
    }

    pub async fn by_actor_since(&self, actor: &str, since: DateTime<Utc>) -> HearthResult<Vec<LogEntry>> {
        require("actor", actor)?;
        let rows = self
            .base
            .custom_query_many(
                &format!("{}:since", actor),
                queries::BY_ACTOR_SINCE,
                &params! { "actor" => actor, "since" => since },
                QueryOptions::uncached(),
            )
            .await?;
        decode_all(rows)
    }

    /// Delete entries older than `days`. Returns how many were removed.
    pub async fn prune_older_than(&self, days: u32) -> HearthResult<u64> {
        let removed = self
            .base
            .db()
            .execute(queries::PRUNE, &params! { "days" => days })
            .await?;
        tracing::info!(removed, days, "pruned audit log");
        Ok(removed)
    }
}
