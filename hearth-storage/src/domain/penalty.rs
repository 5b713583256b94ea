//! Bans, kicks, warnings and mutes.
//!
//! The active penalty of a user is cached at `penalty:<user_id>:active`.
//! Creating or revoking a penalty invalidates that view.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_core::{params, HearthResult, StorageConfig};
use serde::{Deserialize, Serialize};

use super::{decode, decode_all, decode_opt, now, require, require_positive, to_row};
use crate::adapter::{CacheAdapter, DatabaseAdapter};
use crate::base::{BaseStorage, CreateOptions, QueryOptions, ReadOptions, UpdateOptions};

pub const NAME: &str = "penalties";
const PREFIX: &str = "penalty";
const TTL: Duration = Duration::from_secs(600);

const ACTIVE_VIEW: &str = "active";

pub mod queries {
    pub const SELECT_BY_ID: &str = "SELECT * FROM penalties WHERE id = :id";
    /// Bans and mutes stay in force until they expire or are revoked.
    pub const SELECT_ACTIVE_BY_USER: &str = "SELECT * FROM penalties \
         WHERE user_id = :user_id AND revoked = FALSE AND kind IN ('ban', 'mute') \
         AND (expires_at IS NULL OR expires_at > NOW()) \
         ORDER BY created_at DESC LIMIT 1";
    pub const LIST_BY_USER: &str =
        "SELECT * FROM penalties WHERE user_id = :user_id ORDER BY created_at DESC";
    pub const INSERT: &str = "INSERT INTO penalties \
         (user_id, kind, reason, issued_by, expires_at, created_at) \
         VALUES (:user_id, :kind, :reason, :issued_by, :expires_at, :created_at)";
    pub const REVOKE: &str = "UPDATE penalties SET revoked = TRUE, revoked_by = :revoked_by, \
         revoked_at = NOW() WHERE id = :id AND revoked = FALSE";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyKind {
    Ban,
    Kick,
    Warn,
    Mute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalty {
    pub id: i64,
    pub user_id: i64,
    pub kind: PenaltyKind,
    pub reason: String,
    pub issued_by: String,
    /// `None` means permanent.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub revoked_by: Option<String>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Penalty {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at.map_or(true, |expires| expires > at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPenalty {
    pub user_id: i64,
    pub kind: PenaltyKind,
    pub reason: String,
    pub issued_by: String,
    /// `None` issues a permanent penalty.
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PenaltyStorage {
    base: BaseStorage,
}

impl PenaltyStorage {
    pub fn new(db: Arc<dyn DatabaseAdapter>, cache: Arc<dyn CacheAdapter>) -> HearthResult<Self> {
        let config = StorageConfig::new(NAME, PREFIX)?.with_ttl(TTL);
        Ok(Self {
            base: BaseStorage::new(config, db, cache).with_identifier_field("id"),
        })
    }

    pub fn base(&self) -> &BaseStorage {
        &self.base
    }

    pub async fn get_by_id(&self, id: i64) -> HearthResult<Option<Penalty>> {
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

    /// The ban or mute currently in force for a user.
    ///
    /// A cached penalty that has expired since it was cached is dropped and
    /// reported as none.
    pub async fn get_active_penalty_by_user_id(&self, user_id: i64) -> HearthResult<Option<Penalty>> {
        let key = active_key(user_id);
        let row = self
            .base
            .custom_query_one(
                &key,
                queries::SELECT_ACTIVE_BY_USER,
                &params! { "user_id" => user_id },
                QueryOptions::default(),
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let penalty: Penalty = decode(row)?;
        if penalty.is_active_at(Utc::now()) {
            Ok(Some(penalty))
        } else {
            self.base.invalidate_cache(&key, None).await;
            Ok(None)
        }
    }

    pub async fn is_banned(&self, user_id: i64) -> HearthResult<bool> {
        Ok(self
            .get_active_penalty_by_user_id(user_id)
            .await?
            .is_some_and(|penalty| penalty.kind == PenaltyKind::Ban))
    }

    /// Full history for a user, newest first. Never cached.
    pub async fn list_by_user(&self, user_id: i64) -> HearthResult<Vec<Penalty>> {
        let rows = self
            .base
            .custom_query_many(
                &format!("{}:history", user_id),
                queries::LIST_BY_USER,
                &params! { "user_id" => user_id },
                QueryOptions::uncached(),
            )
            .await?;
        decode_all(rows)
    }

    /// Issue a penalty. Seeds its default view and invalidates the user's
    /// `active` view.
    pub async fn create_penalty(&self, new: NewPenalty) -> HearthResult<Penalty> {
        require_positive("user_id", new.user_id)?;
        require("reason", &new.reason)?;
        require("issued_by", &new.issued_by)?;

        let created_at = now();
        let expires_at = match new.duration {
            Some(duration) => Some(expiry_after(created_at, duration)?),
            None => None,
        };

        let mut penalty = Penalty {
            id: 0,
            user_id: new.user_id,
            kind: new.kind,
            reason: new.reason,
            issued_by: new.issued_by,
            expires_at,
            revoked: false,
            revoked_by: None,
            revoked_at: None,
            created_at,
        };

        let params = params! {
            "user_id" => penalty.user_id,
            "kind" => penalty.kind,
            "reason" => penalty.reason,
            "issued_by" => penalty.issued_by,
            "expires_at" => penalty.expires_at,
            "created_at" => penalty.created_at,
        };
        let mut seed = to_row(&penalty)?;
        seed.remove("id");

        penalty.id = self
            .base
            .create(
                queries::INSERT,
                &params,
                CreateOptions {
                    cache_data: Some(seed),
                    ..Default::default()
                },
            )
            .await?;

        self.base
            .invalidate_cache(&active_key(penalty.user_id), None)
            .await;
        tracing::info!(
            user_id = penalty.user_id,
            kind = ?penalty.kind,
            penalty_id = penalty.id,
            "penalty issued"
        );
        Ok(penalty)
    }

    /// Revoke a penalty. Invalidates its default view and the user's
    /// `active` view. Returns `false` if it was unknown or already revoked.
    pub async fn revoke_penalty(&self, id: i64, revoked_by: &str) -> HearthResult<bool> {
        require("revoked_by", revoked_by)?;
        let Some(current) = self.get_by_id(id).await? else {
            return Ok(false);
        };

        let affected = self
            .base
            .update(
                &id.to_string(),
                queries::REVOKE,
                &params! { "id" => id, "revoked_by" => revoked_by },
                UpdateOptions::invalidate(),
            )
            .await?;

        self.base
            .invalidate_cache(&active_key(current.user_id), None)
            .await;
        Ok(affected > 0)
    }
}

fn active_key(user_id: i64) -> String {
    format!("{}:{}", user_id, ACTIVE_VIEW)
}

/// `from + duration`, or a validation error when the result is not a
/// representable timestamp.
fn expiry_after(from: DateTime<Utc>, duration: Duration) -> HearthResult<DateTime<Utc>> {
    let invalid = |reason: String| hearth_core::ValidationError::InvalidValue {
        field: "duration".to_string(),
        reason,
    };
    let delta = chrono::Duration::from_std(duration).map_err(|e| invalid(e.to_string()))?;
    from.checked_add_signed(delta).ok_or_else(|| {
        invalid(format!("{}s runs past the latest timestamp", duration.as_secs())).into()
    })
}
