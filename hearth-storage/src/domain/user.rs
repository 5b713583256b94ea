//! Player accounts, keyed by license.
//!
//! Cached views of a user:
//!
//! | key | view |
//! |-----|------|
//! | `user:<license>` | default |
//! | `user:<id>:id` | lookup by numeric id |
//! | `user:<username>:username` | lookup by username |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_core::{params, HearthResult, StorageConfig, ValidationError};
use serde::{Deserialize, Serialize};

use super::{decode_all, decode_opt, now, require, to_row};
use crate::adapter::{CacheAdapter, DatabaseAdapter};
use crate::base::{BaseStorage, CreateOptions, DeleteOptions, QueryOptions, ReadOptions, UpdateOptions};

pub const NAME: &str = "users";
const PREFIX: &str = "user";
const TTL: Duration = Duration::from_secs(3600);

const ID_VIEW: &str = "id";
const USERNAME_VIEW: &str = "username";

pub mod queries {
    pub const SELECT_BY_LICENSE: &str = "SELECT * FROM users WHERE license = :license";
    pub const SELECT_BY_ID: &str = "SELECT * FROM users WHERE id = :id";
    pub const SELECT_BY_USERNAME: &str =
        "SELECT * FROM users WHERE username = :username ORDER BY id LIMIT 1";
    pub const SELECT_MANY_BY_LICENSE: &str = "SELECT * FROM users WHERE license = ANY(:licenses)";
    pub const SEARCH_BY_USERNAME: &str =
        "SELECT * FROM users WHERE username ILIKE :pattern ESCAPE '\\' ORDER BY username LIMIT :limit";
    pub const INSERT: &str = "INSERT INTO users (license, username, discord, created_at) \
         VALUES (:license, :username, :discord, :created_at)";
    pub const UPDATE_USERNAME: &str =
        "UPDATE users SET username = :username WHERE license = :license";
    pub const TOUCH_LAST_SEEN: &str = "UPDATE users SET last_seen = NOW() WHERE license = :license";
    pub const ADD_PLAYTIME: &str =
        "UPDATE users SET playtime = playtime + :seconds WHERE license = :license";
    pub const DELETE: &str = "DELETE FROM users WHERE license = :license";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub license: String,
    pub username: String,
    #[serde(default)]
    pub discord: Option<String>,
    /// Total seconds played.
    #[serde(default)]
    pub playtime: i64,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub license: String,
    pub username: String,
    pub discord: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserStorage {
    base: BaseStorage,
}

impl UserStorage {
    pub fn new(db: Arc<dyn DatabaseAdapter>, cache: Arc<dyn CacheAdapter>) -> HearthResult<Self> {
        let config = StorageConfig::new(NAME, PREFIX)?.with_ttl(TTL);
        Ok(Self {
            base: BaseStorage::new(config, db, cache).with_identifier_field("license"),
        })
    }

    pub fn base(&self) -> &BaseStorage {
        &self.base
    }

    pub async fn get_by_license(&self, license: &str) -> HearthResult<Option<User>> {
        let row = self
            .base
            .get(
                license,
                queries::SELECT_BY_LICENSE,
                &params! { "license" => license },
                ReadOptions::default(),
            )
            .await?;
        decode_opt(row)
    }

    pub async fn get_by_id(&self, id: i64) -> HearthResult<Option<User>> {
        let row = self
            .base
            .get(
                &id.to_string(),
                queries::SELECT_BY_ID,
                &params! { "id" => id },
                ReadOptions::suffix(ID_VIEW),
            )
            .await?;
        decode_opt(row)
    }

    pub async fn get_by_username(&self, username: &str) -> HearthResult<Option<User>> {
        let row = self
            .base
            .get(
                username,
                queries::SELECT_BY_USERNAME,
                &params! { "username" => username },
                ReadOptions::suffix(USERNAME_VIEW),
            )
            .await?;
        decode_opt(row)
    }

    /// Users for every known license, in input order.
    pub async fn get_many_by_license(&self, licenses: &[String]) -> HearthResult<Vec<User>> {
        let rows = self
            .base
            .get_many(
                licenses,
                |missing| {
                    (
                        queries::SELECT_MANY_BY_LICENSE.to_string(),
                        params! { "licenses" => missing },
                    )
                },
                ReadOptions::default(),
            )
            .await?;
        decode_all(rows)
    }

    /// Create a user and seed the default view.
    pub async fn create_user(&self, new: NewUser) -> HearthResult<User> {
        require("license", &new.license)?;
        require("username", &new.username)?;

        let created_at = now();
        let params = params! {
            "license" => new.license,
            "username" => new.username,
            "discord" => new.discord,
            "created_at" => created_at,
        };

        let mut user = User {
            id: 0,
            license: new.license,
            username: new.username,
            discord: new.discord,
            playtime: 0,
            last_seen: None,
            created_at,
        };

        // `create` fills in the generated id.
        let mut seed = to_row(&user)?;
        seed.remove("id");

        user.id = self
            .base
            .create(
                queries::INSERT,
                &params,
                CreateOptions {
                    cache_data: Some(seed),
                    identifier: Some(user.license.clone()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(user)
    }

    /// Rename a user. Returns `false` when the license is unknown.
    ///
    /// Writes the renamed row through to the default view and invalidates
    /// the `id` view plus the old and new `username` views.
    pub async fn update_username(&self, license: &str, username: &str) -> HearthResult<bool> {
        require("license", license)?;
        require("username", username)?;

        let Some(current) = self.get_by_license(license).await? else {
            return Ok(false);
        };
        let renamed = User {
            username: username.to_string(),
            ..current.clone()
        };

        let affected = self
            .base
            .update(
                license,
                queries::UPDATE_USERNAME,
                &params! { "license" => license, "username" => username },
                UpdateOptions::write_through(to_row(&renamed)?),
            )
            .await?;

        self.invalidate_views(&current).await;
        self.base.invalidate_cache(username, Some(USERNAME_VIEW)).await;
        Ok(affected > 0)
    }

    /// Stamp the last-seen time. Invalidates the default, `id` and
    /// `username` views.
    pub async fn touch_last_seen(&self, license: &str) -> HearthResult<bool> {
        require("license", license)?;
        self.update_invalidating(
            license,
            queries::TOUCH_LAST_SEEN,
            params! { "license" => license },
        )
        .await
    }

    /// Add played seconds. Invalidates the default, `id` and `username` views.
    pub async fn add_playtime(&self, license: &str, seconds: i64) -> HearthResult<bool> {
        require("license", license)?;
        if seconds < 0 {
            return Err(ValidationError::InvalidValue {
                field: "seconds".to_string(),
                reason: "playtime cannot decrease".to_string(),
            }
            .into());
        }
        self.update_invalidating(
            license,
            queries::ADD_PLAYTIME,
            params! { "license" => license, "seconds" => seconds },
        )
        .await
    }

    /// Delete a user. Clears the default, `id` and `username` views.
    pub async fn delete_user(&self, license: &str) -> HearthResult<bool> {
        require("license", license)?;
        let current = self.get_by_license(license).await?;

        let affected = self
            .base
            .delete(
                license,
                queries::DELETE,
                &params! { "license" => license },
                DeleteOptions::default(),
            )
            .await?;

        if let Some(user) = current {
            self.invalidate_views(&user).await;
        }
        Ok(affected > 0)
    }

    /// Case-insensitive substring search. Never cached. `%` and `_` in
    /// `fragment` match literally.
    pub async fn search_by_username(&self, fragment: &str, limit: i64) -> HearthResult<Vec<User>> {
        let pattern = format!("%{}%", escape_like(fragment));
        let rows = self
            .base
            .custom_query_many(
                &format!("search:{}", pattern),
                queries::SEARCH_BY_USERNAME,
                &params! { "pattern" => pattern, "limit" => limit },
                QueryOptions::uncached(),
            )
            .await?;
        decode_all(rows)
    }

    async fn update_invalidating(
        &self,
        license: &str,
        query: &str,
        params: hearth_core::Params,
    ) -> HearthResult<bool> {
        let current = self.get_by_license(license).await?;
        let affected = self
            .base
            .update(license, query, &params, UpdateOptions::invalidate())
            .await?;
        if let Some(user) = current {
            self.invalidate_views(&user).await;
        }
        Ok(affected > 0)
    }

    async fn invalidate_views(&self, user: &User) {
        self.base
            .invalidate_cache(&user.id.to_string(), Some(ID_VIEW))
            .await;
        self.base
            .invalidate_cache(&user.username, Some(USERNAME_VIEW))
            .await;
    }
}

/// Escape `LIKE` metacharacters so they match literally under `ESCAPE '\'`.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
