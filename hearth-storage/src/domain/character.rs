//! Player characters.
//!
//! Cached views:
//!
//! | key | view |
//! |-----|------|
//! | `character:<id>` | default |
//! | `character:<id>:full` | joined with the owning user |
//! | `character:<user_id>:user` | every character of a user |
//!
//! Every write invalidates the default and `full` views of the character it
//! touches and the `user` list of its owner.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_core::{params, HearthResult, Params, StorageConfig, ValidationError};
use serde::{Deserialize, Serialize};

use super::{decode_all, decode_opt, now, require, require_positive, to_row};
use crate::adapter::{CacheAdapter, DatabaseAdapter};
use crate::base::{BaseStorage, CreateOptions, DeleteOptions, QueryOptions, ReadOptions, UpdateOptions};

pub const NAME: &str = "characters";
const PREFIX: &str = "character";
const TTL: Duration = Duration::from_secs(1800);

const FULL_VIEW: &str = "full";
const USER_VIEW: &str = "user";

pub mod queries {
    pub const SELECT_BY_ID: &str = "SELECT * FROM characters WHERE id = :id";
    pub const SELECT_FULL: &str = "SELECT c.*, u.license, u.username \
         FROM characters c JOIN users u ON u.id = c.user_id WHERE c.id = :id";
    pub const LIST_BY_USER: &str = "SELECT * FROM characters WHERE user_id = :user_id ORDER BY id";
    pub const INSERT: &str = "INSERT INTO characters \
         (user_id, first_name, last_name, gender, date_of_birth, created_at) \
         VALUES (:user_id, :first_name, :last_name, :gender, :date_of_birth, :created_at)";
    pub const UPDATE_CORE: &str = "UPDATE characters SET first_name = :first_name, \
         last_name = :last_name, gender = :gender, date_of_birth = :date_of_birth WHERE id = :id";
    pub const UPDATE_JOB: &str =
        "UPDATE characters SET job = :job, job_grade = :job_grade WHERE id = :id";
    pub const UPDATE_MONEY: &str = "UPDATE characters SET cash = :cash, bank = :bank WHERE id = :id";
    pub const UPDATE_POSITION: &str =
        "UPDATE characters SET position = :position WHERE id = :id";
    pub const DELETE: &str = "DELETE FROM characters WHERE id = :id";
}

pub const DEFAULT_JOB: &str = "unemployed";

/// World position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub heading: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    pub job: String,
    #[serde(default)]
    pub job_grade: i32,
    #[serde(default)]
    pub cash: i64,
    #[serde(default)]
    pub bank: i64,
    #[serde(default)]
    pub position: Option<Position>,
    pub created_at: DateTime<Utc>,
}

/// A character with its owner's account fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterFull {
    #[serde(flatten)]
    pub character: Character,
    pub license: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewCharacter {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CharacterStorage {
    base: BaseStorage,
}

impl CharacterStorage {
    pub fn new(db: Arc<dyn DatabaseAdapter>, cache: Arc<dyn CacheAdapter>) -> HearthResult<Self> {
        let config = StorageConfig::new(NAME, PREFIX)?.with_ttl(TTL);
        Ok(Self {
            base: BaseStorage::new(config, db, cache).with_identifier_field("id"),
        })
    }

    pub fn base(&self) -> &BaseStorage {
        &self.base
    }

    pub async fn get_by_id(&self, id: i64) -> HearthResult<Option<Character>> {
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

    pub async fn get_full(&self, id: i64) -> HearthResult<Option<CharacterFull>> {
        let row = self
            .base
            .get(
                &id.to_string(),
                queries::SELECT_FULL,
                &params! { "id" => id },
                ReadOptions::suffix(FULL_VIEW),
            )
            .await?;
        decode_opt(row)
    }

    pub async fn list_by_user(&self, user_id: i64) -> HearthResult<Vec<Character>> {
        let rows = self
            .base
            .custom_query_many(
                &format!("{}:{}", user_id, USER_VIEW),
                queries::LIST_BY_USER,
                &params! { "user_id" => user_id },
                QueryOptions::default(),
            )
            .await?;
        decode_all(rows)
    }

    /// Create a character, seed its default view and invalidate the owner's
    /// `user` list.
    pub async fn create_character(&self, new: NewCharacter) -> HearthResult<Character> {
        require_positive("user_id", new.user_id)?;
        require("first_name", &new.first_name)?;
        require("last_name", &new.last_name)?;

        let created_at = now();
        let params = params! {
            "user_id" => new.user_id,
            "first_name" => new.first_name,
            "last_name" => new.last_name,
            "gender" => new.gender,
            "date_of_birth" => new.date_of_birth,
            "created_at" => created_at,
        };

        let mut character = Character {
            id: 0,
            user_id: new.user_id,
            first_name: new.first_name,
            last_name: new.last_name,
            gender: new.gender,
            date_of_birth: new.date_of_birth,
            job: DEFAULT_JOB.to_string(),
            job_grade: 0,
            cash: 0,
            bank: 0,
            position: None,
            created_at,
        };

        let mut seed = to_row(&character)?;
        seed.remove("id");

        character.id = self
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

        self.invalidate_user_list(character.user_id).await;
        Ok(character)
    }

    /// Change name, gender and date of birth.
    pub async fn update_core(
        &self,
        id: i64,
        first_name: &str,
        last_name: &str,
        gender: Option<&str>,
        date_of_birth: Option<&str>,
    ) -> HearthResult<bool> {
        require("first_name", first_name)?;
        require("last_name", last_name)?;
        self.update_invalidating(
            id,
            queries::UPDATE_CORE,
            params! {
                "id" => id,
                "first_name" => first_name,
                "last_name" => last_name,
                "gender" => gender,
                "date_of_birth" => date_of_birth,
            },
        )
        .await
    }

    pub async fn update_job(&self, id: i64, job: &str, job_grade: i32) -> HearthResult<bool> {
        require("job", job)?;
        if job_grade < 0 {
            return Err(invalid("job_grade", "cannot be negative"));
        }
        self.update_invalidating(
            id,
            queries::UPDATE_JOB,
            params! { "id" => id, "job" => job, "job_grade" => job_grade },
        )
        .await
    }

    pub async fn update_money(&self, id: i64, cash: i64, bank: i64) -> HearthResult<bool> {
        if cash < 0 {
            return Err(invalid("cash", "cannot be negative"));
        }
        if bank < 0 {
            return Err(invalid("bank", "cannot be negative"));
        }
        self.update_invalidating(
            id,
            queries::UPDATE_MONEY,
            params! { "id" => id, "cash" => cash, "bank" => bank },
        )
        .await
    }

    pub async fn update_position(&self, id: i64, position: Position) -> HearthResult<bool> {
        let finite = [position.x, position.y, position.z, position.heading]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(invalid("position", "coordinates must be finite"));
        }
        self.update_invalidating(
            id,
            queries::UPDATE_POSITION,
            params! { "id" => id, "position" => position },
        )
        .await
    }

    /// Delete a character. Clears its default and `full` views and the
    /// owner's `user` list.
    pub async fn delete_character(&self, id: i64) -> HearthResult<bool> {
        let current = self.get_by_id(id).await?;
        let identifier = id.to_string();

        let affected = self
            .base
            .delete(
                &identifier,
                queries::DELETE,
                &params! { "id" => id },
                DeleteOptions::default(),
            )
            .await?;

        self.base.invalidate_cache(&identifier, Some(FULL_VIEW)).await;
        if let Some(character) = current {
            self.invalidate_user_list(character.user_id).await;
        }
        Ok(affected > 0)
    }

    /// Shared path for every update: the owner is loaded first so its list
    /// can be invalidated afterwards. Returns `false` for unknown ids.
    async fn update_invalidating(&self, id: i64, query: &str, params: Params) -> HearthResult<bool> {
        let Some(current) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        let identifier = id.to_string();

        let affected = self
            .base
            .update(&identifier, query, &params, UpdateOptions::invalidate())
            .await?;

        self.base.invalidate_cache(&identifier, Some(FULL_VIEW)).await;
        self.invalidate_user_list(current.user_id).await;
        Ok(affected > 0)
    }

    async fn invalidate_user_list(&self, user_id: i64) {
        self.base
            .invalidate_cache(&user_id.to_string(), Some(USER_VIEW))
            .await;
    }
}

fn invalid(field: &str, reason: &str) -> hearth_core::HearthError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
