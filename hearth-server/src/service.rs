//! Typed service boundary over the storage registry.
//!
//! Other game components reach storages through [`StorageClient`] rather
//! than holding storage handles. Requests and responses are plain serde
//! types so the same contract works in-process ([`LocalStorageClient`]) or
//! behind any RPC transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::HealthCheck;
use hearth_storage::domain::{character, log, penalty, user};
use hearth_storage::{
    Character, CharacterFull, CharacterStorage, LogStorage, ManagedStorage, NewCharacter,
    NewLogEntry, NewPenalty, NewUser, Penalty, PenaltyKind, PenaltyStorage, Position,
    StorageRegistry, User, UserStorage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ServiceError, ServiceResult};

// ============================================================================
// REQUESTS / RESPONSES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StorageRequest {
    GetUser {
        license: String,
    },
    GetUserById {
        id: i64,
    },
    CreateUser {
        license: String,
        username: String,
        #[serde(default)]
        discord: Option<String>,
    },
    UpdateUsername {
        license: String,
        username: String,
    },
    TouchLastSeen {
        license: String,
    },
    AddPlaytime {
        license: String,
        seconds: i64,
    },

    GetCharacter {
        id: i64,
    },
    GetCharacterFull {
        id: i64,
    },
    ListCharacters {
        user_id: i64,
    },
    CreateCharacter {
        user_id: i64,
        first_name: String,
        last_name: String,
        #[serde(default)]
        gender: Option<String>,
        #[serde(default)]
        date_of_birth: Option<String>,
    },
    UpdateJob {
        id: i64,
        job: String,
        job_grade: i32,
    },
    UpdateMoney {
        id: i64,
        cash: i64,
        bank: i64,
    },
    UpdatePosition {
        id: i64,
        position: Position,
    },
    DeleteCharacter {
        id: i64,
    },

    GetActivePenalty {
        user_id: i64,
    },
    IsBanned {
        user_id: i64,
    },
    IssuePenalty {
        user_id: i64,
        kind: PenaltyKind,
        reason: String,
        issued_by: String,
        /// Omit for a permanent penalty.
        #[serde(default)]
        duration_secs: Option<u64>,
    },
    RevokePenalty {
        id: i64,
        revoked_by: String,
    },

    WriteLog {
        category: String,
        action: String,
        #[serde(default)]
        actor: Option<String>,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        data: JsonValue,
    },

    Health,
}

impl StorageRequest {
    /// Registry name of the storage that serves this request. `None` for
    /// requests answered by the registry itself.
    pub fn storage(&self) -> Option<&'static str> {
        use StorageRequest::*;
        match self {
            GetUser { .. }
            | GetUserById { .. }
            | CreateUser { .. }
            | UpdateUsername { .. }
            | TouchLastSeen { .. }
            | AddPlaytime { .. } => Some(user::NAME),
            GetCharacter { .. }
            | GetCharacterFull { .. }
            | ListCharacters { .. }
            | CreateCharacter { .. }
            | UpdateJob { .. }
            | UpdateMoney { .. }
            | UpdatePosition { .. }
            | DeleteCharacter { .. } => Some(character::NAME),
            GetActivePenalty { .. }
            | IsBanned { .. }
            | IssuePenalty { .. }
            | RevokePenalty { .. } => Some(penalty::NAME),
            WriteLog { .. } => Some(log::NAME),
            Health => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StorageResponse {
    User(Option<User>),
    Character(Option<Character>),
    CharacterFull(Option<CharacterFull>),
    Characters(Vec<Character>),
    Penalty(Option<Penalty>),
    Banned(bool),
    /// Whether a write matched a row.
    Updated(bool),
    LogWritten(i64),
    Health(Vec<HealthCheck>),
}

// ============================================================================
// CLIENT
// ============================================================================

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn call(&self, request: StorageRequest) -> ServiceResult<StorageResponse>;

    /// Whether a storage is registered under `name`.
    fn has_storage(&self, name: &str) -> bool;
}

/// In-process client dispatching straight to the registry.
#[derive(Clone)]
pub struct LocalStorageClient {
    registry: Arc<StorageRegistry>,
}

impl LocalStorageClient {
    pub fn new(registry: Arc<StorageRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<StorageRegistry> {
        &self.registry
    }

    fn storage<T: ManagedStorage>(&self, name: &str) -> ServiceResult<Arc<T>> {
        self.registry
            .get_as::<T>(name)
            .ok_or_else(|| ServiceError::storage_not_found(name))
    }

    fn users(&self) -> ServiceResult<Arc<UserStorage>> {
        self.storage(user::NAME)
    }

    fn characters(&self) -> ServiceResult<Arc<CharacterStorage>> {
        self.storage(character::NAME)
    }

    fn penalties(&self) -> ServiceResult<Arc<PenaltyStorage>> {
        self.storage(penalty::NAME)
    }

    fn logs(&self) -> ServiceResult<Arc<LogStorage>> {
        self.storage(log::NAME)
    }
}

#[async_trait]
impl StorageClient for LocalStorageClient {
    async fn call(&self, request: StorageRequest) -> ServiceResult<StorageResponse> {
        use StorageRequest::*;

        let response = match request {
            GetUser { license } => {
                StorageResponse::User(self.users()?.get_by_license(&license).await?)
            }
            GetUserById { id } => StorageResponse::User(self.users()?.get_by_id(id).await?),
            CreateUser {
                license,
                username,
                discord,
            } => StorageResponse::User(Some(
                self.users()?
                    .create_user(NewUser {
                        license,
                        username,
                        discord,
                    })
                    .await?,
            )),
            UpdateUsername { license, username } => StorageResponse::Updated(
                self.users()?.update_username(&license, &username).await?,
            ),
            TouchLastSeen { license } => {
                StorageResponse::Updated(self.users()?.touch_last_seen(&license).await?)
            }
            AddPlaytime { license, seconds } => {
                StorageResponse::Updated(self.users()?.add_playtime(&license, seconds).await?)
            }

            GetCharacter { id } => {
                StorageResponse::Character(self.characters()?.get_by_id(id).await?)
            }
            GetCharacterFull { id } => {
                StorageResponse::CharacterFull(self.characters()?.get_full(id).await?)
            }
            ListCharacters { user_id } => {
                StorageResponse::Characters(self.characters()?.list_by_user(user_id).await?)
            }
            CreateCharacter {
                user_id,
                first_name,
                last_name,
                gender,
                date_of_birth,
            } => StorageResponse::Character(Some(
                self.characters()?
                    .create_character(NewCharacter {
                        user_id,
                        first_name,
                        last_name,
                        gender,
                        date_of_birth,
                    })
                    .await?,
            )),
            UpdateJob { id, job, job_grade } => StorageResponse::Updated(
                self.characters()?.update_job(id, &job, job_grade).await?,
            ),
            UpdateMoney { id, cash, bank } => {
                StorageResponse::Updated(self.characters()?.update_money(id, cash, bank).await?)
            }
            UpdatePosition { id, position } => StorageResponse::Updated(
                self.characters()?.update_position(id, position).await?,
            ),
            DeleteCharacter { id } => {
                StorageResponse::Updated(self.characters()?.delete_character(id).await?)
            }

            GetActivePenalty { user_id } => StorageResponse::Penalty(
                self.penalties()?
                    .get_active_penalty_by_user_id(user_id)
                    .await?,
            ),
            IsBanned { user_id } => {
                StorageResponse::Banned(self.penalties()?.is_banned(user_id).await?)
            }
            IssuePenalty {
                user_id,
                kind,
                reason,
                issued_by,
                duration_secs,
            } => StorageResponse::Penalty(Some(
                self.penalties()?
                    .create_penalty(NewPenalty {
                        user_id,
                        kind,
                        reason,
                        issued_by,
                        duration: duration_secs.map(Duration::from_secs),
                    })
                    .await?,
            )),
            RevokePenalty { id, revoked_by } => StorageResponse::Updated(
                self.penalties()?.revoke_penalty(id, &revoked_by).await?,
            ),

            WriteLog {
                category,
                action,
                actor,
                target,
                data,
            } => StorageResponse::LogWritten(
                self.logs()?
                    .write(NewLogEntry {
                        category,
                        action,
                        actor,
                        target,
                        data,
                    })
                    .await?,
            ),

            Health => StorageResponse::Health(self.registry.health()),
        };
        Ok(response)
    }

    fn has_storage(&self, name: &str) -> bool {
        self.registry.has(name)
    }
}
