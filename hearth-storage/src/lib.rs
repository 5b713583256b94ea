//! Hearth Storage Layer
//!
//! Cache-aside data access for the game server. Provides:
//!
//! - [`DatabaseAdapter`] and [`CacheAdapter`]: the two narrow contracts every
//!   storage is built on
//! - cache adapters ([`MemoryCache`], [`LmdbCache`]) that fail open
//! - [`BaseStorage`]: the generic read-through / write-then-adjust primitive
//! - the user, character, penalty and log storages
//! - [`StorageRegistry`] and [`boot_storages`] for readiness-gated startup
//! - [`MockDatabase`] for tests

pub mod adapter;
pub mod base;
pub mod boot;
pub mod cache;
pub mod domain;
pub mod mock;
pub mod registry;

pub use adapter::{CacheAdapter, DatabaseAdapter};
pub use base::{
    BaseStorage, CacheOptions, CreateOptions, DeleteOptions, QueryOptions, ReadOptions,
    UpdateOptions,
};
pub use boot::{boot_storages, BootReport};
pub use cache::{CacheSettings, CacheStats, GlobPattern, LmdbCache, LmdbCacheError, MemoryCache};
pub use domain::{
    Character, CharacterFull, CharacterStorage, LogEntry, LogStorage, NewCharacter, NewLogEntry,
    NewPenalty, NewUser, Penalty, PenaltyKind, PenaltyStorage, Position, User, UserStorage,
};
pub use mock::{MockCall, MockDatabase, MockMethod};
pub use registry::{ManagedStorage, StorageRegistry};
