//! Hearth PostgreSQL adapter
//!
//! Implements [`hearth_storage::DatabaseAdapter`] on a deadpool-postgres
//! pool. Queries keep their `:name` placeholders; this crate rewrites them,
//! binds JSON parameters by the server-inferred types and decodes rows back
//! into attribute maps.

pub mod adapter;
pub mod config;
pub mod params;
pub mod rows;

pub use adapter::PgDatabase;
pub use config::DbConfig;
pub use params::{rewrite, PositionalQuery};
