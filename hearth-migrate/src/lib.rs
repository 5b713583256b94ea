//! Hearth Migrations
//!
//! Forward-only schema migrations. Files named `<digits>_<name>.sql` are
//! applied in numeric version order, each outcome is recorded in the
//! `schema_migrations` table, and a file edited after it was applied is
//! refused rather than re-run.
//!
//! ```no_run
//! # async fn run(db: std::sync::Arc<dyn hearth_storage::DatabaseAdapter>) {
//! use hearth_migrate::{MigrationConfig, MigrationRunner};
//!
//! let runner = MigrationRunner::new(db, MigrationConfig::from_env());
//! let report = runner.run_pending().await;
//! if !report.success {
//!     eprintln!("migrations halted at {:?}", report.halted_at);
//! }
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod discovery;
pub mod history;
pub mod renew;
pub mod runner;

pub use checksum::checksum;
pub use config::MigrationConfig;
pub use discovery::{discover, MigrationFile};
pub use history::MigrationRecord;
pub use runner::{
    MigrationOutcome, MigrationResult, MigrationRunner, MigrationState, MigrationStatus,
    RunReport,
};
