//! Hearth Server - Boot and Service Boundary
//!
//! Wires the persistence core into a running process: telemetry, database
//! and cache adapters, migrations, readiness-gated storage registration,
//! and the typed [`StorageClient`] other game components call through.

pub mod boot;
pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use boot::{boot, domain_storages, BootOutcome};
pub use config::BootConfig;
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use service::{LocalStorageClient, StorageClient, StorageRequest, StorageResponse};
pub use telemetry::init_tracing;
