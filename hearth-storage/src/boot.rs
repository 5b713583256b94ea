//! Storage boot sequence.
//!
//! Storages are awaited one at a time, each with its own timeout, and
//! registered only after they report ready. The first storage that misses
//! its deadline halts the sequence; storages after it are never registered.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::{ManagedStorage, StorageRegistry};

/// Outcome of [`boot_storages`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    /// Names registered, in boot order.
    pub registered: Vec<String>,
    /// The storage that halted the boot, if any.
    pub failed: Option<String>,
}

impl BootReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

pub async fn boot_storages(
    registry: &StorageRegistry,
    storages: Vec<Arc<dyn ManagedStorage>>,
    timeout: Duration,
) -> BootReport {
    let mut report = BootReport::default();

    for storage in storages {
        let name = storage.name().to_string();
        if !storage.base().await_ready(timeout).await {
            tracing::error!(
                storage = %name,
                timeout_ms = timeout.as_millis() as u64,
                "storage not ready, halting storage boot"
            );
            report.failed = Some(name);
            break;
        }
        registry.register(name.clone(), storage);
        report.registered.push(name);
    }

    tracing::info!(
        registered = report.registered.len(),
        complete = report.is_complete(),
        "storage boot finished"
    );
    report
}
