//! Boot configuration.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    /// Per-storage readiness deadline during boot.
    pub storage_ready_timeout: Duration,
    /// Renew the database before migrating. Still subject to the renew
    /// gate in [`hearth_migrate::MigrationConfig`].
    pub renew_on_boot: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            storage_ready_timeout: Duration::from_secs(10),
            renew_on_boot: false,
        }
    }
}

impl BootConfig {
    /// Load from environment variables.
    ///
    /// - `HEARTH_STORAGE_READY_TIMEOUT_MS` (default: 10000)
    /// - `HEARTH_RENEW_ON_BOOT` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_ready_timeout: std::env::var("HEARTH_STORAGE_READY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.storage_ready_timeout),
            renew_on_boot: std::env::var("HEARTH_RENEW_ON_BOOT")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.renew_on_boot),
        }
    }
}
