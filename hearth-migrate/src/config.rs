//! Migration runner configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment name that unlocks destructive renew.
pub const DEVELOPMENT: &str = "development";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Directory holding `<digits>_<name>.sql` files.
    pub dir: PathBuf,
    /// How long to wait for the database before giving up on a run.
    pub ready_timeout: Duration,
    /// Schemas wiped by renew and recreated afterwards.
    pub managed_schemas: Vec<String>,
    pub environment: String,
    /// Second switch for renew; both this and a development environment
    /// are required.
    pub allow_renew: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
            ready_timeout: Duration::from_secs(30),
            managed_schemas: vec!["public".to_string()],
            environment: "production".to_string(),
            allow_renew: false,
        }
    }
}

impl MigrationConfig {
    /// Load from environment variables.
    ///
    /// - `HEARTH_MIGRATIONS_DIR` (default: `migrations`)
    /// - `HEARTH_MIGRATION_READY_TIMEOUT_MS` (default: 30000)
    /// - `HEARTH_MANAGED_SCHEMAS`: comma separated (default: `public`)
    /// - `HEARTH_ENVIRONMENT` (default: `production`)
    /// - `HEARTH_ALLOW_DB_RENEW` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dir: std::env::var("HEARTH_MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.dir),
            ready_timeout: std::env::var("HEARTH_MIGRATION_READY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.ready_timeout),
            managed_schemas: std::env::var("HEARTH_MANAGED_SCHEMAS")
                .ok()
                .map(|s| parse_schemas(&s))
                .filter(|schemas| !schemas.is_empty())
                .unwrap_or(defaults.managed_schemas),
            environment: std::env::var("HEARTH_ENVIRONMENT").unwrap_or(defaults.environment),
            allow_renew: std::env::var("HEARTH_ALLOW_DB_RENEW")
                .map(|s| s.eq_ignore_ascii_case("true") || s == "1")
                .unwrap_or(false),
        }
    }

    /// Renew needs a development environment and the explicit flag.
    pub fn renew_allowed(&self) -> bool {
        self.allow_renew && self.environment.eq_ignore_ascii_case(DEVELOPMENT)
    }
}

fn parse_schemas(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_disabled_by_default() {
        assert!(!MigrationConfig::default().renew_allowed());
    }

    #[test]
    fn test_renew_needs_both_switches() {
        let flag_only = MigrationConfig {
            allow_renew: true,
            ..Default::default()
        };
        assert!(!flag_only.renew_allowed());

        let dev_only = MigrationConfig {
            environment: "development".into(),
            ..Default::default()
        };
        assert!(!dev_only.renew_allowed());

        let both = MigrationConfig {
            environment: "Development".into(),
            allow_renew: true,
            ..Default::default()
        };
        assert!(both.renew_allowed());
    }

    #[test]
    fn test_parse_schemas() {
        assert_eq!(parse_schemas(" public, game ,,audit"), vec!["public", "game", "audit"]);
        assert!(parse_schemas(" , ").is_empty());
    }
}
