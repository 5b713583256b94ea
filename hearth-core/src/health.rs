//! Health reporting for storages and their adapters.

use serde::{Deserialize, Serialize};

/// Health status for a storage or adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every dependency reports ready
    Healthy,
    /// Some dependency is not ready
    Unhealthy,
}

/// Health check result for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    pub message: Option<String>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            message: Some(message.into()),
        }
    }

    /// Build a check from the readiness flags of a database and a cache.
    pub fn from_readiness(component: impl Into<String>, db_ready: bool, cache_ready: bool) -> Self {
        match (db_ready, cache_ready) {
            (true, true) => Self::healthy(component),
            (false, true) => Self::unhealthy(component, "database not ready"),
            (true, false) => Self::unhealthy(component, "cache not ready"),
            (false, false) => Self::unhealthy(component, "database and cache not ready"),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_readiness() {
        assert!(HealthCheck::from_readiness("users", true, true).is_healthy());

        let check = HealthCheck::from_readiness("users", false, true);
        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert_eq!(check.message.as_deref(), Some("database not ready"));

        let check = HealthCheck::from_readiness("users", true, false);
        assert_eq!(check.message.as_deref(), Some("cache not ready"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Healthy).unwrap();
        assert_eq!(json, "\"healthy\"");
    }
}
