//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ServiceError, ServiceResult};

const DEFAULT_FILTER: &str = "hearth=info,info";

/// Install the global subscriber. Call once, before anything logs.
///
/// `RUST_LOG` overrides the default filter. `HEARTH_LOG_FORMAT=json` switches
/// to JSON lines.
pub fn init_tracing() -> ServiceResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("HEARTH_LOG_FORMAT")
        .map(|s| s.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| ServiceError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(json, "Telemetry initialized");
    Ok(())
}
