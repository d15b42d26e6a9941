//! Tracing Subscriber Initialization
//!
//! Structured logs go to stdout through `tracing-subscriber`, filtered by
//! `RUST_LOG`. JSON output is the default; `CAMPUS_LOG_FORMAT=pretty`
//! switches to human-readable lines for local work.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "campus_api=debug,tower_http=debug,info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub service_name: String,
    pub environment: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: "campus-api".to_string(),
            environment: "development".to_string(),
            json: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("CAMPUS_SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: std::env::var("CAMPUS_ENVIRONMENT").unwrap_or(defaults.environment),
            json: std::env::var("CAMPUS_LOG_FORMAT")
                .map(|f| !f.eq_ignore_ascii_case("pretty"))
                .unwrap_or(defaults.json),
        }
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        environment = config.environment,
        "Logging initialized"
    );
    Ok(())
}
