//! Server Configuration Module
//!
//! Listener, CORS and event-bus settings. Configuration is loaded from
//! environment variables with defaults suitable for local development.

use std::net::SocketAddr;

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_CORS_ORIGINS, DEFAULT_EVENT_CAPACITY,
    DEFAULT_PORT,
};
use crate::error::{ApiError, ApiResult};

/// Whether `CAMPUS_ENVIRONMENT` names a production deployment.
pub fn is_production_environment() -> bool {
    std::env::var("CAMPUS_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

/// Server configuration for the listener, CORS and the event bus.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,

    pub port: u16,

    /// Allowed CORS origins. Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Capacity of the domain event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
            cors_allow_credentials: true,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: listening port (default: 10000)
    /// - `CAMPUS_BIND`: bind host (default: 0.0.0.0)
    /// - `CAMPUS_CORS_ORIGINS`: comma-separated allowed origins
    /// - `CAMPUS_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: true)
    /// - `CAMPUS_EVENT_CAPACITY`: event channel capacity (default: 1024)
    ///
    /// # Errors
    /// Returns an error if `PORT` is set but is not a valid port number.
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();

        let port = match std::env::var("PORT") {
            Ok(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", value)))?,
            Err(_) => defaults.port,
        };

        let cors_origins = std::env::var("CAMPUS_CORS_ORIGINS")
            .ok()
            .map(|s| parse_origins(&s))
            .unwrap_or(defaults.cors_origins);

        let cors_allow_credentials = std::env::var("CAMPUS_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.cors_allow_credentials);

        let event_capacity = std::env::var("CAMPUS_EVENT_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|c| *c > 0)
            .unwrap_or(defaults.event_capacity);

        Ok(Self {
            bind_host: std::env::var("CAMPUS_BIND").unwrap_or(defaults.bind_host),
            port,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: defaults.cors_max_age_secs,
            event_capacity,
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })
    }

    /// Production deployments must name their CORS origins.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        if is_production_environment() && self.cors_origins.is_empty() {
            return Err(ApiError::invalid_input(
                "CORS origins not configured for production. Set CAMPUS_CORS_ORIGINS.",
            ));
        }
        Ok(())
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty()
            || self
                .cors_origins
                .iter()
                .any(|allowed| allowed.trim_end_matches('/') == origin.trim_end_matches('/'))
    }
}

/// Split a comma-separated origin list, dropping blanks and trailing slashes.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
