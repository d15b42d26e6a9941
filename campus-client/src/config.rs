//! Configuration loading for the SmartCampus client.
//!
//! Read from a TOML file when `CAMPUS_CLIENT_CONFIG` points at one, otherwise
//! from environment variables over built-in defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HTTP_URL: &str = "http://localhost:5000/graphql";
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000/graphql";
pub const DEFAULT_STORAGE_PATH: &str = "campus-client-storage.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub http_url: String,
    pub ws_url: String,
    /// JSON file backing the token storage.
    pub storage_path: PathBuf,
    pub request_timeout_ms: u64,
    pub websocket: WebSocketConfig,
}

/// Subscription connection policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebSocketConfig {
    /// Consecutive failed connection attempts tolerated before giving up.
    pub retry_attempts: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub retry_multiplier: f64,
    pub retry_jitter_ms: u64,
    /// How long an idle connection stays open after the last unsubscribe.
    pub lazy_close_timeout_ms: u64,
    pub ack_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_url: DEFAULT_HTTP_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            request_timeout_ms: 30_000,
            websocket: WebSocketConfig::default(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 10,
            retry_initial_ms: 1_000,
            retry_max_ms: 30_000,
            retry_multiplier: 2.0,
            retry_jitter_ms: 2_700,
            lazy_close_timeout_ms: 0,
            ack_timeout_ms: 10_000,
        }
    }
}

impl WebSocketConfig {
    pub fn lazy_close_timeout(&self) -> Duration {
        Duration::from_millis(self.lazy_close_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Delay before reconnect attempt `attempt` (1-based), without jitter.
    pub fn retry_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.retry_initial_ms as f64 * self.retry_multiplier.powi(exponent);
        (delay as u64).min(self.retry_max_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = match config_path_from_env() {
            Some(path) => Self::from_path(&path)?,
            None => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `CAMPUS_GRAPHQL_HTTP_URL`,
    /// `CAMPUS_GRAPHQL_WS_URL` and `CAMPUS_CLIENT_STORAGE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = non_empty_var("CAMPUS_GRAPHQL_HTTP_URL") {
            config.http_url = url;
        }
        if let Some(url) = non_empty_var("CAMPUS_GRAPHQL_WS_URL") {
            config.ws_url = url;
        }
        if let Some(path) = non_empty_var("CAMPUS_CLIENT_STORAGE") {
            config.storage_path = PathBuf::from(path);
        }
        config
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.http_url.starts_with("http://") || self.http_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "http_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                field: "ws_url",
                reason: "must start with ws:// or wss://".to_string(),
            });
        }
        if self.storage_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        let ws = &self.websocket;
        if ws.retry_initial_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "websocket.retry_initial_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if ws.retry_max_ms < ws.retry_initial_ms {
            return Err(ConfigError::InvalidValue {
                field: "websocket.retry_max_ms",
                reason: "must be >= retry_initial_ms".to_string(),
            });
        }
        if ws.retry_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "websocket.retry_multiplier",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if ws.ack_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "websocket.ack_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    non_empty_var("CAMPUS_CLIENT_CONFIG").map(PathBuf::from)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_defaults_point_at_local_server() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _http = EnvVarGuard::set("CAMPUS_GRAPHQL_HTTP_URL", None);
        let _ws = EnvVarGuard::set("CAMPUS_GRAPHQL_WS_URL", None);
        let _storage = EnvVarGuard::set("CAMPUS_CLIENT_STORAGE", None);

        let config = ClientConfig::from_env();
        assert_eq!(config.http_url, "http://localhost:5000/graphql");
        assert_eq!(config.ws_url, "ws://localhost:5000/graphql");
        assert_eq!(config.websocket.retry_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _http = EnvVarGuard::set("CAMPUS_GRAPHQL_HTTP_URL", Some("https://campus.example/graphql"));
        let _ws = EnvVarGuard::set("CAMPUS_GRAPHQL_WS_URL", Some("wss://campus.example/graphql"));
        let _storage = EnvVarGuard::set("CAMPUS_CLIENT_STORAGE", Some("/tmp/campus.json"));

        let config = ClientConfig::from_env();
        assert_eq!(config.http_url, "https://campus.example/graphql");
        assert_eq!(config.ws_url, "wss://campus.example/graphql");
        assert_eq!(config.storage_path, PathBuf::from("/tmp/campus.json"));
    }

    #[test]
    fn test_toml_partial_config_keeps_defaults() {
        let config = ClientConfig::from_toml(
            r#"
            http_url = "http://10.0.0.5:5000/graphql"

            [websocket]
            retry_attempts = 3
            "#,
        )
        .expect("parse");
        assert_eq!(config.http_url, "http://10.0.0.5:5000/graphql");
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.websocket.retry_attempts, 3);
        assert_eq!(config.websocket.retry_initial_ms, 1_000);
    }

    #[test]
    fn test_toml_rejects_unknown_fields() {
        assert!(matches!(
            ClientConfig::from_toml("tenant_id = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_urls_and_backoff() {
        let mut config = ClientConfig::default();
        config.ws_url = "http://localhost:5000/graphql".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "ws_url", .. })
        ));

        let mut config = ClientConfig::default();
        config.websocket.retry_max_ms = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "websocket.retry_max_ms", .. })
        ));
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let ws = WebSocketConfig::default();
        assert_eq!(ws.retry_delay_ms(1), 1_000);
        assert_eq!(ws.retry_delay_ms(2), 2_000);
        assert_eq!(ws.retry_delay_ms(3), 4_000);
        assert_eq!(ws.retry_delay_ms(10), 30_000);
    }
}
