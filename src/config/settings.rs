use serde::Deserialize;

use crate::utils::constants::{
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_TOKEN_LIFETIME_SECS, MIN_SAFETY_MARGIN_SECS,
};

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(default = "default_safety_margin_seconds")]
    pub safety_margin_seconds: u64,
    /// used when the issued token exposes no expiry of its own
    #[serde(default = "default_lifetime_seconds")]
    pub default_lifetime_seconds: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub server: Option<ServerConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            safety_margin_seconds: default_safety_margin_seconds(),
            default_lifetime_seconds: default_lifetime_seconds(),
            http_timeout_ms: default_http_timeout_ms(),
            retry: None,
            metrics: MetricsConfig::default(),
            server: None,
            logging: None,
        }
    }
}

/// Retry policy applied by callers of the token manager, never inside it.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    /// will be mutiply by 2 on every attempt until max_delay_ms
    pub base_delay_ms: Option<u64>,
    /// invariant: >= base_delay_ms
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info".to_owned(), LogFormat::Compact)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_safety_margin_seconds() -> u64 {
    MIN_SAFETY_MARGIN_SECS
}

fn default_lifetime_seconds() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

fn default_http_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
