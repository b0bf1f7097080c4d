//! Configuration for the DWR exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable that overrides `scrape.max_workers`.
pub const MAX_WORKERS_ENV: &str = "DWR_MAX_WORKERS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP exposition endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Scrape orchestration settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:8001").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for the metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8001".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Scrape orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Path to the gauge list file (JSON5 list of gauge descriptors).
    #[serde(default = "default_gauges_file")]
    pub gauges_file: String,

    /// Maximum concurrent gauge fetches per cycle.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-attempt HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Base URL of the DWR telemetry time series endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_gauges_file() -> String {
    "/config/dwr_gauges.json5".to_string()
}

fn default_max_workers() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    10
}

fn default_base_url() -> String {
    "https://dwr.state.co.us/Rest/GET/api/v2/telemetrystations/telemetrytimeseriesraw".to_string()
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            gauges_file: default_gauges_file(),
            max_workers: default_max_workers(),
            request_timeout_secs: default_request_timeout(),
            base_url: default_base_url(),
        }
    }
}

impl ScrapeConfig {
    /// Apply the `DWR_MAX_WORKERS` environment override, if set.
    ///
    /// An unparseable value is ignored with a warning rather than failing
    /// startup.
    pub fn apply_env_override(&mut self) {
        if let Ok(raw) = std::env::var(MAX_WORKERS_ENV) {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => self.max_workers = n,
                _ => {
                    tracing::warn!(
                        value = %raw,
                        "Ignoring invalid {} value",
                        MAX_WORKERS_ENV
                    );
                }
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        if !self.http.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.scrape.max_workers == 0 {
            return Err(ConfigError::Validation(
                "max_workers must be > 0".to_string(),
            ));
        }

        if self.scrape.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            scrape: ScrapeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
