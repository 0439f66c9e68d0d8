//! Gateway configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pub-sub topics and channel sizes.
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    /// External image classifier.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Settings passthrough to field devices.
    #[serde(default)]
    pub devices: DevicesConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "fieldgate_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Topic the devices publish their events on.
    #[serde(default = "default_subscribe_topic")]
    pub subscribe_topic: String,

    /// Alerts go to `<alert_topic_base>/<client_id>`.
    #[serde(default = "default_alert_topic_base")]
    pub alert_topic_base: String,

    #[serde(default = "default_channel_capacity")]
    pub inbound_capacity: usize,

    #[serde(default = "default_channel_capacity")]
    pub outbound_capacity: usize,

    /// Inbound messages handled concurrently before the pipeline stops
    /// reading from the channel.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    /// Seconds between probe cycles; 0 disables the monitor.
    #[serde(default = "default_liveness_interval")]
    pub interval_seconds: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_url")]
    pub url: String,

    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicesConfig {
    #[serde(default = "default_device_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "client_data.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_subscribe_topic() -> String {
    "uol/uol-cm3070-mod11".to_string()
}

fn default_alert_topic_base() -> String {
    "uol/uol-cm3070-mod11/sub".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    64
}

fn default_liveness_interval() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_classifier_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_classifier_timeout_ms() -> u64 {
    10_000
}

fn default_device_timeout_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            subscribe_topic: default_subscribe_topic(),
            alert_topic_base: default_alert_topic_base(),
            inbound_capacity: default_channel_capacity(),
            outbound_capacity: default_channel_capacity(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_liveness_interval(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: default_classifier_url(),
            timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_device_timeout_ms(),
        }
    }
}

impl LivenessConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DevicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `FIELDGATE_HOST` overrides `server.host`
/// - `FIELDGATE_PORT` overrides `server.port`
/// - `FIELDGATE_DB_PATH` overrides `database.path`
/// - `FIELDGATE_LOG_LEVEL` overrides `logging.level`
/// - `FIELDGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `FIELDGATE_CLASSIFIER_URL` overrides `classifier.url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("FIELDGATE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("FIELDGATE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("FIELDGATE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("FIELDGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("FIELDGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(url) = var("FIELDGATE_CLASSIFIER_URL") {
        config.classifier.url = url;
    }
}
