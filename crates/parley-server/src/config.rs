//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - TOML configuration file
//! - Environment variables (`PARLEY_*`, nested keys joined with `__`)

use anyhow::{Context, Result};
use parley_core::{HubConfig, DEFAULT_COMMAND_CAPACITY, DEFAULT_HISTORY_CAPACITY, DEFAULT_INBOX_CAPACITY};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PARLEY";

/// Places searched for a config file when none is given.
pub const CONFIG_PATHS: [&str; 3] = [
    "parley.toml",
    "/etc/parley/parley.toml",
    "~/.config/parley/parley.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay between a termination signal and the start of shutdown.
    #[serde(default)]
    pub graceful_term_ms: u64,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Broadcast hub sizing.
    #[serde(default)]
    pub hub: HubSettings,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Install a log subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// One of `ERROR`, `WARNING`, `INFO`, `DEBUG`, `TRACE`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Broadcast hub sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Recent events replayed to new connections.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Events buffered per connection before the oldest are dropped.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    /// Hub commands buffered before publishers wait.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Directory of static files served on every other path.
    #[serde(default = "default_asset_dir")]
    pub asset_dir: PathBuf,

    /// Maximum accepted frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_inbox_capacity() -> usize {
    DEFAULT_INBOX_CAPACITY
}

fn default_command_capacity() -> usize {
    DEFAULT_COMMAND_CAPACITY
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("./asset")
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            graceful_term_ms: 0,
            logging: LoggingConfig::default(),
            hub: HubSettings::default(),
            transport: TransportConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            inbox_capacity: default_inbox_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            asset_dir: default_asset_dir(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        HubConfig {
            history_capacity: settings.history_capacity,
            inbox_capacity: settings.inbox_capacity,
            command_capacity: settings.command_capacity,
        }
    }
}

impl LoggingConfig {
    /// `tracing` filter directive for the configured level.
    ///
    /// Unknown levels fall back to `info`.
    #[must_use]
    pub fn filter_directive(&self) -> &'static str {
        match self.level.to_ascii_uppercase().as_str() {
            "ERROR" => "error",
            "WARNING" | "WARN" => "warn",
            "DEBUG" => "debug",
            "TRACE" => "trace",
            _ => "info",
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Uses `path` if given, otherwise the first existing entry of
    /// [`CONFIG_PATHS`], otherwise defaults. Environment overrides apply in
    /// every case.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or parsed, or if a
    /// value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };
        Self::from_sources(file.as_deref(), environment())
    }

    fn from_sources(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let settings = builder.add_source(env).build().with_context(|| match file {
            Some(path) => format!("Failed to read config file: {}", path.display()),
            None => "Failed to read configuration".to_string(),
        })?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("No address found for {}:{}", self.host, self.port))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}
