//! Configuration management
//!
//! Handles TOML configuration parsing, defaults and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECONNECT_MAX_MS, DEFAULT_RECONNECT_MIN_MS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STALL_TICKS, DEFAULT_START_DELAY_MS,
    DEFAULT_STOP_DELAY_MS, POLL_INTERVAL_MAX_MS, POLL_INTERVAL_MIN_MS, SOCKETIO_PATH,
};
use crate::logging::LogLevel;
use crate::summary::SummaryTagTypes;

/// Validation errors for configuration values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Note: bounds must match POLL_INTERVAL_MIN_MS/MAX_MS in constants.rs
    #[error("Invalid polling interval: {0}ms. Must be between 100 and 300000 milliseconds")]
    InvalidPollInterval(u64),

    #[error("Invalid stall tick count: {0}. Must be at least 1")]
    InvalidStallTicks(u64),

    #[error("Invalid reconnect delay: minimum must be at least 1 millisecond")]
    ZeroReconnectDelay,

    #[error("Invalid reconnect bounds: minimum {min}ms exceeds maximum {max}ms")]
    InvalidReconnectBounds { min: u64, max: u64 },

    #[error("Invalid server URL '{0}': {1}")]
    InvalidServerUrl(String, String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfiguration {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub summary: SummaryTagTypes,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where and how to reach the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the platform, e.g. `https://analysis.example.com`
    #[serde(default = "default_url")]
    pub url: String,
    pub username: Option<String>,
    pub apikey: Option<String>,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Timing of the live pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_start_delay")]
    pub start_delay_ms: u64,
    #[serde(default = "default_stop_delay")]
    pub stop_delay_ms: u64,
    #[serde(default = "default_stall_ticks")]
    pub stall_ticks: u64,
    #[serde(default = "default_reconnect_min")]
    pub reconnect_min_ms: u64,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
}

/// Log sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,
    /// Send logs to the macOS Unified Logging System instead of stderr
    #[serde(default)]
    pub unified: bool,
}

fn default_url() -> String { "https://localhost".to_string() }
fn default_true() -> bool { true }
fn default_request_timeout() -> u64 { DEFAULT_REQUEST_TIMEOUT_SECS }
fn default_poll_interval() -> u64 { DEFAULT_POLL_INTERVAL_MS }
fn default_start_delay() -> u64 { DEFAULT_START_DELAY_MS }
fn default_stop_delay() -> u64 { DEFAULT_STOP_DELAY_MS }
fn default_stall_ticks() -> u64 { DEFAULT_STALL_TICKS }
fn default_reconnect_min() -> u64 { DEFAULT_RECONNECT_MIN_MS }
fn default_reconnect_max() -> u64 { DEFAULT_RECONNECT_MAX_MS }

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            apikey: None,
            verify_tls: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            start_delay_ms: DEFAULT_START_DELAY_MS,
            stop_delay_ms: DEFAULT_STOP_DELAY_MS,
            stall_ticks: DEFAULT_STALL_TICKS,
            reconnect_min_ms: DEFAULT_RECONNECT_MIN_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            unified: false,
        }
    }
}

impl ServerSettings {
    /// Base URL with a trailing slash so relative endpoints join under it
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidServerUrl(self.url.clone(), reason.to_string());

        let mut url = Url::parse(&self.url).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid("scheme must be http or https"));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// WebSocket URL of the Socket.IO endpoint
    pub fn socket_url(&self) -> Result<Url, ConfigError> {
        let base = self.base_url()?;
        let mut url = base
            .join(SOCKETIO_PATH.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidServerUrl(self.url.clone(), e.to_string()))?;

        let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::InvalidServerUrl(self.url.clone(), "cannot derive socket URL".to_string()))?;
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        Ok(url)
    }

    /// `Authorization` header value when API key credentials are configured
    pub fn authorization(&self) -> Option<String> {
        match (&self.username, &self.apikey) {
            (Some(user), Some(key)) => Some(format!("Bearer {}:{}", user, key)),
            _ => None,
        }
    }
}

impl LiveSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_millis(self.stop_delay_ms)
    }

    pub fn reconnect_min(&self) -> Duration {
        Duration::from_millis(self.reconnect_min_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

impl WatchConfiguration {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: WatchConfiguration = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, or the default one if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_config_path() {
                Ok(default_path) if default_path.exists() => Self::load_from_file(&default_path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// `<config dir>/subwatch/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Could not determine configuration directory")?;
        Ok(dir.join("subwatch").join("config.toml"))
    }

    /// Check value bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        let live = &self.live;
        if !(POLL_INTERVAL_MIN_MS..=POLL_INTERVAL_MAX_MS).contains(&live.poll_interval_ms) {
            return Err(ConfigError::InvalidPollInterval(live.poll_interval_ms));
        }
        if live.stall_ticks == 0 {
            return Err(ConfigError::InvalidStallTicks(live.stall_ticks));
        }
        if live.reconnect_min_ms == 0 {
            return Err(ConfigError::ZeroReconnectDelay);
        }
        if live.reconnect_min_ms > live.reconnect_max_ms {
            return Err(ConfigError::InvalidReconnectBounds {
                min: live.reconnect_min_ms,
                max: live.reconnect_max_ms,
            });
        }
        self.server.base_url()?;
        Ok(())
    }
}
