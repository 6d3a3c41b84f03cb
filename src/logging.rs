//! Structured logging for the watch controller
//!
//! Library code logs through the `log` facade. `WatchLogger` adds structured
//! JSON events on top, and `init_logging` installs the process-wide sink.

use anyhow::Result;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

use crate::models::LiveStatus;

/// Log levels for watch operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    fn filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => anyhow::bail!("Invalid log level: {}", s),
        }
    }
}

/// Install the process-wide log sink.
///
/// `RUST_LOG` takes precedence over the configured level. On macOS the
/// Unified Logging System can be used instead of stderr.
pub fn init_logging(level: LogLevel, unified: bool) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        if unified {
            let logger = oslog::OsLogger::new(crate::constants::APP_SUBSYSTEM);
            log::set_boxed_logger(Box::new(logger))
                .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;
            log::set_max_level(level.filter());
            return Ok(());
        }
    }

    #[cfg(not(target_os = "macos"))]
    {
        if unified {
            anyhow::bail!("Unified Logging only available on macOS");
        }
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;
    Ok(())
}

/// Structured event logger for one watch
#[derive(Debug, Clone)]
pub struct WatchLogger {
    level: LogLevel,
}

impl WatchLogger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    pub fn log_watch_started(&self, sid: &str, live: bool) {
        let message = json!({
            "event": "watch_started",
            "sid": sid,
            "live": live,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Info, &format!("Watching submission {}", sid), &message);
    }

    pub fn log_status_change(&self, sid: &str, from: LiveStatus, to: LiveStatus) {
        let message = json!({
            "event": "status_changed",
            "sid": sid,
            "from": from,
            "to": to,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Info, &format!("Live status {} -> {}", from, to), &message);
    }

    pub fn log_watch_queue(&self, sid: &str, wq_id: &str) {
        let message = json!({
            "event": "watch_queue_registered",
            "sid": sid,
            "wq_id": wq_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Debug, "Watch queue registered", &message);
    }

    pub fn log_results_merged(&self, sid: &str, results: usize, errors: usize, load_trigger: u64) {
        let message = json!({
            "event": "results_merged",
            "sid": sid,
            "results": results,
            "errors": errors,
            "load_trigger": load_trigger,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(
            LogLevel::Info,
            &format!("Merged {} results and {} errors", results, errors),
            &message,
        );
    }

    pub fn log_outstanding(&self, sid: &str, services: &crate::models::OutstandingServices) {
        let message = json!({
            "event": "outstanding_services",
            "sid": sid,
            "services": services,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Debug, "Outstanding services checked", &message);
    }

    pub fn log_channel_error(&self, sid: &str, detail: &str) {
        let message = json!({
            "event": "channel_error",
            "sid": sid,
            "message": detail,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Warn, &format!("Live channel error: {}", detail), &message);
    }

    pub fn log_completed(&self, sid: &str, load_trigger: u64) {
        let message = json!({
            "event": "watch_completed",
            "sid": sid,
            "load_trigger": load_trigger,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Info, &format!("Submission {} completed", sid), &message);
    }

    pub fn log_error(&self, error_message: &str, context: Option<&str>) {
        let message = json!({
            "event": "error",
            "message": error_message,
            "context": context,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Error, error_message, &message);
    }

    /// Emit a message with its structured payload through the `log` facade
    fn log_structured(&self, level: LogLevel, message: &str, data: &serde_json::Value) {
        if !self.should_log(level) {
            return;
        }

        let full_message = format!("{} | {}", message, data);
        match level {
            LogLevel::Error => error!("{}", full_message),
            LogLevel::Warn => warn!("{}", full_message),
            LogLevel::Info => info!("{}", full_message),
            LogLevel::Debug => debug!("{}", full_message),
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        level <= self.level
    }
}
