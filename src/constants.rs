//! Global constants for subwatch
//!
//! Centralized location for protocol names, endpoint paths and timing defaults

/// Application subsystem identifier for macOS Unified Logging System
pub const APP_SUBSYSTEM: &str = "com.subwatch.live";

/// Streaming namespace for live submission messages
pub const LIVE_NAMESPACE: &str = "/live_submission";

/// Socket.IO endpoint path, relative to the server URL
pub const SOCKETIO_PATH: &str = "/socket.io/";

/// Length of the content hash prefix of every result/error key
pub const FILE_HASH_LEN: usize = 64;

/// Name of the pseudo-parent holding extracted files whose parent is unknown
pub const TBD_NODE: &str = "TBD";

/// Polling period of the reconciler
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Delay between a `start` message and the fetch it triggers
pub const DEFAULT_START_DELAY_MS: u64 = 500;

/// Delay between a `stop` message and the authoritative re-fetch
pub const DEFAULT_STOP_DELAY_MS: u64 = 2000;

/// Empty ticks before the outstanding-services check runs, and its cadence afterwards
pub const DEFAULT_STALL_TICKS: u64 = 4;

/// Bounds for watch-queue re-registration backoff
pub const DEFAULT_RECONNECT_MIN_MS: u64 = 500;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

/// Note: bounds must match ConfigError::InvalidPollInterval message
pub const POLL_INTERVAL_MIN_MS: u64 = 100;
pub const POLL_INTERVAL_MAX_MS: u64 = 300_000;

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Capacity of the channel between the socket task and the controller
pub const LIVE_EVENT_CAPACITY: usize = 256;

/// Capacity of the watch event broadcast channel
pub const WATCH_EVENT_CAPACITY: usize = 64;
