//! subwatch - live submission monitoring library
//!
//! This library exposes the watch controller together with the pieces it is
//! built from: the REST boundary, the live channel, key buffering, polling
//! reconciliation, and the summary and file-tree aggregators.

pub mod api;
pub mod config;
pub mod constants;
pub mod live;
pub mod logging;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod summary;
pub mod tree;

/// Version reported by `--version` and in the `User-Agent` header
pub const VERSION: &str = env!("SUBWATCH_VERSION");

/// `User-Agent` sent with every request to the platform
pub fn user_agent() -> String {
    format!("subwatch/{}", VERSION)
}
