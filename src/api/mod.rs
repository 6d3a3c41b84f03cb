//! REST boundary of the analysis platform
//!
//! The watch controller only talks to the server through [`SubmissionApi`],
//! which keeps it testable against in-memory fakes.

mod http;

pub use http::HttpApi;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{MultipleKeysRequest, MultipleKeysResponse, OutstandingServices, Submission, WatchQueue};
use crate::summary::SummaryReport;
use crate::tree::TreeReport;

/// Errors that can occur when talking to the platform
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Envelope every platform response is wrapped in
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub api_response: T,
    #[serde(default)]
    pub api_error_message: String,
    #[serde(default)]
    pub api_status_code: u16,
}

/// Endpoints consumed by the watch controller
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    /// `GET /api/v4/submission/{sid}/`
    async fn get_submission(&self, sid: &str) -> Result<Submission, ApiError>;

    /// `GET /api/v4/submission/summary/{sid}/`
    async fn get_summary(&self, sid: &str) -> Result<SummaryReport, ApiError>;

    /// `GET /api/v4/submission/tree/{sid}/`
    async fn get_tree(&self, sid: &str) -> Result<TreeReport, ApiError>;

    /// `GET /api/v4/live/setup_watch_queue/{sid}/`
    async fn setup_watch_queue(&self, sid: &str) -> Result<WatchQueue, ApiError>;

    /// `GET /api/v4/live/outstanding_services/{sid}/`
    async fn outstanding_services(&self, sid: &str) -> Result<OutstandingServices, ApiError>;

    /// `POST /api/v4/result/multiple_keys/`
    async fn multiple_keys(&self, request: &MultipleKeysRequest) -> Result<MultipleKeysResponse, ApiError>;
}
