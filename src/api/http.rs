//! reqwest-backed implementation of [`SubmissionApi`]

use super::{ApiEnvelope, ApiError, SubmissionApi};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::config::ServerSettings;
use crate::models::{MultipleKeysRequest, MultipleKeysResponse, OutstandingServices, Submission, WatchQueue};
use crate::summary::SummaryReport;
use crate::tree::TreeReport;

/// HTTP client for the platform's v4 REST API
pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client from the server settings
    pub fn new(settings: &ServerSettings) -> Result<Self, ApiError> {
        let base_url = settings
            .base_url()
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

        let mut headers = HeaderMap::new();
        if let Some(auth) = settings.authorization() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| ApiError::InvalidUrl("credentials contain invalid characters".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(crate::user_agent())
            .default_headers(headers)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        unwrap_envelope(response).await
    }
}

/// Check the status and strip the platform envelope
async fn unwrap_envelope<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
            .map(|envelope| envelope.api_error_message)
            .unwrap_or(body);
        return Err(ApiError::Status {
            code: status.as_u16(),
            message,
        });
    }

    let envelope: ApiEnvelope<T> = serde_json::from_str(&body)?;
    Ok(envelope.api_response)
}

#[async_trait]
impl SubmissionApi for HttpApi {
    async fn get_submission(&self, sid: &str) -> Result<Submission, ApiError> {
        self.get(&format!("api/v4/submission/{}/", sid)).await
    }

    async fn get_summary(&self, sid: &str) -> Result<SummaryReport, ApiError> {
        self.get(&format!("api/v4/submission/summary/{}/", sid)).await
    }

    async fn get_tree(&self, sid: &str) -> Result<TreeReport, ApiError> {
        self.get(&format!("api/v4/submission/tree/{}/", sid)).await
    }

    async fn setup_watch_queue(&self, sid: &str) -> Result<WatchQueue, ApiError> {
        self.get(&format!("api/v4/live/setup_watch_queue/{}/", sid)).await
    }

    async fn outstanding_services(&self, sid: &str) -> Result<OutstandingServices, ApiError> {
        self.get(&format!("api/v4/live/outstanding_services/{}/", sid)).await
    }

    async fn multiple_keys(&self, request: &MultipleKeysRequest) -> Result<MultipleKeysResponse, ApiError> {
        let url = self.endpoint("api/v4/result/multiple_keys/")?;
        log::debug!(
            "POST {} ({} results, {} errors)",
            url,
            request.result.len(),
            request.error.len()
        );
        let response = self.client.post(url).json(request).send().await?;
        unwrap_envelope(response).await
    }
}
