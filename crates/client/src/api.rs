//! REST client for the job service.
//!
//! [`JobApi`] is the seam the sync engine talks through; [`HttpJobApi`]
//! implements it with [`reqwest`]. Every request carries the owner
//! identity as a bare `Authorization` header.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use stockdash_core::board::{JobLogEntry, UpdateSource};
use stockdash_core::job::{JobCreated, JobSnapshot, JobStatus};
use stockdash_core::session::ClientId;
use stockdash_core::types::{lenient_timestamp, Timestamp};

/// Errors from the job service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum JobApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The job service returned a non-2xx status code.
    #[error("Job service error ({status}): {message}")]
    ApiError {
        status: u16,
        /// The `detail` field of the error body when present, else the raw body.
        message: String,
    },
}

impl JobApiError {
    /// HTTP status of an [`ApiError`](Self::ApiError).
    pub fn status(&self) -> Option<u16> {
        match self {
            JobApiError::ApiError { status, .. } => Some(*status),
            JobApiError::Request(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// One row of `GET /jobs/{id}/logs`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobLogRecord {
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl JobLogRecord {
    /// Rows without a timestamp are stamped with `fallback`.
    pub fn into_entry(self, fallback: Timestamp) -> JobLogEntry {
        JobLogEntry {
            timestamp: self.timestamp.unwrap_or(fallback),
            status: self.status,
            progress: self.progress,
            worker: self.worker_id,
            source: UpdateSource::History,
        }
    }
}

/// Operations the sync engine needs from the job service.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// POST `/search`.
    async fn submit(&self, text: &str, client_id: &ClientId) -> Result<JobCreated, JobApiError>;

    /// GET `/jobs`.
    async fn list_jobs(&self) -> Result<Vec<JobSnapshot>, JobApiError>;

    /// GET `/jobs/{job_id}`.
    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, JobApiError>;

    /// GET `/jobs/{job_id}/logs`.
    async fn job_logs(&self, job_id: &str) -> Result<Vec<JobLogRecord>, JobApiError>;

    /// DELETE `/jobs/{job_id}`.
    async fn delete_job(&self, job_id: &str) -> Result<(), JobApiError>;

    /// DELETE `/jobs/clear-all`.
    async fn clear_all(&self) -> Result<(), JobApiError>;
}

/// HTTP client for the job service, bound to one owner identity.
pub struct HttpJobApi {
    client: reqwest::Client,
    api_url: String,
    owner_id: String,
}

impl HttpJobApi {
    /// * `api_url`  - Base HTTP URL, e.g. `http://host:8000`.
    /// * `owner_id` - identity sent in the `Authorization` header.
    pub fn new(
        api_url: impl Into<String>,
        owner_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, JobApiError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, api_url, owner_id))
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner_id: owner_id.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header(reqwest::header::AUTHORIZATION, &self.owner_id)
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(self.url(path))
            .header(reqwest::header::AUTHORIZATION, &self.owner_id)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. On failure the
    /// `detail` field of a JSON error body is surfaced when present.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, JobApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(JobApiError::ApiError {
                status: status.as_u16(),
                message: error_detail(&body).unwrap_or(body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, JobApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), JobApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, text: &str, client_id: &ClientId) -> Result<JobCreated, JobApiError> {
        let body = serde_json::json!({
            "text": text,
            "client_id": client_id.as_str(),
        });

        let response = self
            .client
            .post(self.url("/search"))
            .header(reqwest::header::AUTHORIZATION, &self.owner_id)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn list_jobs(&self) -> Result<Vec<JobSnapshot>, JobApiError> {
        let response = self.get("/jobs").send().await?;
        Self::parse_response(response).await
    }

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot, JobApiError> {
        let response = self.get(&format!("/jobs/{job_id}")).send().await?;
        Self::parse_response(response).await
    }

    async fn job_logs(&self, job_id: &str) -> Result<Vec<JobLogRecord>, JobApiError> {
        let response = self.get(&format!("/jobs/{job_id}/logs")).send().await?;
        Self::parse_response(response).await
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), JobApiError> {
        let response = self.delete(&format!("/jobs/{job_id}")).send().await?;
        Self::check_status(response).await
    }

    async fn clear_all(&self) -> Result<(), JobApiError> {
        let response = self.delete("/jobs/clear-all").send().await?;
        Self::check_status(response).await
    }
}

/// Pull `detail` out of a JSON error body. Non-string details (validation
/// error lists) are rendered as JSON.
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
