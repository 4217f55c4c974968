//! HTTP client for the job API.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use lithybrid_core::defaults;

use crate::error::{ClientError, Result};
use crate::types::{
    CitationPage, ErrorResponse, ExportDocument, ExportFormat, JobStatus, SubmitRequest,
    SubmitResponse,
};

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for `POST /jobs`, `GET /jobs/{id}` and the export endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::BaseUrl(base_url));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(defaults::USER_AGENT)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Read `API_BASE` (default `http://localhost:8000`).
    pub fn from_env() -> Result<Self> {
        Self::new(std::env::var("API_BASE").unwrap_or_else(|_| defaults::API_BASE.to_string()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit a job and return its id.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<Uuid> {
        let response = self
            .http
            .post(self.url("/jobs"))
            .json(request)
            .send()
            .await?;
        let body: SubmitResponse = decode(check(response).await?).await?;
        debug!(subsystem = "client", job_id = %body.job_id, "Job submitted");
        Ok(body.job_id)
    }

    pub async fn status(&self, job_id: Uuid) -> Result<JobStatus> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{}", job_id)))
            .send()
            .await?;
        decode(check(response).await?).await
    }

    /// Raw export body in the given format.
    pub async fn export(&self, job_id: Uuid, format: ExportFormat) -> Result<String> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{}/export", job_id)))
            .query(&[("format", format.as_str())])
            .send()
            .await?;
        Ok(check(response).await?.text().await?)
    }

    pub async fn export_json(&self, job_id: Uuid) -> Result<ExportDocument> {
        let body = self.export(job_id, ExportFormat::Json).await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn citations(&self, job_id: Uuid, page: u32, per_page: u32) -> Result<CitationPage> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{}/citations", job_id)))
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?;
        decode(check(response).await?).await
    }
}

/// Turn a non-success response into [`ClientError::Api`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => (body.code, body.error),
        Err(_) if text.is_empty() => (None, status.to_string()),
        Err(_) => (None, text),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
}
