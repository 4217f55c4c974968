//! Wire types for the job API, as seen from the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lithybrid_core::{Citation, ErrorCode, JobError, JobState};

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_minutes: Option<u32>,
}

impl SubmitRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            limit: None,
            expected_minutes: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_expected_minutes(mut self, minutes: Option<u32>) -> Self {
        self.expected_minutes = minutes;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubmitResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
    pub code: Option<ErrorCode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultLinks {
    pub citations: String,
    pub export_apa: String,
    pub export_json: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobResult {
    pub citation_count: usize,
    pub papers_considered: usize,
    pub summary_bytes: usize,
    pub inline: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub citations: Option<Vec<Citation>>,
    pub links: ResultLinks,
}

/// Response of `GET /jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub title: String,
    pub limit: u32,
    pub state: JobState,
    pub progress: i32,
    pub progress_message: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub expected_minutes: Option<u32>,
    #[serde(default)]
    pub expected_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<JobError>,
}

/// Body of `GET /jobs/{id}/export?format=json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub job_id: Uuid,
    pub title: String,
    pub summary: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CitationPage {
    pub job_id: Uuid,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
    pub total_pages: usize,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Apa,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Apa => "apa",
            ExportFormat::Json => "json",
        }
    }

    /// File name used when the user gives no `--output`.
    pub fn default_file_name(&self, job_id: Uuid) -> String {
        match self {
            ExportFormat::Apa => format!("bibliography_{}_APA7.txt", job_id),
            ExportFormat::Json => format!("bibliography_{}.json", job_id),
        }
    }
}
