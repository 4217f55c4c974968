//! Job submission, status and result endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use lithybrid_core::{
    defaults, parse_job_id, render_bibliography, Citation, Error, Job, JobError, JobOutput,
    JobState, NewJob,
};

use crate::config::ApiConfig;
use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    /// Paper title or topic to summarize.
    pub title: String,
    /// Maximum number of papers in the output.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Client estimate of the run time, used for the countdown.
    #[serde(default)]
    pub expected_minutes: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
}

/// Where a finished result can be fetched.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResultLinks {
    pub citations: String,
    pub export_apa: String,
    pub export_json: String,
}

/// Result section of a `DONE` job.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobResultView {
    pub citation_count: usize,
    pub papers_considered: usize,
    pub summary_bytes: usize,
    /// Whether `summary` and `citations` are included.
    pub inline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    pub links: ResultLinks,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub title: String,
    pub limit: u32,
    pub state: JobState,
    pub progress: i32,
    pub progress_message: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResultView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobStatusResponse {
    fn new(job: Job, result: Option<JobResultView>) -> Self {
        Self {
            job_id: job.id,
            expected_end: job.expected_end(),
            title: job.title,
            limit: job.limit,
            state: job.state,
            progress: job.progress_percent,
            progress_message: job.progress_message,
            attempts: job.attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
            expected_minutes: job.expected_minutes,
            result,
            error: job.error,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `apa` (default) or `json`.
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Apa,
    Json,
}

impl ExportFormat {
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("apa") => Ok(ExportFormat::Apa),
            Some("json") => Ok(ExportFormat::Json),
            Some(other) => Err(ApiError::Validation(format!(
                "Unsupported export format '{}', expected apa or json",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportJson {
    pub job_id: Uuid,
    pub title: String,
    pub summary: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CitationsQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CitationPage {
    pub job_id: Uuid,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
    pub total_pages: usize,
    pub citations: Vec<Citation>,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Check a submission against the configured bounds.
pub fn validate_submission(req: SubmitJobRequest, config: &ApiConfig) -> Result<NewJob, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("title must not be empty".to_string()));
    }
    let length = title.chars().count();
    if length > config.max_title_length {
        return Err(ApiError::Validation(format!(
            "title is {} characters, maximum is {}",
            length, config.max_title_length
        )));
    }

    let limit = req.limit.unwrap_or(config.default_limit);
    if limit == 0 || limit > config.max_limit {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            config.max_limit
        )));
    }

    if let Some(minutes) = req.expected_minutes {
        if minutes == 0 || minutes > defaults::MAX_EXPECTED_MINUTES {
            return Err(ApiError::Validation(format!(
                "expected_minutes must be between 1 and {}",
                defaults::MAX_EXPECTED_MINUTES
            )));
        }
    }

    Ok(NewJob {
        title: title.to_string(),
        limit,
        expected_minutes: req.expected_minutes,
    })
}

// =============================================================================
// LOOKUP HELPERS
// =============================================================================

/// Unknown and malformed ids are both reported as not found.
async fn load_job(state: &AppState, raw_id: &str) -> Result<Job, ApiError> {
    let id = parse_job_id(raw_id)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", raw_id)))?;
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| Error::JobNotFound(id).into())
}

async fn load_output(state: &AppState, job: &Job) -> Result<JobOutput, ApiError> {
    if job.state != JobState::Done {
        return Err(Error::NotReady {
            id: job.id,
            state: job.state,
            expected: JobState::Done,
        }
        .into());
    }
    state
        .store
        .get_output(job.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Result of job {} is no longer available", job.id)))
}

fn links(job_id: Uuid) -> ResultLinks {
    ResultLinks {
        citations: format!("/jobs/{}/citations", job_id),
        export_apa: format!("/jobs/{}/export?format=apa", job_id),
        export_json: format!("/jobs/{}/export?format=json", job_id),
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Submit a paper title for summarization.
#[utoipa::path(post, path = "/jobs", tag = "Jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 201, description = "Job queued", body = SubmitJobResponse),
        (status = 400, description = "Invalid submission", body = ErrorBody),
        (status = 503, description = "Job store unavailable", body = ErrorBody)
    ))]
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    let new_job = validate_submission(req, &state.config)?;
    let job = Job::new(new_job);
    state.store.create(&job).await?;

    info!(
        subsystem = "api",
        op = "submit",
        job_id = %job.id,
        limit = job.limit,
        "Job queued"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitJobResponse { job_id: job.id }),
    ))
}

/// Current state, progress and (when done) result of a job.
#[utoipa::path(get, path = "/jobs/{job_id}", tag = "Jobs",
    params(("job_id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "Unknown job", body = ErrorBody),
        (status = 503, description = "Job store unavailable", body = ErrorBody)
    ))]
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = load_job(&state, &job_id).await?;

    let result = match job.result {
        Some(result) if job.state == JobState::Done => {
            let mut view = JobResultView {
                citation_count: result.citation_count,
                papers_considered: result.papers_considered,
                summary_bytes: result.summary_bytes,
                inline: false,
                summary: None,
                citations: None,
                links: links(job.id),
            };
            if result.citation_count <= state.config.inline_max_citations {
                if let Some(output) = state.store.get_output(job.id).await? {
                    view.inline = true;
                    view.summary = Some(output.summary);
                    view.citations = Some(output.citations);
                }
            }
            Some(view)
        }
        _ => None,
    };

    Ok(Json(JobStatusResponse::new(job, result)))
}

/// Download the bibliography of a finished job.
#[utoipa::path(get, path = "/jobs/{job_id}/export", tag = "Jobs",
    params(("job_id" = String, Path, description = "Job id"), ExportQuery),
    responses(
        (status = 200, description = "APA 7 text or JSON citations"),
        (status = 400, description = "Unknown format", body = ErrorBody),
        (status = 404, description = "Unknown job", body = ErrorBody),
        (status = 409, description = "Job is not done", body = ErrorBody)
    ))]
pub async fn export_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(query.format.as_deref())?;
    let job = load_job(&state, &job_id).await?;
    let output = load_output(&state, &job).await?;

    let response = match format {
        ExportFormat::Apa => {
            let disposition = format!("attachment; filename=\"bibliography_{}_APA7.txt\"", job.id);
            let disposition = HeaderValue::from_str(&disposition)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            (
                [
                    (
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("text/plain; charset=utf-8"),
                    ),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                render_bibliography(&output.citations),
            )
                .into_response()
        }
        ExportFormat::Json => Json(ExportJson {
            job_id: job.id,
            title: job.title,
            summary: output.summary,
            citations: output.citations,
        })
        .into_response(),
    };
    Ok(response)
}

/// Page through the citations of a finished job.
#[utoipa::path(get, path = "/jobs/{job_id}/citations", tag = "Jobs",
    params(("job_id" = String, Path, description = "Job id"), CitationsQuery),
    responses(
        (status = 200, description = "One page of citations", body = CitationPage),
        (status = 400, description = "Invalid paging", body = ErrorBody),
        (status = 404, description = "Unknown job", body = ErrorBody),
        (status = 409, description = "Job is not done", body = ErrorBody)
    ))]
pub async fn list_citations(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<CitationsQuery>,
) -> Result<Json<CitationPage>, ApiError> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(defaults::PAGE_LIMIT);
    if page == 0 {
        return Err(ApiError::Validation("page starts at 1".to_string()));
    }
    if per_page == 0 || per_page > defaults::PAGE_LIMIT_MAX {
        return Err(ApiError::Validation(format!(
            "per_page must be between 1 and {}",
            defaults::PAGE_LIMIT_MAX
        )));
    }

    let job = load_job(&state, &job_id).await?;
    let output = load_output(&state, &job).await?;

    let total = output.citations.len();
    let per = per_page as usize;
    let citations = output
        .citations
        .into_iter()
        .skip((page as usize - 1).saturating_mul(per))
        .take(per)
        .collect();

    Ok(Json(CitationPage {
        job_id: job.id,
        page,
        per_page,
        total,
        total_pages: total.div_ceil(per),
        citations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, limit: Option<u32>, expected_minutes: Option<u32>) -> SubmitJobRequest {
        SubmitJobRequest {
            title: title.to_string(),
            limit,
            expected_minutes,
        }
    }

    #[test]
    fn test_validation_trims_and_defaults_limit() {
        let config = ApiConfig::default();
        let new_job = validate_submission(request("  Deep learning  ", None, None), &config).unwrap();
        assert_eq!(new_job.title, "Deep learning");
        assert_eq!(new_job.limit, 25);
        assert_eq!(new_job.expected_minutes, None);
    }

    #[test]
    fn test_validation_rejects_blank_title() {
        let config = ApiConfig::default();
        let err = validate_submission(request("   ", None, None), &config).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_validation_title_length_counts_characters() {
        let config = ApiConfig::default();
        let exact = "é".repeat(500);
        assert!(validate_submission(request(&exact, None, None), &config).is_ok());
        let over = "é".repeat(501);
        assert!(validate_submission(request(&over, None, None), &config).is_err());
    }

    #[test]
    fn test_validation_limit_bounds() {
        let config = ApiConfig::default();
        assert!(validate_submission(request("t", Some(0), None), &config).is_err());
        assert!(validate_submission(request("t", Some(1), None), &config).is_ok());
        assert!(validate_submission(request("t", Some(1000), None), &config).is_ok());
        assert!(validate_submission(request("t", Some(1001), None), &config).is_err());
    }

    #[test]
    fn test_validation_expected_minutes_bounds() {
        let config = ApiConfig::default();
        assert!(validate_submission(request("t", None, Some(0)), &config).is_err());
        assert!(validate_submission(request("t", None, Some(1440)), &config).is_ok());
        assert!(validate_submission(request("t", None, Some(1441)), &config).is_err());
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!(ExportFormat::parse(None).unwrap(), ExportFormat::Apa);
        assert_eq!(ExportFormat::parse(Some("APA")).unwrap(), ExportFormat::Apa);
        assert_eq!(ExportFormat::parse(Some("json")).unwrap(), ExportFormat::Json);
        assert!(ExportFormat::parse(Some("bibtex")).is_err());
    }
}
