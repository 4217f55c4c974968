//! OpenAPI description, served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use lithybrid_core::{Citation, ErrorCode, JobError, JobState};

use crate::error::ErrorBody;
use crate::handlers::jobs::{
    CitationPage, ExportJson, JobResultView, JobStatusResponse, ResultLinks, SubmitJobRequest,
    SubmitJobResponse,
};
use crate::handlers::system::{HealthResponse, StoreHealth};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LitHybrid API",
        description = "Asynchronous literature summaries with APA 7 citations"
    ),
    paths(
        crate::handlers::jobs::submit_job,
        crate::handlers::jobs::get_job_status,
        crate::handlers::jobs::export_job,
        crate::handlers::jobs::list_citations,
        crate::handlers::system::health_check,
    ),
    components(schemas(
        SubmitJobRequest,
        SubmitJobResponse,
        JobStatusResponse,
        JobResultView,
        ResultLinks,
        CitationPage,
        ExportJson,
        ErrorBody,
        HealthResponse,
        StoreHealth,
        Citation,
        JobError,
        JobState,
        ErrorCode,
    )),
    tags(
        (name = "Jobs", description = "Submit jobs, poll status, export results"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
