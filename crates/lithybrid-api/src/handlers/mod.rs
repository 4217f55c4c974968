//! HTTP handlers for lithybrid-api.

pub mod jobs;
pub mod system;

pub use jobs::{export_job, get_job_status, list_citations, submit_job};
pub use system::{health_check, openapi_json};
