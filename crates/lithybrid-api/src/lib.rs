//! # lithybrid-api
//!
//! HTTP API for LitHybrid: submit a paper title, poll the job, export the
//! bibliography.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/jobs` | Queue a job, returns `201 {job_id}` |
//! | `GET` | `/jobs/{job_id}` | State, progress, result or error |
//! | `GET` | `/jobs/{job_id}/export?format=apa\|json` | Bibliography download |
//! | `GET` | `/jobs/{job_id}/citations?page=&per_page=` | Paginated citations |
//! | `GET` | `/health` | Liveness and store reachability |
//! | `GET` | `/api-docs/openapi.json` | OpenAPI document |

pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
