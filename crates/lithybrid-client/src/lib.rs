//! # lithybrid-client
//!
//! Terminal client for the LitHybrid job API: submit a title, poll the job
//! with a progress bar and countdown, and export the bibliography.
//!
//! ```rust,no_run
//! use lithybrid_client::{watch_job, ApiClient, SubmitRequest, WatchOptions};
//!
//! # async fn demo() -> lithybrid_client::Result<()> {
//! let client = ApiClient::from_env()?;
//! let job_id = client.submit(&SubmitRequest::new("Attention is all you need")).await?;
//! let done = watch_job(&client, job_id, &WatchOptions::default(), |_| {}).await?;
//! println!("{} citations", done.result.map(|r| r.citation_count).unwrap_or(0));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod display;
pub mod error;
pub mod types;
pub mod watch;

pub use client::ApiClient;
pub use display::{format_countdown, progress_bar, render_report, status_line};
pub use error::{ClientError, Result};
pub use types::{CitationPage, ExportDocument, ExportFormat, JobResult, JobStatus, SubmitRequest};
pub use watch::{watch_job, WatchOptions};
