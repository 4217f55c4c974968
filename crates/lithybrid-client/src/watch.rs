//! Poll a job until it finishes.

use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use lithybrid_core::{defaults, JobState};

use crate::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::types::JobStatus;

/// Consecutive transient errors tolerated before giving up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub interval: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(defaults::CLIENT_POLL_INTERVAL_SECS),
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
        }
    }
}

impl WatchOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max.max(1);
        self
    }
}

/// Poll `GET /jobs/{id}` until the job is `DONE` or `FAILED`.
///
/// `on_update` sees every successful poll. Transient failures (connection
/// errors, 429, 5xx) are retried on the next tick; anything else ends the
/// watch. A `FAILED` job is returned as [`ClientError::JobFailed`].
pub async fn watch_job<F>(
    client: &ApiClient,
    job_id: Uuid,
    options: &WatchOptions,
    mut on_update: F,
) -> Result<JobStatus>
where
    F: FnMut(&JobStatus),
{
    let mut errors = 0u32;
    loop {
        match client.status(job_id).await {
            Ok(status) => {
                errors = 0;
                on_update(&status);
                match status.state {
                    JobState::Done => return Ok(status),
                    JobState::Failed => {
                        return Err(match status.error {
                            Some(error) => ClientError::JobFailed {
                                code: error.code,
                                message: error.message,
                            },
                            None => ClientError::Decode("FAILED job without error".to_string()),
                        })
                    }
                    _ => {}
                }
            }
            Err(e) if e.is_transient() => {
                errors += 1;
                warn!(subsystem = "client", job_id = %job_id, attempt = errors, error = %e, "Status poll failed");
                if errors >= options.max_consecutive_errors {
                    return Err(ClientError::TooManyErrors(errors));
                }
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(options.interval).await;
    }
}
