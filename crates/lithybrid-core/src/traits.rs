//! Core traits for LitHybrid abstractions.
//!
//! These traits define the interfaces that backend implementations must
//! satisfy: the job store (Redis, PostgreSQL, in-memory) and the paper
//! source (OpenAlex, mock).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, SourceError};
use crate::models::*;

// =============================================================================
// JOB STORE
// =============================================================================

/// Durable, shared job state.
///
/// Every mutation of an existing job is a compare-and-swap against the
/// `revision` the writer last read. A `false` return means another writer
/// got there first and the caller no longer owns the record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Short backend name for logs and `/health`.
    fn backend_name(&self) -> &'static str;

    /// Persist a new `PENDING` job and enqueue it.
    async fn create(&self, job: &Job) -> Result<()>;

    /// Latest stored version of a job.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Stored output of a `DONE` job.
    async fn get_output(&self, job_id: Uuid) -> Result<Option<JobOutput>>;

    /// Replace the job if its stored revision is still `expected_revision`.
    async fn compare_and_swap(&self, expected_revision: u64, job: &Job) -> Result<bool>;

    /// Write the `DONE` job together with its output in one operation.
    async fn complete(&self, expected_revision: u64, job: &Job, output: &JobOutput)
        -> Result<bool>;

    /// Claim the next queued job for `worker_id`, if any.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>>;

    /// Jobs currently in `RETRIEVING` or `COMPOSING`.
    async fn list_active(&self) -> Result<Vec<Job>>;

    /// Number of jobs waiting to be claimed.
    async fn pending_count(&self) -> Result<u64>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> Result<()>;

    /// Drop records past their retention window. Returns how many went.
    ///
    /// Backends with native key expiry keep the default.
    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }

    /// Claim a specific `PENDING` job.
    ///
    /// Returns `None` if the job is gone, no longer pending, or another
    /// claimant won the race.
    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Result<Option<Job>> {
        loop {
            let Some(job) = self.get(job_id).await? else {
                return Ok(None);
            };
            if job.state != JobState::Pending {
                return Ok(None);
            }
            let claimed = job.claimed(worker_id)?;
            if self.compare_and_swap(job.revision, &claimed).await? {
                return Ok(Some(claimed));
            }
            // Lost the race; the re-read sees the winner's state.
        }
    }
}

// =============================================================================
// PAPER SOURCE
// =============================================================================

/// Bibliographic provider adapter.
///
/// One call returns a single bounded batch of at most `limit` candidates.
/// Zero matches is reported as [`SourceError::Empty`], never as `Ok(vec![])`.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    async fn search(
        &self,
        title: &str,
        limit: usize,
    ) -> std::result::Result<Vec<CandidatePaper>, SourceError>;
}
