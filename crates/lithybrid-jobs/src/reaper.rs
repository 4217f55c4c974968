//! Stale job reaper.
//!
//! A worker that dies mid-run leaves its job in `RETRIEVING` or
//! `COMPOSING` forever. The reaper fails such jobs with `TIMEOUT` once they
//! have gone `stale_after` without a write, and purges records past their
//! retention on backends without native expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use lithybrid_core::{ErrorCode, JobStore, Result};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Active jobs moved to `FAILED`.
    pub reaped: usize,
    /// Expired records removed.
    pub purged: u64,
}

pub struct Reaper {
    store: Arc<dyn JobStore>,
    stale_after: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn JobStore>, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        for job in self.store.list_active().await? {
            if !job.is_stale(now, self.stale_after) {
                continue;
            }
            let message = format!(
                "No progress for over {}s; worker presumed lost",
                self.stale_after.as_secs()
            );
            let failed = job.failed(ErrorCode::Timeout, message)?;
            if self.store.compare_and_swap(job.revision, &failed).await? {
                warn!(
                    subsystem = "jobs",
                    job_id = %job.id,
                    state = %job.state,
                    claimed_by = job.claimed_by.as_deref().unwrap_or("-"),
                    "Reaped stale job"
                );
                report.reaped += 1;
            } else {
                debug!(job_id = %job.id, "Stale job moved on before reaping");
            }
        }

        report.purged = self.store.purge_expired().await?;
        if report.reaped > 0 || report.purged > 0 {
            info!(
                subsystem = "jobs",
                reaped = report.reaped,
                purged = report.purged,
                "Reaper sweep complete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithybrid_core::{Job, JobState, NewJob};
    use lithybrid_store::MemoryJobStore;

    fn new_job() -> Job {
        Job::new(NewJob {
            title: "Stale".to_string(),
            limit: 5,
            expected_minutes: None,
        })
    }

    #[tokio::test]
    async fn test_sweep_fails_stale_active_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        let job = new_job();
        store.create(&job).await.unwrap();
        let claimed = store.claim_next("dead-worker").await.unwrap().unwrap();

        let reaper = Reaper::new(store.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = reaper.sweep().await.unwrap();
        assert_eq!(report.reaped, 1);

        let stored = store.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.error.unwrap().code, ErrorCode::Timeout);
        assert_eq!(stored.progress_percent, claimed.progress_percent);
    }

    #[tokio::test]
    async fn test_sweep_leaves_fresh_and_pending_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        let pending = new_job();
        store.create(&pending).await.unwrap();
        let running = new_job();
        store.create(&running).await.unwrap();
        store.claim(running.id, "live-worker").await.unwrap().unwrap();

        let reaper = Reaper::new(store.clone(), Duration::from_secs(900));
        assert_eq!(reaper.sweep().await.unwrap().reaped, 0);
        assert_eq!(
            store.get(running.id).await.unwrap().unwrap().state,
            JobState::Retrieving
        );
        assert_eq!(
            store.get(pending.id).await.unwrap().unwrap().state,
            JobState::Pending
        );
    }
}
