//! In-process job store.
//!
//! Used by tests and single-process deployments (`JOB_STORE=memory`).
//! All state sits behind one mutex, which makes every operation atomic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use lithybrid_core::{defaults, Error, Job, JobOutput, JobState, JobStore, Result};

struct Entry {
    job: Job,
    output: Option<JobOutput>,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Entry>,
    queue: VecDeque<Uuid>,
}

impl MemoryState {
    fn live(&self, job_id: &Uuid, now: Instant) -> Option<&Entry> {
        self.jobs.get(job_id).filter(|e| e.expires_at > now)
    }
}

/// Mutex-backed [`JobStore`].
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
    retention: Duration,
    notify: Arc<Notify>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::with_retention(Duration::from_secs(defaults::JOB_RETENTION_SECS))
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            retention,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Handle signalled whenever a job is enqueued.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Store("memory store mutex poisoned".to_string()))
    }

    fn swap(
        &self,
        expected_revision: u64,
        job: &Job,
        output: Option<&JobOutput>,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let Some(entry) = state.jobs.get_mut(&job.id).filter(|e| e.expires_at > now) else {
            return Ok(false);
        };
        if entry.job.revision != expected_revision {
            debug!(job_id = %job.id, expected_revision, actual = entry.job.revision, "CAS conflict");
            return Ok(false);
        }
        entry.job = job.clone();
        if let Some(output) = output {
            entry.output = Some(output.clone());
        }
        entry.expires_at = now + self.retention;
        Ok(true)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, job: &Job) -> Result<()> {
        {
            let mut state = self.lock()?;
            if state.jobs.contains_key(&job.id) {
                return Err(Error::Store(format!("job {} already exists", job.id)));
            }
            state.jobs.insert(
                job.id,
                Entry {
                    job: job.clone(),
                    output: None,
                    expires_at: Instant::now() + self.retention,
                },
            );
            state.queue.push_back(job.id);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let state = self.lock()?;
        Ok(state.live(&job_id, Instant::now()).map(|e| e.job.clone()))
    }

    async fn get_output(&self, job_id: Uuid) -> Result<Option<JobOutput>> {
        let state = self.lock()?;
        Ok(state
            .live(&job_id, Instant::now())
            .and_then(|e| e.output.clone()))
    }

    async fn compare_and_swap(&self, expected_revision: u64, job: &Job) -> Result<bool> {
        self.swap(expected_revision, job, None)
    }

    async fn complete(
        &self,
        expected_revision: u64,
        job: &Job,
        output: &JobOutput,
    ) -> Result<bool> {
        self.swap(expected_revision, job, Some(output))
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let now = Instant::now();
        let mut state = self.lock()?;
        while let Some(job_id) = state.queue.pop_front() {
            let Some(entry) = state.jobs.get_mut(&job_id).filter(|e| e.expires_at > now) else {
                continue;
            };
            if entry.job.state != JobState::Pending {
                continue;
            }
            let claimed = entry.job.claimed(worker_id)?;
            entry.job = claimed.clone();
            entry.expires_at = now + self.retention;
            return Ok(Some(claimed));
        }
        Ok(None)
    }

    async fn list_active(&self) -> Result<Vec<Job>> {
        let now = Instant::now();
        let state = self.lock()?;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|e| e.expires_at > now && e.job.state.is_active())
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn pending_count(&self) -> Result<u64> {
        let now = Instant::now();
        let state = self.lock()?;
        let count = state
            .queue
            .iter()
            .filter(|id| {
                state
                    .live(id, now)
                    .is_some_and(|e| e.job.state == JobState::Pending)
            })
            .count();
        Ok(count as u64)
    }

    async fn health_check(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let before = state.jobs.len();
        state.jobs.retain(|_, e| e.expires_at > now);
        let MemoryState { jobs, queue } = &mut *state;
        queue.retain(|id| jobs.contains_key(id));
        Ok((before - jobs.len()) as u64)
    }
}
