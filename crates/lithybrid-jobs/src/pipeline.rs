//! Pipeline executor: drives one claimed job from `RETRIEVING` to a
//! terminal state.
//!
//! Every write is a compare-and-swap against the revision this run last
//! wrote. A rejected swap means someone else (normally the reaper) has
//! taken the job over, and the run stops without touching it again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lithybrid_core::{
    defaults, CandidatePaper, ErrorCode, Job, JobOutput, JobStore, PaperSource, Result,
    SourceError,
};

use crate::compose::SummaryComposer;
use crate::rank::rank;
use crate::retry::Backoff;

/// Attempts for a state-transition write when the store is failing.
const STORE_WRITE_ATTEMPTS: u32 = 3;

/// Pause between those attempts, multiplied by the attempt number.
const STORE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Called after every successful write with the job as stored.
pub type ProgressCallback = Arc<dyn Fn(&Job) + Send + Sync>;

/// Configuration for the pipeline executor.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Provider calls per job, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retrieval_timeout: Duration,
    pub composition_timeout: Duration,
    pub max_summary_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRIEVAL_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            retrieval_timeout: Duration::from_secs(defaults::RETRIEVAL_TIMEOUT_SECS),
            composition_timeout: Duration::from_secs(defaults::COMPOSITION_TIMEOUT_SECS),
            max_summary_bytes: defaults::MAX_SUMMARY_BYTES,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RETRIEVAL_MAX_ATTEMPTS` | `3` | Provider calls per job |
    /// | `RETRY_BASE_DELAY_MS` | `500` | First retry delay, doubled per attempt |
    /// | `RETRY_MAX_DELAY_MS` | `10000` | Retry delay cap |
    /// | `RETRIEVAL_TIMEOUT_SECS` | `120` | Bound on the whole retrieval phase |
    /// | `COMPOSITION_TIMEOUT_SECS` | `300` | Bound on the composition phase |
    /// | `MAX_SUMMARY_BYTES` | `1048576` | Largest summary a job may produce |
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        Self {
            max_attempts: var("RETRIEVAL_MAX_ATTEMPTS", defaults::RETRIEVAL_MAX_ATTEMPTS).max(1),
            backoff: Backoff::new(
                Duration::from_millis(var("RETRY_BASE_DELAY_MS", defaults::RETRY_BASE_DELAY_MS)),
                Duration::from_millis(var("RETRY_MAX_DELAY_MS", defaults::RETRY_MAX_DELAY_MS)),
            ),
            retrieval_timeout: Duration::from_secs(var(
                "RETRIEVAL_TIMEOUT_SECS",
                defaults::RETRIEVAL_TIMEOUT_SECS,
            )),
            composition_timeout: Duration::from_secs(var(
                "COMPOSITION_TIMEOUT_SECS",
                defaults::COMPOSITION_TIMEOUT_SECS,
            )),
            max_summary_bytes: var("MAX_SUMMARY_BYTES", defaults::MAX_SUMMARY_BYTES),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    pub fn with_composition_timeout(mut self, timeout: Duration) -> Self {
        self.composition_timeout = timeout;
        self
    }

    pub fn with_max_summary_bytes(mut self, bytes: usize) -> Self {
        self.max_summary_bytes = bytes;
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Job reached `DONE`; the output was stored with it.
    Done(Job),
    /// Job reached `FAILED` with an error recorded.
    Failed(Job),
    /// Another writer changed the job; the run stopped without writing.
    Lost { job_id: Uuid },
}

impl RunOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            RunOutcome::Done(job) | RunOutcome::Failed(job) => job.id,
            RunOutcome::Lost { job_id } => *job_id,
        }
    }
}

enum Step<T> {
    Continue(T),
    Fail(ErrorCode, String),
    Lost,
}

/// The job as this run last wrote it.
struct Tracker {
    store: Arc<dyn JobStore>,
    job: Job,
    on_progress: Option<ProgressCallback>,
}

impl Tracker {
    fn applied(&mut self, next: Job) {
        self.job = next;
        if let Some(ref callback) = self.on_progress {
            callback(&self.job);
        }
    }

    /// Progress write. A store failure drops this update; the next one
    /// carries the newer progress. `false` means ownership was lost.
    async fn progress(&mut self, next: Job) -> Result<bool> {
        match self.store.compare_and_swap(self.job.revision, &next).await {
            Ok(true) => {
                self.applied(next);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) if e.is_store_error() => {
                warn!(
                    subsystem = "jobs",
                    job_id = %self.job.id,
                    progress = next.progress_percent,
                    error = %e,
                    "Progress write failed, continuing"
                );
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// State transition write, retried while the store is failing.
    async fn transition(&mut self, next: Job) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.store.compare_and_swap(self.job.revision, &next).await {
                Ok(true) => {
                    self.applied(next);
                    return Ok(true);
                }
                Ok(false) => return Ok(false),
                Err(e) if e.is_store_error() && attempt < STORE_WRITE_ATTEMPTS => {
                    warn!(
                        subsystem = "jobs",
                        job_id = %self.job.id,
                        state = %next.state,
                        attempt,
                        error = %e,
                        "Transition write failed, retrying"
                    );
                    sleep(STORE_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `DONE` write together with the output, retried like a transition.
    async fn complete(&mut self, next: Job, output: &JobOutput) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.store.complete(self.job.revision, &next, output).await {
                Ok(true) => {
                    self.applied(next);
                    return Ok(true);
                }
                Ok(false) => return Ok(false),
                Err(e) if e.is_store_error() && attempt < STORE_WRITE_ATTEMPTS => {
                    warn!(
                        subsystem = "jobs",
                        job_id = %self.job.id,
                        attempt,
                        error = %e,
                        "Completion write failed, retrying"
                    );
                    sleep(STORE_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Runs claimed jobs through retrieval, ranking, composition and completion.
pub struct PipelineExecutor {
    store: Arc<dyn JobStore>,
    source: Arc<dyn PaperSource>,
    config: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        source: Arc<dyn PaperSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Drive a job returned by a claim to `DONE` or `FAILED`.
    ///
    /// `Err` is returned only when the store stays unavailable for a state
    /// transition; the job is then left for the reaper.
    pub async fn run(&self, job: Job, on_progress: Option<ProgressCallback>) -> Result<RunOutcome> {
        let start = Instant::now();
        let mut tracker = Tracker {
            store: self.store.clone(),
            job,
            on_progress,
        };

        let retrieved = match timeout(self.config.retrieval_timeout, self.retrieve(&mut tracker))
            .await
        {
            Ok(step) => step?,
            Err(_) => Step::Fail(
                ErrorCode::Timeout,
                format!(
                    "Retrieval did not finish within {}s",
                    self.config.retrieval_timeout.as_secs()
                ),
            ),
        };
        let candidates = match retrieved {
            Step::Continue(candidates) => candidates,
            Step::Fail(code, message) => return self.fail(&mut tracker, code, message).await,
            Step::Lost => return Ok(lost(&tracker)),
        };

        let considered = candidates.len();
        let ranked = rank(candidates, tracker.job.limit as usize);
        debug!(
            subsystem = "jobs",
            job_id = %tracker.job.id,
            candidate_count = considered,
            ranked = ranked.len(),
            "Candidates ranked"
        );

        let message = format!("Composing summary from {} papers", ranked.len());
        let next = tracker.job.composing(Some(&message))?;
        if !tracker.transition(next).await? {
            return Ok(lost(&tracker));
        }

        let composed = match timeout(
            self.config.composition_timeout,
            self.compose(&mut tracker, &ranked, considered),
        )
        .await
        {
            Ok(step) => step?,
            Err(_) => Step::Fail(
                ErrorCode::Timeout,
                format!(
                    "Composition did not finish within {}s",
                    self.config.composition_timeout.as_secs()
                ),
            ),
        };
        let output = match composed {
            Step::Continue(output) => output,
            Step::Fail(code, message) => return self.fail(&mut tracker, code, message).await,
            Step::Lost => return Ok(lost(&tracker)),
        };

        let done = tracker.job.completed(output.result_ref())?;
        if !tracker.complete(done, &output).await? {
            return Ok(lost(&tracker));
        }

        info!(
            subsystem = "jobs",
            job_id = %tracker.job.id,
            citation_count = output.citations.len(),
            summary_bytes = output.summary.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Job done"
        );
        Ok(RunOutcome::Done(tracker.job))
    }

    async fn retrieve(&self, tracker: &mut Tracker) -> Result<Step<Vec<CandidatePaper>>> {
        let max_attempts = self.config.max_attempts.max(1);
        let title = tracker.job.title.clone();
        let limit = tracker.job.limit as usize;
        let mut attempt = 1;

        loop {
            let message = format!("Searching for papers (attempt {attempt} of {max_attempts})");
            let next = tracker.job.with_attempt(attempt, Some(&message))?;
            if !tracker.progress(next).await? {
                return Ok(Step::Lost);
            }

            let started = Instant::now();
            match self.source.search(&title, limit).await {
                Ok(papers) if papers.is_empty() => {
                    return Ok(Step::Fail(ErrorCode::Empty, SourceError::Empty.to_string()));
                }
                Ok(papers) => {
                    info!(
                        subsystem = "jobs",
                        job_id = %tracker.job.id,
                        source = self.source.name(),
                        attempt,
                        candidate_count = papers.len(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Retrieval complete"
                    );
                    return Ok(Step::Continue(papers));
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff.delay(attempt, e.retry_after());
                    warn!(
                        subsystem = "jobs",
                        job_id = %tracker.job.id,
                        source = self.source.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrieval failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Ok(Step::Fail(e.code(), e.to_string())),
            }
        }
    }

    async fn compose(
        &self,
        tracker: &mut Tracker,
        ranked: &[CandidatePaper],
        considered: usize,
    ) -> Result<Step<JobOutput>> {
        let total = ranked.len().max(1);
        let span = (defaults::PROGRESS_COMPOSE_CEILING - defaults::PROGRESS_RETRIEVED) as usize;
        let mut composer =
            SummaryComposer::new(tracker.job.title.clone(), self.config.max_summary_bytes);

        for (i, paper) in ranked.iter().enumerate() {
            if let Err(e) = composer.push(paper) {
                return Ok(Step::Fail(ErrorCode::CompositionError, e.to_string()));
            }

            let percent = defaults::PROGRESS_RETRIEVED + ((i + 1) * span / total) as i32;
            // A dropped write leaves the stored percent behind, so the next
            // paper retries it.
            if percent > tracker.job.progress_percent {
                let message = format!("Composed {} of {} citations", i + 1, ranked.len());
                let next = tracker.job.with_progress(percent, Some(&message))?;
                if !tracker.progress(next).await? {
                    return Ok(Step::Lost);
                }
            }
            tokio::task::yield_now().await;
        }

        match composer.finish(considered) {
            Ok(output) => Ok(Step::Continue(output)),
            Err(e) => Ok(Step::Fail(ErrorCode::CompositionError, e.to_string())),
        }
    }

    async fn fail(
        &self,
        tracker: &mut Tracker,
        code: ErrorCode,
        message: String,
    ) -> Result<RunOutcome> {
        warn!(
            subsystem = "jobs",
            job_id = %tracker.job.id,
            state = %tracker.job.state,
            code = %code,
            error = %message,
            "Job failed"
        );

        let next = tracker.job.failed(code, message.clone())?;
        if tracker.transition(next).await? {
            return Ok(RunOutcome::Failed(tracker.job.clone()));
        }

        // A write interrupted by a phase timeout can land without the run
        // seeing it. The job is still ours if it is active and claimed by us.
        if let Some(current) = self.store.get(tracker.job.id).await? {
            if !current.is_terminal() && current.claimed_by == tracker.job.claimed_by {
                tracker.job = current;
                let next = tracker.job.failed(code, message)?;
                if tracker.transition(next).await? {
                    return Ok(RunOutcome::Failed(tracker.job.clone()));
                }
            }
        }
        Ok(lost(tracker))
    }
}

fn lost(tracker: &Tracker) -> RunOutcome {
    warn!(
        subsystem = "jobs",
        job_id = %tracker.job.id,
        revision = tracker.job.revision,
        "Job changed by another writer, abandoning run"
    );
    RunOutcome::Lost {
        job_id: tracker.job.id,
    }
}
