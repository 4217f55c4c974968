//! Job worker: claims queued jobs and runs them through the pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use lithybrid_core::{defaults, Error, ErrorCode, Job, JobState, JobStore, PaperSource, Result};

use crate::pipeline::{PipelineConfig, PipelineExecutor, ProgressCallback, RunOutcome};
use crate::reaper::Reaper;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// Active jobs without a write for this long are reaped.
    pub stale_after_secs: u64,
    /// Interval between reaper sweeps; `0` disables the reaper.
    pub reaper_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            stale_after_secs: defaults::JOB_STALE_SECS,
            reaper_interval_secs: defaults::REAPER_INTERVAL_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `1000` | Polling interval when queue is empty |
    /// | `JOB_STALE_SECS` | `900` | Age at which an active job is presumed abandoned |
    /// | `REAPER_INTERVAL_SECS` | `60` | Reaper sweep interval (`0` = off) |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let stale_after_secs = std::env::var("JOB_STALE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_STALE_SECS);

        let reaper_interval_secs = std::env::var("REAPER_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::REAPER_INTERVAL_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            stale_after_secs,
            reaper_interval_secs,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_stale_after(mut self, secs: u64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    pub fn with_reaper_interval(mut self, secs: u64) -> Self {
        self.reaper_interval_secs = secs;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was claimed and started.
    JobStarted { job_id: Uuid },
    /// A write to the job succeeded.
    JobProgress {
        job_id: Uuid,
        state: JobState,
        percent: i32,
        message: Option<String>,
    },
    /// A job reached `DONE`.
    JobCompleted { job_id: Uuid, citation_count: usize },
    /// A job reached `FAILED`.
    JobFailed {
        job_id: Uuid,
        code: ErrorCode,
        error: String,
    },
    /// The run stopped without finishing the job (ownership lost or store down).
    JobAbandoned { job_id: Uuid, reason: String },
    /// The reaper failed stale jobs.
    JobsReaped { count: usize },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Shut down and wait for in-flight jobs to finish.
    pub async fn stop(self) {
        // A worker that already exited has dropped its receiver.
        let _ = self.shutdown().await;
        if let Err(e) = self.task.await {
            error!(error = ?e, "Job worker task panicked");
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    executor: Arc<PipelineExecutor>,
    config: WorkerConfig,
    worker_id: String,
    event_tx: broadcast::Sender<WorkerEvent>,
    notify: Option<Arc<Notify>>,
    reaper: Option<Reaper>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(
        store: Arc<dyn JobStore>,
        source: Arc<dyn PaperSource>,
        config: WorkerConfig,
        pipeline: PipelineConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        let reaper = (config.reaper_interval_secs > 0).then(|| {
            Reaper::new(store.clone(), Duration::from_secs(config.stale_after_secs))
        });
        let worker_id = format!(
            "worker-{}-{}",
            std::process::id(),
            &Uuid::new_v4().simple().to_string()[..8]
        );

        Self {
            executor: Arc::new(PipelineExecutor::new(store.clone(), source, pipeline)),
            store,
            config,
            worker_id,
            event_tx,
            notify: None,
            reaper,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Run the worker loop.
    ///
    /// Keeps up to `max_concurrent_jobs` runs in flight, claiming another job
    /// as soon as a slot frees up. Sleeps only while the queue is empty or
    /// every slot is busy. On shutdown, stops claiming and waits for the
    /// runs in flight.
    #[instrument(skip(self, shutdown_rx), fields(worker_id = %self.worker_id))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            reaper_interval_secs = self.config.reaper_interval_secs,
            "Job worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let reaper_interval = Duration::from_secs(self.config.reaper_interval_secs);
        let max_concurrent = self.config.max_concurrent_jobs.max(1);
        let mut tasks = JoinSet::new();
        let mut next_sweep = tokio::time::Instant::now();

        loop {
            // Check for shutdown before claiming jobs
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            if let Some(ref reaper) = self.reaper {
                if tokio::time::Instant::now() >= next_sweep {
                    self.sweep(reaper).await;
                    next_sweep = tokio::time::Instant::now() + reaper_interval;
                }
            }

            let mut claimed = 0;
            while tasks.len() < max_concurrent {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }
            if claimed > 0 {
                debug!(claimed, in_flight = tasks.len(), "Claimed jobs");
            }

            let notified = async {
                match self.notify {
                    Some(ref notify) => notify.notified().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Job worker received shutdown signal");
                    break;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
                _ = notified => {}
                _ = sleep(poll_interval) => {}
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight jobs");
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Job task panicked");
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn sweep(&self, reaper: &Reaper) {
        match reaper.sweep().await {
            Ok(report) if report.reaped > 0 => {
                let _ = self.event_tx.send(WorkerEvent::JobsReaped {
                    count: report.reaped,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Reaper sweep failed"),
        }
    }

    /// Claim the next available job without processing it.
    async fn claim_job(&self) -> Option<Job> {
        match self.store.claim_next(&self.worker_id).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                None
            }
        }
    }

    /// Clone references needed for spawned job tasks.
    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            executor: self.executor.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pending job count.
    pub async fn pending_count(&self) -> Result<u64> {
        self.store.pending_count().await
    }
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    executor: Arc<PipelineExecutor>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorkerRef {
    /// Execute a single claimed job.
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;

        info!(%job_id, title = %job.title, limit = job.limit, "Processing job");

        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id });

        let tx = self.event_tx.clone();
        let on_progress: ProgressCallback = Arc::new(move |job: &Job| {
            let _ = tx.send(WorkerEvent::JobProgress {
                job_id: job.id,
                state: job.state,
                percent: job.progress_percent,
                message: job.progress_message.clone(),
            });
        });

        let duration_ms = || start.elapsed().as_millis() as u64;
        let event = match self.executor.run(job, Some(on_progress)).await {
            Ok(RunOutcome::Done(job)) => {
                let citation_count = job.result.map(|r| r.citation_count).unwrap_or(0);
                info!(%job_id, citation_count, duration_ms = duration_ms(), "Job completed");
                WorkerEvent::JobCompleted {
                    job_id,
                    citation_count,
                }
            }
            Ok(RunOutcome::Failed(job)) => {
                let (code, error) = job
                    .error
                    .map(|e| (e.code, e.message))
                    .unwrap_or((ErrorCode::InternalError, String::new()));
                warn!(%job_id, %code, %error, duration_ms = duration_ms(), "Job failed");
                WorkerEvent::JobFailed {
                    job_id,
                    code,
                    error,
                }
            }
            Ok(RunOutcome::Lost { .. }) => WorkerEvent::JobAbandoned {
                job_id,
                reason: "job changed by another writer".to_string(),
            },
            Err(e) => {
                error!(%job_id, error = %e, duration_ms = duration_ms(), "Job run aborted");
                WorkerEvent::JobAbandoned {
                    job_id,
                    reason: e.to_string(),
                }
            }
        };
        let _ = self.event_tx.send(event);
    }
}

/// Builder for creating a configured job worker.
pub struct WorkerBuilder {
    store: Arc<dyn JobStore>,
    source: Arc<dyn PaperSource>,
    config: WorkerConfig,
    pipeline: PipelineConfig,
    notify: Option<Arc<Notify>>,
    worker_id: Option<String>,
}

impl WorkerBuilder {
    /// Create a new worker builder.
    pub fn new(store: Arc<dyn JobStore>, source: Arc<dyn PaperSource>) -> Self {
        Self {
            store,
            source,
            config: WorkerConfig::default(),
            pipeline: PipelineConfig::default(),
            notify: None,
            worker_id: None,
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pipeline configuration.
    pub fn with_pipeline_config(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Wake the worker when this fires instead of waiting for the next poll.
    pub fn with_notify(mut self, notify: Arc<Notify>) -> Self {
        self.notify = Some(notify);
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// Build and return the worker.
    pub fn build(self) -> JobWorker {
        let mut worker = JobWorker::new(self.store, self.source, self.config, self.pipeline);
        worker.notify = self.notify;
        if let Some(worker_id) = self.worker_id {
            worker.worker_id = worker_id;
        }
        worker
    }
}
