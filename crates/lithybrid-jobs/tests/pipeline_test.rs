//! End-to-end pipeline and worker behavior over the in-memory store and the
//! mock paper source.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lithybrid_core::{
    Error, ErrorCode, Job, JobOutput, JobState, JobStore, NewJob, Result, SourceError,
};
use lithybrid_jobs::{
    Backoff, PipelineConfig, PipelineExecutor, ProgressCallback, Reaper, RunOutcome,
    WorkerBuilder, WorkerConfig, WorkerEvent,
};
use lithybrid_sources::mock::{sample_paper, MockPaperSource};
use lithybrid_store::MemoryJobStore;
use uuid::Uuid;

fn fast_config() -> PipelineConfig {
    PipelineConfig::default().with_backoff(
        Backoff::new(Duration::from_millis(10), Duration::from_millis(100)).without_jitter(),
    )
}

async fn submit(store: &dyn JobStore, title: &str, limit: u32) -> Job {
    let job = Job::new(NewJob {
        title: title.to_string(),
        limit,
        expected_minutes: None,
    });
    store.create(&job).await.unwrap();
    job
}

async fn claim(store: &dyn JobStore) -> Job {
    store.claim_next("test-worker").await.unwrap().unwrap()
}

#[derive(Default)]
struct Faults {
    /// Writes moving a job into this state fail this many more times.
    failing_writes: Option<(JobState, u32)>,
    /// Writes into this state take this long before reaching the store.
    slow_writes: Option<(JobState, Duration)>,
    failing_completes: u32,
}

/// In-memory store whose writes can be made to fail or stall.
struct FaultyStore {
    inner: Arc<MemoryJobStore>,
    faults: Mutex<Faults>,
}

impl FaultyStore {
    fn new(inner: Arc<MemoryJobStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    fn fail_writes(self, state: JobState, times: u32) -> Self {
        self.faults.lock().unwrap().failing_writes = Some((state, times));
        self
    }

    fn slow_writes(self, state: JobState, delay: Duration) -> Self {
        self.faults.lock().unwrap().slow_writes = Some((state, delay));
        self
    }

    fn fail_completes(self, times: u32) -> Self {
        self.faults.lock().unwrap().failing_completes = times;
        self
    }
}

fn connection_reset() -> Error {
    Error::Store("connection reset".to_string())
}

#[async_trait]
impl JobStore for FaultyStore {
    fn backend_name(&self) -> &'static str {
        "faulty"
    }

    async fn create(&self, job: &Job) -> Result<()> {
        self.inner.create(job).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.inner.get(job_id).await
    }

    async fn get_output(&self, job_id: Uuid) -> Result<Option<JobOutput>> {
        self.inner.get_output(job_id).await
    }

    async fn compare_and_swap(&self, expected_revision: u64, job: &Job) -> Result<bool> {
        let delay = {
            let mut faults = self.faults.lock().unwrap();
            if let Some((state, remaining)) = faults.failing_writes.as_mut() {
                if *state == job.state && *remaining > 0 {
                    *remaining -= 1;
                    return Err(connection_reset());
                }
            }
            faults
                .slow_writes
                .filter(|(state, _)| *state == job.state)
                .map(|(_, delay)| delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.compare_and_swap(expected_revision, job).await
    }

    async fn complete(
        &self,
        expected_revision: u64,
        job: &Job,
        output: &JobOutput,
    ) -> Result<bool> {
        {
            let mut faults = self.faults.lock().unwrap();
            if faults.failing_completes > 0 {
                faults.failing_completes -= 1;
                return Err(connection_reset());
            }
        }
        self.inner.complete(expected_revision, job, output).await
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        self.inner.claim_next(worker_id).await
    }

    async fn list_active(&self) -> Result<Vec<Job>> {
        self.inner.list_active().await
    }

    async fn pending_count(&self) -> Result<u64> {
        self.inner.pending_count().await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<(JobState, i32)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |job: &Job| {
        sink.lock().unwrap().push((job.state, job.progress_percent));
    });
    (callback, seen)
}

#[tokio::test]
async fn test_happy_path_reaches_done_with_ranked_citations() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(MockPaperSource::with_generated(30));
    let executor = PipelineExecutor::new(store.clone(), source.clone(), fast_config());

    let job = submit(store.as_ref(), "Attention is all you need", 10).await;
    let claimed = claim(store.as_ref()).await;
    assert_eq!(claimed.state, JobState::Retrieving);
    assert_eq!(claimed.progress_percent, 5);

    let (callback, seen) = recorder();
    let outcome = executor.run(claimed, Some(callback)).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Done(_)));

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Done);
    assert_eq!(stored.progress_percent, 100);
    assert!(stored.error.is_none());
    let result = stored.result.unwrap();
    assert_eq!(result.citation_count, 10);
    assert_eq!(result.papers_considered, 10);

    let output = store.get_output(job.id).await.unwrap().unwrap();
    assert_eq!(output.citations.len(), 10);
    let ids: HashSet<_> = output.citations.iter().map(|c| &c.provider_id).collect();
    assert_eq!(ids.len(), 10);
    assert!(output
        .summary
        .starts_with("Automatic map-reduce summary for query: \"Attention is all you need\""));

    // The source was asked for the job's limit and ranking kept that many.
    assert_eq!(source.calls()[0].limit, 10);
    assert_eq!(source.calls()[0].title, "Attention is all you need");

    let seen = seen.lock().unwrap();
    let states: Vec<JobState> = seen.iter().map(|(s, _)| *s).collect();
    assert!(states.contains(&JobState::Retrieving));
    assert!(states.contains(&JobState::Composing));
    assert_eq!(states.last(), Some(&JobState::Done));
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!(seen
        .iter()
        .filter(|(s, _)| *s != JobState::Done)
        .all(|(_, p)| *p < 100));
}

#[tokio::test]
async fn test_citations_follow_citation_count_order() {
    let store = Arc::new(MemoryJobStore::new());
    let papers = vec![
        sample_paper(1), // 7 citations
        sample_paper(9), // 63 citations
        sample_paper(5), // 35 citations
        sample_paper(9), // duplicate
    ];
    let source = Arc::new(MockPaperSource::new().with_papers(papers));
    let executor = PipelineExecutor::new(store.clone(), source, fast_config());

    let job = submit(store.as_ref(), "ranking", 10).await;
    executor.run(claim(store.as_ref()).await, None).await.unwrap();

    let output = store.get_output(job.id).await.unwrap().unwrap();
    let ids: Vec<&str> = output
        .citations
        .iter()
        .map(|c| c.provider_id.as_str())
        .collect();
    assert_eq!(
        ids,
        vec![
            sample_paper(9).provider_id.as_str(),
            sample_paper(5).provider_id.as_str(),
            sample_paper(1).provider_id.as_str(),
        ]
    );
    assert_eq!(output.papers_considered, 4);
}

#[tokio::test]
async fn test_zero_candidates_fails_empty_without_retry() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(MockPaperSource::new());
    let executor = PipelineExecutor::new(store.clone(), source.clone(), fast_config());

    let job = submit(store.as_ref(), "no such paper", 5).await;
    let outcome = executor.run(claim(store.as_ref()).await, None).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.error.unwrap().code, ErrorCode::Empty);
    assert!(stored.result.is_none());
    assert!(store.get_output(job.id).await.unwrap().is_none());
    assert_eq!(source.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(
        MockPaperSource::with_generated(5)
            .fail_next(SourceError::Provider("connection reset".into()))
            .fail_next(SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            }),
    );
    let executor = PipelineExecutor::new(store.clone(), source.clone(), fast_config());

    let job = submit(store.as_ref(), "flaky provider", 5).await;
    let start = tokio::time::Instant::now();
    let outcome = executor.run(claim(store.as_ref()).await, None).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Done(_)));
    assert_eq!(source.call_count(), 3);
    // The provider's Retry-After outweighs the configured backoff.
    assert!(start.elapsed() >= Duration::from_secs(2));

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Done);
    assert_eq!(stored.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_with_last_error() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(
        MockPaperSource::with_generated(5).always_fail(SourceError::RateLimited { retry_after: None }),
    );
    let config = fast_config().with_max_attempts(2);
    let executor = PipelineExecutor::new(store.clone(), source.clone(), config);

    let job = submit(store.as_ref(), "throttled", 5).await;
    executor.run(claim(store.as_ref()).await, None).await.unwrap();

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.error.unwrap().code, ErrorCode::RateLimited);
    assert_eq!(source.call_count(), 2);
}

#[tokio::test]
async fn test_rejected_query_fails_without_retry() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(
        MockPaperSource::with_generated(5)
            .always_fail(SourceError::Rejected("OpenAlex rejected the query: HTTP 400".into())),
    );
    let executor = PipelineExecutor::new(store.clone(), source.clone(), fast_config());

    let job = submit(store.as_ref(), "bad query", 5).await;
    let outcome = executor.run(claim(store.as_ref()).await, None).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(source.call_count(), 1);

    let stored = store.get(job.id).await.unwrap().unwrap();
    let error = stored.error.unwrap();
    assert_eq!(error.code, ErrorCode::ProviderError);
    assert!(error.message.contains("HTTP 400"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_retrieval_times_out() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(MockPaperSource::with_generated(5).with_latency_ms(60_000));
    let config = fast_config().with_retrieval_timeout(Duration::from_secs(1));
    let executor = PipelineExecutor::new(store.clone(), source, config);

    let job = submit(store.as_ref(), "slow provider", 5).await;
    let outcome = executor.run(claim(store.as_ref()).await, None).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.error.unwrap().code, ErrorCode::Timeout);
    assert!(stored.progress_percent < 100);
}

#[tokio::test(start_paused = true)]
async fn test_slow_composition_times_out() {
    let inner = Arc::new(MemoryJobStore::new());
    let store = Arc::new(
        FaultyStore::new(inner.clone()).slow_writes(JobState::Composing, Duration::from_secs(10)),
    );
    let source = Arc::new(MockPaperSource::with_generated(5));
    let config = fast_config().with_composition_timeout(Duration::from_secs(1));
    let executor = PipelineExecutor::new(store, source, config);

    let job = submit(inner.as_ref(), "slow composition", 5).await;
    let outcome = executor.run(claim(inner.as_ref()).await, None).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let stored = inner.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    let error = stored.error.unwrap();
    assert_eq!(error.code, ErrorCode::Timeout);
    assert!(error.message.contains("Composition"));
    assert!(stored.result.is_none());
    assert!(inner.get_output(job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_progress_write_is_dropped() {
    let inner = Arc::new(MemoryJobStore::new());
    let store = Arc::new(FaultyStore::new(inner.clone()).fail_writes(JobState::Retrieving, 1));
    let source = Arc::new(MockPaperSource::with_generated(5));
    let executor = PipelineExecutor::new(store, source.clone(), fast_config());

    let job = submit(inner.as_ref(), "dropped progress", 5).await;
    let (callback, seen) = recorder();
    let outcome = executor
        .run(claim(inner.as_ref()).await, Some(callback))
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Done(_)));
    assert_eq!(source.call_count(), 1);

    // The dropped write never reached the callback.
    assert!(!seen
        .lock()
        .unwrap()
        .iter()
        .any(|(state, _)| *state == JobState::Retrieving));
    let stored = inner.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Done);
}

#[tokio::test(start_paused = true)]
async fn test_failed_transition_write_is_retried() {
    let inner = Arc::new(MemoryJobStore::new());
    let store = Arc::new(FaultyStore::new(inner.clone()).fail_writes(JobState::Composing, 2));
    let source = Arc::new(MockPaperSource::with_generated(5));
    let executor = PipelineExecutor::new(store, source, fast_config());

    let job = submit(inner.as_ref(), "flaky store", 5).await;
    let outcome = executor.run(claim(inner.as_ref()).await, None).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Done(_)));

    let stored = inner.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Done);
    assert!(inner.get_output(job.id).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_store_leaves_job_for_reaper() {
    let inner = Arc::new(MemoryJobStore::new());
    let store = Arc::new(FaultyStore::new(inner.clone()).fail_completes(3));
    let source = Arc::new(MockPaperSource::with_generated(5));
    let executor = PipelineExecutor::new(store, source, fast_config());

    let job = submit(inner.as_ref(), "store outage", 5).await;
    let err = executor
        .run(claim(inner.as_ref()).await, None)
        .await
        .unwrap_err();
    assert!(err.is_store_error());

    // The store error is not recorded as a job failure.
    let stored = inner.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Composing);
    assert!(stored.error.is_none());
    assert!(inner.get_output(job.id).await.unwrap().is_none());
    assert!(inner
        .list_active()
        .await
        .unwrap()
        .iter()
        .any(|j| j.id == job.id));

    let report = Reaper::new(inner.clone(), Duration::ZERO).sweep().await.unwrap();
    assert_eq!(report.reaped, 1);
    let reaped = inner.get(job.id).await.unwrap().unwrap();
    assert_eq!(reaped.state, JobState::Failed);
    assert_eq!(reaped.error.unwrap().code, ErrorCode::Timeout);
}

#[tokio::test]
async fn test_oversized_summary_fails_composition() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(MockPaperSource::with_generated(20));
    let config = fast_config().with_max_summary_bytes(100);
    let executor = PipelineExecutor::new(store.clone(), source, config);

    let job = submit(store.as_ref(), "verbose", 20).await;
    executor.run(claim(store.as_ref()).await, None).await.unwrap();

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.error.unwrap().code, ErrorCode::CompositionError);
    assert!(store.get_output(job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_lost_ownership_stops_without_writing() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(MockPaperSource::with_generated(5));
    let executor = PipelineExecutor::new(store.clone(), source.clone(), fast_config());

    let job = submit(store.as_ref(), "contended", 5).await;
    let claimed = claim(store.as_ref()).await;

    // Someone else (e.g. the reaper) finishes the job first.
    let reaped = claimed.failed(ErrorCode::Timeout, "reaped").unwrap();
    assert!(store
        .compare_and_swap(claimed.revision, &reaped)
        .await
        .unwrap());

    let outcome = executor.run(claimed, None).await.unwrap();
    assert_eq!(outcome, RunOutcome::Lost { job_id: job.id });
    assert_eq!(source.call_count(), 0);
    assert_eq!(store.get(job.id).await.unwrap().unwrap(), reaped);
}

async fn wait_for_completions(
    events: &mut tokio::sync::broadcast::Receiver<WorkerEvent>,
    count: usize,
) -> Vec<uuid::Uuid> {
    let mut done = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while done.len() < count {
            match events.recv().await {
                Ok(WorkerEvent::JobCompleted { job_id, .. }) => done.push(job_id),
                Ok(WorkerEvent::JobFailed { error, .. }) => panic!("job failed: {error}"),
                Ok(_) => {}
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("jobs did not complete in time");
    done
}

#[tokio::test]
async fn test_worker_processes_submitted_jobs() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(MockPaperSource::with_generated(15));

    let worker = WorkerBuilder::new(store.clone(), source)
        .with_config(WorkerConfig::default().with_poll_interval(20))
        .with_pipeline_config(fast_config())
        .with_notify(store.job_notify())
        .build();
    let handle = worker.start();
    let mut events = handle.events();

    let mut ids = HashSet::new();
    for i in 0..3 {
        ids.insert(submit(store.as_ref(), &format!("topic {i}"), 5).await.id);
    }

    let done: HashSet<_> = wait_for_completions(&mut events, 3).await.into_iter().collect();
    assert_eq!(done, ids);
    handle.stop().await;

    for id in ids {
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.result.unwrap().citation_count, 5);
    }
}

#[tokio::test]
async fn test_competing_workers_run_each_job_once() {
    let store = Arc::new(MemoryJobStore::new());
    let source = Arc::new(MockPaperSource::with_generated(5).with_latency_ms(5));

    let mut ids = HashSet::new();
    for i in 0..8 {
        ids.insert(submit(store.as_ref(), &format!("shared {i}"), 3).await.id);
    }

    let build = |name: &str| {
        WorkerBuilder::new(store.clone(), source.clone())
            .with_config(
                WorkerConfig::default()
                    .with_poll_interval(10)
                    .with_max_concurrent(2),
            )
            .with_pipeline_config(fast_config())
            .with_worker_id(name)
            .build()
    };
    let a = build("worker-a").start();
    let b = build("worker-b").start();

    let started = Arc::new(Mutex::new(Vec::new()));
    let collect = |mut rx: tokio::sync::broadcast::Receiver<WorkerEvent>| {
        let started = started.clone();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let WorkerEvent::JobStarted { job_id } = event {
                    started.lock().unwrap().push(job_id);
                }
            }
        })
    };
    let a_collector = collect(a.events());
    let b_collector = collect(b.events());

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let mut all_done = true;
            for id in &ids {
                if store.get(*id).await.unwrap().unwrap().state != JobState::Done {
                    all_done = false;
                }
            }
            if all_done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("jobs did not complete in time");

    a.stop().await;
    b.stop().await;
    // Stopped workers drop their senders, which ends both collectors.
    a_collector.await.unwrap();
    b_collector.await.unwrap();

    let started = started.lock().unwrap();
    assert_eq!(started.len(), 8);
    let unique: HashSet<_> = started.iter().collect();
    assert_eq!(unique.len(), 8);
    assert_eq!(source.call_count(), 8);
}
