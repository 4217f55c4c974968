//! Core data models for LitHybrid.
//!
//! A [`Job`] is the single source of truth for one submission. Every change
//! to it goes through a method that returns the *next* version of the record
//! with `revision` bumped, so stores can apply it with compare-and-swap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};
use crate::uuid_utils::new_v7;

// =============================================================================
// JOB STATE
// =============================================================================

/// Lifecycle state of a job.
///
/// ```text
/// PENDING -> RETRIEVING -> COMPOSING -> DONE
///    \____________\____________\______> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Retrieving,
    Composing,
    Done,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Retrieving,
        JobState::Composing,
        JobState::Done,
        JobState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Retrieving => "RETRIEVING",
            JobState::Composing => "COMPOSING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// States a worker owns; the reaper watches these.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Retrieving | JobState::Composing)
    }

    /// Forward-only transition table.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Pending, JobState::Retrieving)
            | (JobState::Retrieving, JobState::Composing)
            | (JobState::Composing, JobState::Done) => true,
            (from, JobState::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::Serialization(format!("unknown job state: {}", s)))
    }
}

// =============================================================================
// ERRORS ON JOBS
// =============================================================================

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    NotReady,
    ProviderError,
    RateLimited,
    Empty,
    Timeout,
    CompositionError,
    StoreError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::NotReady => "NOT_READY",
            ErrorCode::ProviderError => "PROVIDER_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Empty => "EMPTY",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::CompositionError => "COMPOSITION_ERROR",
            ErrorCode::StoreError => "STORE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded on a job in `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
}

// =============================================================================
// PAPERS AND CITATIONS
// =============================================================================

/// A paper returned by a source adapter, before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CandidatePaper {
    /// Provider-scoped identifier (e.g. an OpenAlex work URL).
    pub provider_id: String,
    pub title: String,
    /// Display names in author order.
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

/// A numbered reference in a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Citation {
    /// 1-based position in the bibliography.
    pub index: usize,
    pub provider_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    /// Rendered APA 7 reference.
    pub apa: String,
}

/// Full output of a finished job, stored next to the job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobOutput {
    pub summary: String,
    pub citations: Vec<Citation>,
    pub papers_considered: usize,
}

impl JobOutput {
    /// Handle describing this output, stored on the job record.
    pub fn result_ref(&self) -> ResultRef {
        ResultRef {
            citation_count: self.citations.len(),
            summary_bytes: self.summary.len(),
            papers_considered: self.papers_considered,
        }
    }
}

/// Small description of a stored [`JobOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ResultRef {
    pub citation_count: usize,
    pub summary_bytes: usize,
    pub papers_considered: usize,
}

// =============================================================================
// JOBS
// =============================================================================

/// Validated submission, ready to become a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub title: String,
    pub limit: u32,
    pub expected_minutes: Option<u32>,
}

/// One literature-review job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    /// Maximum number of papers that make it into the output.
    pub limit: u32,
    pub state: JobState,
    pub progress_percent: i32,
    pub progress_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    pub result: Option<ResultRef>,
    pub error: Option<JobError>,
    /// Write counter for compare-and-swap.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a `PENDING` job at revision 1.
    pub fn new(new: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            title: new.title,
            limit: new.limit,
            state: JobState::Pending,
            progress_percent: 0,
            progress_message: None,
            expected_minutes: new.expected_minutes,
            claimed_by: None,
            attempts: 0,
            result: None,
            error: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// When the client-provided estimate runs out.
    pub fn expected_end(&self) -> Option<DateTime<Utc>> {
        self.expected_minutes
            .map(|m| self.created_at + Duration::minutes(i64::from(m)))
    }

    /// Whether the job has not been written for longer than `max_age`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: std::time::Duration) -> bool {
        let max_age = Duration::from_std(max_age).unwrap_or(Duration::MAX);
        now.signed_duration_since(self.updated_at) > max_age
    }

    fn next(&self) -> Job {
        let mut next = self.clone();
        next.revision = self.revision + 1;
        next.updated_at = Utc::now().max(self.updated_at);
        next
    }

    fn transitioned(&self, to: JobState) -> Result<Job> {
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        let mut next = self.next();
        next.state = to;
        Ok(next)
    }

    /// `PENDING -> RETRIEVING`, owned by `worker_id`.
    pub fn claimed(&self, worker_id: &str) -> Result<Job> {
        let mut next = self.transitioned(JobState::Retrieving)?;
        next.claimed_by = Some(worker_id.to_string());
        next.progress_percent = next.progress_percent.max(defaults::PROGRESS_CLAIMED);
        next.progress_message = Some("Searching for papers".to_string());
        Ok(next)
    }

    /// `RETRIEVING -> COMPOSING`.
    pub fn composing(&self, message: Option<&str>) -> Result<Job> {
        let mut next = self.transitioned(JobState::Composing)?;
        next.progress_percent = next.progress_percent.max(defaults::PROGRESS_RETRIEVED);
        next.progress_message = message.map(str::to_string);
        Ok(next)
    }

    /// Progress update within the current state.
    ///
    /// Progress never decreases and stays below 100 until the job is done.
    pub fn with_progress(&self, percent: i32, message: Option<&str>) -> Result<Job> {
        if self.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: self.state,
            });
        }
        let mut next = self.next();
        next.progress_percent = percent
            .clamp(0, defaults::PROGRESS_COMPOSE_CEILING)
            .max(self.progress_percent);
        if let Some(message) = message {
            next.progress_message = Some(message.to_string());
        }
        Ok(next)
    }

    /// Record another retrieval attempt.
    pub fn with_attempt(&self, attempt: u32, message: Option<&str>) -> Result<Job> {
        let mut next = self.with_progress(self.progress_percent, message)?;
        next.attempts = attempt;
        Ok(next)
    }

    /// `COMPOSING -> DONE` with progress 100.
    pub fn completed(&self, result: ResultRef) -> Result<Job> {
        let mut next = self.transitioned(JobState::Done)?;
        next.progress_percent = defaults::PROGRESS_DONE;
        next.progress_message = Some("Done".to_string());
        next.result = Some(result);
        next.error = None;
        Ok(next)
    }

    /// Any non-terminal state `-> FAILED`. Progress is kept.
    pub fn failed(&self, code: ErrorCode, message: impl Into<String>) -> Result<Job> {
        let mut next = self.transitioned(JobState::Failed)?;
        let message = message.into();
        next.progress_message = Some(format!("Failed: {}", message));
        next.error = Some(JobError { code, message });
        next.result = None;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> Job {
        Job::new(NewJob {
            title: "Attention is all you need".to_string(),
            limit: 10,
            expected_minutes: Some(30),
        })
    }

    fn sample_output() -> JobOutput {
        JobOutput {
            summary: "summary".to_string(),
            citations: vec![],
            papers_considered: 3,
        }
    }

    #[test]
    fn test_new_job_is_pending_at_zero() {
        let job = new_job();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.progress_percent, 0);
        assert_eq!(job.revision, 1);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
        assert!(crate::uuid_utils::is_v7(&job.id));
    }

    #[test]
    fn test_state_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&JobState::Retrieving).unwrap();
        assert_eq!(json, "\"RETRIEVING\"");
        let code = serde_json::to_string(&ErrorCode::CompositionError).unwrap();
        assert_eq!(code, "\"COMPOSITION_ERROR\"");
    }

    #[test]
    fn test_state_from_str_matches_display() {
        for state in JobState::ALL {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
        assert!("running".parse::<JobState>().is_err());
    }

    #[test]
    fn test_transition_table() {
        use JobState::*;
        assert!(Pending.can_transition_to(Retrieving));
        assert!(Retrieving.can_transition_to(Composing));
        assert!(Composing.can_transition_to(Done));
        for from in [Pending, Retrieving, Composing] {
            assert!(from.can_transition_to(Failed));
        }
        assert!(!Pending.can_transition_to(Composing));
        assert!(!Pending.can_transition_to(Done));
        assert!(!Composing.can_transition_to(Retrieving));
        for to in JobState::ALL {
            assert!(!Done.can_transition_to(to));
            assert!(!Failed.can_transition_to(to));
        }
    }

    #[test]
    fn test_claim_bumps_revision_and_progress() {
        let job = new_job();
        let claimed = job.claimed("worker-1").unwrap();
        assert_eq!(claimed.state, JobState::Retrieving);
        assert_eq!(claimed.revision, job.revision + 1);
        assert_eq!(claimed.progress_percent, defaults::PROGRESS_CLAIMED);
        assert_eq!(claimed.claimed_by.as_deref(), Some("worker-1"));
        assert!(claimed.updated_at >= job.updated_at);
    }

    #[test]
    fn test_claim_twice_is_rejected() {
        let claimed = new_job().claimed("a").unwrap();
        let err = claimed.claimed("b").unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let job = new_job().claimed("w").unwrap();
        let up = job.with_progress(60, Some("composing")).unwrap();
        assert_eq!(up.progress_percent, 60);
        let down = up.with_progress(10, None).unwrap();
        assert_eq!(down.progress_percent, 60);
        assert_eq!(down.progress_message.as_deref(), Some("composing"));
        let over = down.with_progress(150, None).unwrap();
        assert_eq!(over.progress_percent, defaults::PROGRESS_COMPOSE_CEILING);
    }

    #[test]
    fn test_complete_sets_result_and_100() {
        let job = new_job()
            .claimed("w")
            .unwrap()
            .composing(None)
            .unwrap();
        let done = job.completed(sample_output().result_ref()).unwrap();
        assert_eq!(done.state, JobState::Done);
        assert_eq!(done.progress_percent, 100);
        assert_eq!(done.result.unwrap().papers_considered, 3);
        assert!(done.error.is_none());
    }

    #[test]
    fn test_complete_requires_composing() {
        let job = new_job().claimed("w").unwrap();
        assert!(job.completed(sample_output().result_ref()).is_err());
    }

    #[test]
    fn test_fail_from_every_active_state() {
        let pending = new_job();
        let retrieving = pending.claimed("w").unwrap();
        let composing = retrieving.composing(None).unwrap();
        for job in [pending, retrieving, composing] {
            let failed = job.failed(ErrorCode::Timeout, "too slow").unwrap();
            assert_eq!(failed.state, JobState::Failed);
            assert_eq!(failed.error.as_ref().unwrap().code, ErrorCode::Timeout);
            assert!(failed.result.is_none());
            assert_eq!(failed.progress_percent, job.progress_percent);
        }
    }

    #[test]
    fn test_terminal_jobs_reject_writes() {
        let failed = new_job().failed(ErrorCode::Empty, "nothing").unwrap();
        assert!(failed.with_progress(50, None).is_err());
        assert!(failed.failed(ErrorCode::Timeout, "again").is_err());
        assert!(failed.claimed("w").is_err());
    }

    #[test]
    fn test_expected_end() {
        let job = new_job();
        let end = job.expected_end().unwrap();
        assert_eq!(end - job.created_at, Duration::minutes(30));

        let mut no_estimate = new_job();
        no_estimate.expected_minutes = None;
        assert!(no_estimate.expected_end().is_none());
    }

    #[test]
    fn test_is_stale() {
        let job = new_job();
        let later = job.updated_at + Duration::seconds(120);
        assert!(job.is_stale(later, std::time::Duration::from_secs(60)));
        assert!(!job.is_stale(later, std::time::Duration::from_secs(600)));
    }

    #[test]
    fn test_job_json_roundtrip_keeps_revision() {
        let job = new_job().claimed("w").unwrap();
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_result_ref_from_output() {
        let output = JobOutput {
            summary: "abc".to_string(),
            citations: vec![],
            papers_considered: 7,
        };
        let r = output.result_ref();
        assert_eq!(r.summary_bytes, 3);
        assert_eq!(r.citation_count, 0);
        assert_eq!(r.papers_considered, 7);
    }
}
