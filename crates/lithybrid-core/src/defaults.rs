//! Centralized default constants for LitHybrid.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs fall back to these when the matching environment variable
//! is unset or unparseable.

// =============================================================================
// SERVER
// =============================================================================

/// Default bind address for the HTTP API.
pub const HOST: &str = "0.0.0.0";

/// Default HTTP port.
pub const PORT: u16 = 8000;

/// Base URL the terminal client talks to.
pub const API_BASE: &str = "http://localhost:8000";

/// Maximum accepted request body (bytes). Submissions are tiny.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// SUBMISSION
// =============================================================================

/// Maximum title length in characters (after trimming).
pub const MAX_TITLE_LENGTH: usize = 500;

/// Papers considered per job when the client does not say.
pub const DEFAULT_PAPER_LIMIT: u32 = 25;

/// Upper bound on the per-job paper limit.
pub const MAX_PAPER_LIMIT: u32 = 1000;

/// Upper bound on the client-provided duration estimate (one day).
pub const MAX_EXPECTED_MINUTES: u32 = 1440;

/// Citations inlined in a status response before switching to a handle.
pub const RESULT_INLINE_MAX_CITATIONS: usize = 100;

/// Default page size for the citation listing.
pub const PAGE_LIMIT: u32 = 50;

/// Largest page size the citation listing accepts.
pub const PAGE_LIMIT_MAX: u32 = 500;

// =============================================================================
// STORE
// =============================================================================

/// Default Redis connection URL.
pub const REDIS_URL: &str = "redis://localhost:6379";

/// Default PostgreSQL connection URL.
pub const DATABASE_URL: &str = "postgres://localhost/lithybrid";

/// Job record retention after the last write: 7 days.
pub const JOB_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

/// Key namespace for every Redis key LitHybrid writes.
pub const REDIS_KEY_PREFIX: &str = "lithybrid";

/// Maximum PostgreSQL pool connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

// =============================================================================
// WORKER
// =============================================================================

/// Interval between queue polls when idle (ms).
pub const JOB_POLL_INTERVAL_MS: u64 = 1000;

/// Jobs executed concurrently by one worker process.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Active jobs untouched for this long are considered abandoned.
pub const JOB_STALE_SECS: u64 = 900;

/// Interval between reaper sweeps.
pub const REAPER_INTERVAL_SECS: u64 = 60;

/// Buffered worker events per subscriber before the slowest one lags.
pub const WORKER_EVENT_CAPACITY: usize = 256;

// =============================================================================
// PIPELINE
// =============================================================================

/// Retrieval attempts before the job fails.
pub const RETRIEVAL_MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubled per attempt.
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Retry delay ceiling.
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Whole retrieval phase bound, retries included.
pub const RETRIEVAL_TIMEOUT_SECS: u64 = 120;

/// Composition phase bound.
pub const COMPOSITION_TIMEOUT_SECS: u64 = 300;

/// Largest summary the composer will produce (1 MiB).
pub const MAX_SUMMARY_BYTES: usize = 1024 * 1024;

/// Characters kept from an abstract per snippet.
pub const SNIPPET_MAX_CHARS: usize = 400;

/// Sentences kept from an abstract per snippet.
pub const SNIPPET_SENTENCES: usize = 2;

/// Longest-unique snippets appended after the first/middle/last samples.
pub const SUMMARY_EXTRA_SNIPPETS: usize = 20;

// Progress checkpoints.
pub const PROGRESS_CLAIMED: i32 = 5;
pub const PROGRESS_RETRIEVED: i32 = 40;
pub const PROGRESS_COMPOSE_CEILING: i32 = 99;
pub const PROGRESS_DONE: i32 = 100;

// =============================================================================
// PAPER SOURCES
// =============================================================================

/// Public OpenAlex API.
pub const OPENALEX_URL: &str = "https://api.openalex.org";

/// OpenAlex hard maximum for `per-page`.
pub const OPENALEX_MAX_PER_PAGE: usize = 200;

/// HTTP timeout for a single provider request.
pub const OPENALEX_TIMEOUT_SECS: u64 = 30;

/// Pause between consecutive pages (polite pool etiquette).
pub const OPENALEX_PAGE_DELAY_MS: u64 = 150;

/// Product token sent as User-Agent.
pub const USER_AGENT: &str = concat!("LitHybrid/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Requests allowed per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Rate limit period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

// =============================================================================
// CLIENT
// =============================================================================

/// Status poll interval for `lithybrid watch`.
pub const CLIENT_POLL_INTERVAL_SECS: u64 = 2;
