//! Structured logging schema, field name constants, and subscriber setup.
//!
//! Every crate logs with these field names so a log aggregator can follow a
//! job from submission through the worker to export.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Store unreachable, job state could not be written |
//! | WARN  | Retry scheduled, ownership lost, job failed |
//! | INFO  | Lifecycle events (startup, shutdown), job transitions |
//! | DEBUG | Claim attempts, provider pages, config choices |
//! | TRACE | Per-paper iteration during composition |

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "store", "sources", "jobs", "client"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "submit", "claim_next", "search", "compose"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Worker instance that claimed the job.
pub const WORKER_ID: &str = "worker_id";

/// Job state after a transition.
pub const STATE: &str = "state";

/// Store revision written by a compare-and-swap.
pub const REVISION: &str = "revision";

/// Paper source name ("openalex", "mock").
pub const SOURCE: &str = "source";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Retrieval attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

/// Number of candidate papers returned by the source.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of citations in a finished job.
pub const CITATION_COUNT: &str = "citation_count";

/// Progress percentage written to the store.
pub const PROGRESS: &str = "progress";

/// Environment-driven logging options shared by every binary.
///
/// | Variable | Meaning | Default |
/// |----------|---------|---------|
/// | `LOG_FORMAT` | `json` or `text` | `text` |
/// | `LOG_FILE` | path of a daily-rotated log file | stdout |
/// | `LOG_ANSI` | `true`/`false` ANSI override | auto |
/// | `RUST_LOG` | env filter | caller default |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub json: bool,
    pub file: Option<String>,
    pub ansi: Option<bool>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            file: std::env::var("LOG_FILE").ok().filter(|v| !v.is_empty()),
            ansi: std::env::var("LOG_ANSI")
                .ok()
                .map(|v| v == "true" || v == "1"),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns the file writer guard when `LOG_FILE` is set; keep it alive for
/// the lifetime of the process or buffered lines are lost.
pub fn init_tracing(default_filter: &str, default_file_name: &str) -> Option<WorkerGuard> {
    let config = LogConfig::from_env();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = config.file {
        let path = Path::new(path);
        let dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(default_file_name);
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if config.json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless forced
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(config.ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if config.json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = config.ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_snake_case() {
        for name in [
            REQUEST_ID,
            SUBSYSTEM,
            OPERATION,
            JOB_ID,
            WORKER_ID,
            STATE,
            REVISION,
            SOURCE,
            DURATION_MS,
            ATTEMPT,
            CANDIDATE_COUNT,
            CITATION_COUNT,
            PROGRESS,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "field {name} must be snake_case"
            );
        }
    }

    #[test]
    fn test_log_config_default_is_text_stdout() {
        let config = LogConfig::default();
        assert!(!config.json);
        assert!(config.file.is_none());
        assert!(config.ansi.is_none());
    }
}
