//! API server configuration.

use std::time::Duration;

use axum::http::HeaderValue;

use lithybrid_core::defaults;

/// Configuration for the HTTP API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Longest accepted title, in characters.
    pub max_title_length: usize,
    /// Paper limit applied when a submission omits one.
    pub default_limit: u32,
    pub max_limit: u32,
    /// Results with at most this many citations are returned inline.
    pub inline_max_citations: usize,
    pub max_body_bytes: usize,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_period: Duration,
    /// CORS origins; empty allows any origin.
    pub allowed_origins: Vec<HeaderValue>,
    /// Run a job worker inside the API process.
    pub run_worker: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            max_title_length: defaults::MAX_TITLE_LENGTH,
            default_limit: defaults::DEFAULT_PAPER_LIMIT,
            max_limit: defaults::MAX_PAPER_LIMIT,
            inline_max_citations: defaults::RESULT_INLINE_MAX_CITATIONS,
            max_body_bytes: defaults::MAX_BODY_BYTES,
            rate_limit_enabled: true,
            rate_limit_requests: defaults::RATE_LIMIT_REQUESTS,
            rate_limit_period: Duration::from_secs(defaults::RATE_LIMIT_PERIOD_SECS),
            allowed_origins: Vec::new(),
            run_worker: false,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` / `PORT` | `0.0.0.0` / `8000` | Listen address |
    /// | `MAX_TITLE_LENGTH` | `500` | Longest accepted title |
    /// | `DEFAULT_PAPER_LIMIT` | `25` | Limit when the request has none |
    /// | `MAX_PAPER_LIMIT` | `1000` | Largest accepted limit |
    /// | `RESULT_INLINE_MAX_CITATIONS` | `100` | Inline result threshold |
    /// | `RATE_LIMIT_ENABLED` | `true` | Global request rate limit |
    /// | `RATE_LIMIT_REQUESTS` | `100` | Requests per period |
    /// | `RATE_LIMIT_PERIOD_SECS` | `60` | Rate limit period |
    /// | `ALLOWED_ORIGINS` | any | Comma-separated CORS origins |
    /// | `WORKER_ENABLED` | `false` | Run a worker in-process |
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<T>().ok())
                .unwrap_or(default)
        }
        fn flag(name: &str, default: bool) -> bool {
            std::env::var(name)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(default)
        }

        let default = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(default.host),
            port: var("PORT", default.port),
            max_title_length: var("MAX_TITLE_LENGTH", default.max_title_length).max(1),
            default_limit: var("DEFAULT_PAPER_LIMIT", default.default_limit).max(1),
            max_limit: var("MAX_PAPER_LIMIT", default.max_limit).max(1),
            inline_max_citations: var("RESULT_INLINE_MAX_CITATIONS", default.inline_max_citations),
            max_body_bytes: default.max_body_bytes,
            rate_limit_enabled: flag("RATE_LIMIT_ENABLED", default.rate_limit_enabled),
            rate_limit_requests: var("RATE_LIMIT_REQUESTS", default.rate_limit_requests).max(1),
            rate_limit_period: Duration::from_secs(
                var("RATE_LIMIT_PERIOD_SECS", defaults::RATE_LIMIT_PERIOD_SECS).max(1),
            ),
            allowed_origins: parse_allowed_origins(
                &std::env::var("ALLOWED_ORIGINS").unwrap_or_default(),
            ),
            run_worker: flag("WORKER_ENABLED", default.run_worker),
        }
    }

    pub fn with_rate_limit(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = enabled;
        self
    }

    pub fn with_inline_max_citations(mut self, max: usize) -> Self {
        self.inline_max_citations = max;
        self
    }

    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a comma-separated origin list, skipping entries that are not
/// valid header values.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_title_length, 500);
        assert_eq!(config.default_limit, 25);
        assert_eq!(config.max_limit, 1000);
        assert_eq!(config.inline_max_citations, 100);
        assert!(config.rate_limit_enabled);
        assert!(!config.run_worker);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_parse_allowed_origins() {
        let origins = parse_allowed_origins("http://localhost:3000, https://lit.example.org,,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[1], "https://lit.example.org");
        assert!(parse_allowed_origins("").is_empty());
    }

    #[test]
    fn test_builders() {
        let config = ApiConfig::default()
            .with_rate_limit(false)
            .with_inline_max_citations(3);
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.inline_max_citations, 3);
    }
}
