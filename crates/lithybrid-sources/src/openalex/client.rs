//! OpenAlex paper source.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use lithybrid_core::{defaults, CandidatePaper, Error, PaperSource, Result, SourceError};

use super::error::{from_reqwest, retry_after, to_source_error, OpenAlexErrorCode};
use super::types::{WorksResponse, WORK_FIELDS};

/// Configuration for the OpenAlex adapter.
#[derive(Debug, Clone)]
pub struct OpenAlexConfig {
    /// API base URL (no trailing `/works`).
    pub base_url: String,
    /// Contact address for the polite pool; sent as `mailto` and in the User-Agent.
    pub mailto: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Pause between pages.
    pub page_delay_ms: u64,
    /// Largest `per-page` requested.
    pub max_per_page: usize,
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENALEX_URL.to_string(),
            mailto: None,
            timeout_seconds: defaults::OPENALEX_TIMEOUT_SECS,
            page_delay_ms: defaults::OPENALEX_PAGE_DELAY_MS,
            max_per_page: defaults::OPENALEX_MAX_PER_PAGE,
        }
    }
}

impl OpenAlexConfig {
    /// Read `OPENALEX_URL`, `OPENALEX_MAILTO`, `OPENALEX_TIMEOUT_SECS`,
    /// `OPENALEX_PAGE_DELAY_MS`.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_url: std::env::var("OPENALEX_URL").unwrap_or(default.base_url),
            mailto: std::env::var("OPENALEX_MAILTO")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            timeout_seconds: std::env::var("OPENALEX_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.timeout_seconds),
            page_delay_ms: std::env::var("OPENALEX_PAGE_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.page_delay_ms),
            max_per_page: default.max_per_page,
        }
    }

    /// User-Agent value, with the contact address when configured.
    pub fn user_agent(&self) -> String {
        match &self.mailto {
            Some(mailto) => format!("{} (mailto:{})", defaults::USER_AGENT, mailto),
            None => defaults::USER_AGENT.to_string(),
        }
    }
}

/// [`PaperSource`] backed by the OpenAlex `/works` search.
pub struct OpenAlexSource {
    client: Client,
    config: OpenAlexConfig,
}

impl OpenAlexSource {
    /// Create a new OpenAlex source with the given configuration.
    pub fn new(config: OpenAlexConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "sources",
            source = "openalex",
            url = %config.base_url,
            polite_pool = config.mailto.is_some(),
            "Initializing OpenAlex source"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAlexConfig::from_env())
    }

    pub fn config(&self) -> &OpenAlexConfig {
        &self.config
    }

    async fn fetch_page(
        &self,
        title: &str,
        page: usize,
        per_page: usize,
    ) -> std::result::Result<WorksResponse, SourceError> {
        let url = format!("{}/works", self.config.base_url.trim_end_matches('/'));
        let mut query: Vec<(&str, String)> = vec![
            ("search", title.to_string()),
            ("per-page", per_page.to_string()),
            ("page", page.to_string()),
            ("select", WORK_FIELDS.join(",")),
        ];
        if let Some(ref mailto) = self.config.mailto {
            query.push(("mailto", mailto.clone()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let code = OpenAlexErrorCode::from_status(status.as_u16());
            return Err(to_source_error(
                code,
                status.as_u16(),
                retry_after(response.headers()),
            ));
        }

        response.json::<WorksResponse>().await.map_err(from_reqwest)
    }
}

#[async_trait]
impl PaperSource for OpenAlexSource {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn search(
        &self,
        title: &str,
        limit: usize,
    ) -> std::result::Result<Vec<CandidatePaper>, SourceError> {
        let start = Instant::now();
        let limit = limit.max(1);
        // Page size is fixed for the whole search so page offsets line up.
        let per_page = limit.min(self.config.max_per_page.max(1));
        let mut papers: Vec<CandidatePaper> = Vec::with_capacity(limit);
        let mut page = 1;

        while papers.len() < limit {
            if page > 1 && self.config.page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
            }

            let response = self.fetch_page(title, page, per_page).await?;
            let received = response.results.len();
            debug!(
                subsystem = "sources",
                source = "openalex",
                page,
                per_page,
                received,
                total = response.meta.as_ref().and_then(|m| m.count),
                "Fetched page"
            );

            papers.extend(
                response
                    .results
                    .into_iter()
                    .filter_map(|w| w.into_candidate()),
            );

            if received < per_page {
                break;
            }
            page += 1;
        }

        papers.truncate(limit);
        info!(
            subsystem = "sources",
            source = "openalex",
            candidate_count = papers.len(),
            pages = page,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAlex search complete"
        );

        if papers.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(papers)
    }
}
