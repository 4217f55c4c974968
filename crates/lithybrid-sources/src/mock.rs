//! Mock paper source for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use lithybrid_core::SourceError;
//! use lithybrid_sources::mock::MockPaperSource;
//!
//! let source = MockPaperSource::with_generated(30)
//!     .fail_next(SourceError::Provider("flaky".into()))
//!     .with_latency_ms(5);
//! assert_eq!(source.call_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use lithybrid_core::{CandidatePaper, PaperSource, SourceError};

/// Mock paper source for testing.
#[derive(Clone)]
pub struct MockPaperSource {
    config: Arc<MockConfig>,
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    papers: Vec<CandidatePaper>,
    latency_ms: u64,
    failure_rate: f64,
    always_fail: Option<SourceError>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    scripted: VecDeque<SourceError>,
}

/// One recorded `search` call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub title: String,
    pub limit: usize,
    pub timestamp: std::time::Instant,
}

/// Synthetic paper with a deterministic id, year, citation count and abstract.
pub fn sample_paper(i: usize) -> CandidatePaper {
    CandidatePaper {
        provider_id: format!("https://openalex.org/W{}", 1000 + i),
        title: format!("Synthetic study number {}", i),
        authors: vec![
            format!("Author{} First", i),
            format!("Coauthor{} Second", i),
        ],
        year: Some(2000 + (i % 25) as i32),
        venue: Some("Journal of Synthetic Results".to_string()),
        abstract_text: Some(format!(
            "Study {i} examines a synthetic question. It reports finding {i}. \
             Further discussion follows."
        )),
        citation_count: Some((i as u64 * 7) % 101),
        doi: Some(format!("10.5555/synthetic.{}", i)),
        url: None,
    }
}

impl Default for MockPaperSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaperSource {
    /// A source that knows no papers (every search is `Empty`).
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A source returning `n` synthetic papers from [`sample_paper`].
    pub fn with_generated(n: usize) -> Self {
        Self::new().with_papers((0..n).map(sample_paper).collect())
    }

    /// Set the papers returned by every search.
    pub fn with_papers(mut self, papers: Vec<CandidatePaper>) -> Self {
        Arc::make_mut(&mut self.config).papers = papers;
        self
    }

    /// Set simulated latency for every search.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set a random failure rate (0.0 - 1.0); failures are `Provider` errors.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail every search with `error`.
    pub fn always_fail(mut self, error: SourceError) -> Self {
        Arc::make_mut(&mut self.config).always_fail = Some(error);
        self
    }

    /// Fail the next search with `error`. Scripted failures queue up.
    pub fn fail_next(self, error: SourceError) -> Self {
        self.lock().scripted.push_back(error);
        self
    }

    /// Get all logged calls for assertion.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens inside a failing test.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl PaperSource for MockPaperSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        title: &str,
        limit: usize,
    ) -> Result<Vec<CandidatePaper>, SourceError> {
        let scripted = {
            let mut state = self.lock();
            state.calls.push(MockCall {
                title: title.to_string(),
                limit,
                timestamp: std::time::Instant::now(),
            });
            state.scripted.pop_front()
        };

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if let Some(error) = scripted.or_else(|| self.config.always_fail.clone()) {
            return Err(error);
        }
        if self.config.failure_rate > 0.0
            && rand::thread_rng().gen::<f64>() < self.config.failure_rate
        {
            return Err(SourceError::Provider("Simulated failure".to_string()));
        }
        if self.config.papers.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(self.config.papers.iter().take(limit).cloned().collect())
    }
}
