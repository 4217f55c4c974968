//! Shared handler state.

use std::sync::Arc;

use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

use lithybrid_core::JobStore;

use crate::config::ApiConfig;

/// Global rate limiter type (direct quota, no keyed bucketing).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
///
/// Handlers hold no job state of their own; everything goes through the store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub config: Arc<ApiConfig>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, config: ApiConfig) -> Self {
        let rate_limiter = if config.rate_limit_enabled {
            let burst = NonZeroU32::new(config.rate_limit_requests.min(u64::from(u32::MAX)) as u32)
                .unwrap_or(NonZeroU32::MIN);
            Quota::with_period(config.rate_limit_period / burst.get())
                .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(burst))))
        } else {
            None
        };

        Self {
            store,
            config: Arc::new(config),
            rate_limiter,
        }
    }
}
