//! Per-IP rate limiting middleware using governor.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{net::IpAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::warn;

use crate::analytics::context::client_ip;
use crate::error::AppError;

pub type KeyedRateLimiter =
    RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub enabled: bool,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(300, 60)
    }
}

impl RateLimitConfig {
    pub fn new(requests_per_window: u32, window_secs: u64) -> Self {
        Self {
            requests_per_window,
            window_secs,
            enabled: true,
            burst_size: requests_per_window / 2,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn create_limiter(&self) -> Option<Arc<KeyedRateLimiter>> {
        if !self.enabled || self.requests_per_window == 0 {
            return None;
        }

        // 300 req / 60s -> one token every 200ms
        let replenish_interval_ns =
            (self.window_secs as u128 * 1_000_000_000) / self.requests_per_window as u128;
        let replenish_interval = Duration::from_nanos(replenish_interval_ns.max(1) as u64);

        let burst = NonZeroU32::new(self.burst_size.max(1))?;
        let quota = Quota::with_period(replenish_interval)?.allow_burst(burst);

        Some(Arc::new(RateLimiter::dashmap(quota)))
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Option<Arc<KeyedRateLimiter>>,
    pub config: RateLimitConfig,
    /// Key on the first `X-Forwarded-For` entry instead of the peer.
    pub trust_forwarded_for: bool,
}

impl RateLimitState {
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            limiter: config.create_limiter(),
            config,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn disabled() -> Self {
        Self::with_config(RateLimitConfig::disabled())
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::with_config(RateLimitConfig::default())
    }
}

/// Rejects over-quota clients with [`AppError::RateLimitExceeded`], which the
/// error table renders as 429.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(limiter) = &state.limiter else {
        return Ok(next.run(request).await);
    };

    let ip = client_ip(&request, state.trust_forwarded_for);

    match limiter.check_key(&ip) {
        Ok(_) => {
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&state.config.requests_per_window.to_string())
            {
                response.headers_mut().insert(RATE_LIMIT_HEADER, value);
            }
            Ok(response)
        }
        Err(not_until) => {
            let wait_duration = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait_duration.as_secs().max(1);

            warn!(ip = %ip, retry_after_secs = retry_after, "Rate limit exceeded");

            Err(AppError::RateLimitExceeded {
                retry_after_secs: retry_after,
            })
        }
    }
}
