//! Rate limiting middleware.
//!
//! Limits the public code routes per caller, keyed by the hashed client
//! address, using governor's keyed GCRA limiter.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use std::num::NonZeroU32;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::caller::identify_caller;

/// Rate limiter state shared across all requests.
pub struct RateLimiterState {
    limiter: DefaultKeyedRateLimiter<String>,
    rate_limit_per_minute: u32,
}

impl RateLimiterState {
    /// Creates a limiter allowing `rate_limit_per_minute` requests per caller.
    /// Returns `None` when the limit is 0, which disables limiting.
    pub fn new(rate_limit_per_minute: u32) -> Option<Self> {
        let per_minute = NonZeroU32::new(rate_limit_per_minute)?;
        Some(Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            rate_limit_per_minute,
        })
    }

    /// Check if a request from the given caller should be allowed.
    /// Returns Ok(()) if allowed, or Err with retry_after seconds if rate limited.
    pub fn check(&self, ip_hash: &str) -> Result<(), u64> {
        match self.limiter.check_key(&ip_hash.to_string()) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                // Return retry after in seconds, minimum 1 second
                Err(wait_time.as_secs().max(1))
            }
        }
    }

    /// Drops state for callers whose quota has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of callers currently tracked.
    pub fn tracked_callers(&self) -> usize {
        self.limiter.len()
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("tracked_callers", &self.tracked_callers())
            .finish()
    }
}

/// Middleware that applies rate limiting per caller.
///
/// The computed caller identity is stored in request extensions so the
/// handler's `Caller` extractor does not hash the address twice.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let caller = identify_caller(req.headers(), req.extensions(), &state.config.security);

    if let Some(ref rate_limiter) = state.rate_limiter {
        if let Err(retry_after) = rate_limiter.check(&caller.ip_hash) {
            tracing::warn!(
                ip_hash = %caller.ip_hash,
                limit = rate_limiter.rate_limit_per_minute,
                retry_after,
                "Rate limit exceeded"
            );
            metrics::counter!("rate_limited_requests_total").increment(1);
            return ApiError::RateLimited { retry_after }.into_response();
        }
    }

    req.extensions_mut().insert(caller);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_disables() {
        assert!(RateLimiterState::new(0).is_none());
    }

    #[test]
    fn test_rate_limiter_allows_requests() {
        let state = RateLimiterState::new(100).unwrap();
        assert!(state.check("caller-a").is_ok());
    }

    #[test]
    fn test_rate_limiter_exhaustion() {
        let state = RateLimiterState::new(1).unwrap();

        assert!(state.check("caller-a").is_ok());

        let result = state.check("caller-a");
        // Retry-after should be at least 1 second
        assert!(result.unwrap_err() >= 1);
    }

    #[test]
    fn test_rate_limiter_callers_independent() {
        let state = RateLimiterState::new(1).unwrap();

        assert!(state.check("caller-a").is_ok());
        assert!(state.check("caller-b").is_ok());

        assert!(state.check("caller-a").is_err());
        assert!(state.check("caller-b").is_err());
        assert!(state.check("caller-c").is_ok());
    }

    #[test]
    fn test_rate_limiter_same_caller_multiple_checks() {
        let state = RateLimiterState::new(5).unwrap();

        for i in 0..5 {
            assert!(state.check("caller-a").is_ok(), "Request {} should be allowed", i);
        }
        assert!(state.check("caller-a").is_err());
    }

    #[test]
    fn test_tracked_callers() {
        let state = RateLimiterState::new(10).unwrap();
        state.check("caller-a").unwrap();
        state.check("caller-b").unwrap();
        assert_eq!(state.tracked_callers(), 2);

        let debug = format!("{:?}", state);
        assert!(debug.contains("rate_limit_per_minute"));
        assert!(debug.contains("tracked_callers"));
    }
}
