//! # Middleware Module
//!
//! Inbound rate limiting for the Catty HTTP API.
//!
//! `CATTY_RATE_LIMIT` sets requests per second across all clients
//! (default 100, 0 disables). This is unrelated to the per-endpoint spacing
//! the federation layer applies to outbound calls.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Environment variable holding the inbound limit.
pub const RATE_LIMIT_ENV: &str = "CATTY_RATE_LIMIT";

/// Requests per second when nothing is configured.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Shared inbound limiter.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Build a limiter for `requests_per_second`, falling back to the default
/// for zero.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second)
        .or(NonZeroU32::new(DEFAULT_RATE_LIMIT))
        .unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Configured inbound limit; 0 means disabled.
pub fn get_rate_limit_from_env() -> u32 {
    std::env::var(RATE_LIMIT_ENV)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT)
}

/// Reject with 429 once the limiter is exhausted.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "Inbound rate limit exceeded");
        return Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"));
    }
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_first_request() {
        assert!(create_rate_limiter(5).check().is_ok());
    }

    #[test]
    fn limiter_exhausts_burst() {
        let limiter = create_rate_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_uses_default() {
        let limiter = create_rate_limiter(0);
        for _ in 0..DEFAULT_RATE_LIMIT {
            assert!(limiter.check().is_ok());
        }
    }
}
