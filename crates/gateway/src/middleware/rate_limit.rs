//! Global token-bucket rate limiting

use axum::{extract::Request, middleware::Next, response::Response};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use medvault_common::errors::AppError;
use std::num::NonZeroU32;
use std::sync::Arc;

pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Zero values are clamped to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<GlobalRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
}

pub async fn rate_limit_middleware(
    limiter: Arc<GlobalRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}
