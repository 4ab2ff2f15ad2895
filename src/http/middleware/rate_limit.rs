//! Rate limiting middleware.

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::http::response;
use crate::observability::metrics;
use crate::security::RateLimiter;

/// Reject the request with 429 when any matching policy is exhausted.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match limiter.check_request(&request) {
        None => next.run(request).await,
        Some(rejection) => {
            tracing::warn!(
                client = %rejection.client,
                policy = %rejection.policy,
                method = %request.method(),
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(&rejection.policy);
            response::rejection(rejection.payload)
        }
    }
}
