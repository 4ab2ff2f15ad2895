//! Request guard middleware.
//!
//! ```text
//! request → rate_limit (429 on violation) → sanitize (params, query, body) → inner router
//! ```
//!
//! Both layers wrap the inner router as a whole instead of its individual
//! routes, so a rewritten path is what the inner router matches on.

pub mod rate_limit;
pub mod sanitize;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, Router};

use crate::config::SecurityConfig;
use crate::security::{RateLimiter, Sanitizer};

pub use rate_limit::rate_limit_middleware;
pub use sanitize::{sanitize_middleware, SanitizeState};

/// Wrap `inner` with the rate limiter and, when enabled, the sanitizer.
pub fn guard(inner: Router, limiter: Arc<RateLimiter>, security: &SecurityConfig) -> Router {
    let mut app = Router::new().fallback_service(inner);

    if security.sanitize_enabled {
        let state = Arc::new(SanitizeState {
            sanitizer: Sanitizer::default(),
            max_body_size: security.max_body_size,
        });
        app = app.layer(from_fn_with_state(state, sanitize_middleware));
    }

    app.layer(from_fn_with_state(limiter, rate_limit_middleware))
}
