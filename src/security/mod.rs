//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs / policies.rs (per-client limits, 429 on violation)
//!     → sanitize.rs (rewrite unsafe strings in params, query, body)
//!     → Pass to upstream
//! ```
//!
//! # Design Decisions
//! - Rate limiting fails open: a broken counter admits rather than blocks
//! - Sanitization is a best-effort filter, not a validator: it never rejects
//! - All limiter state is owned by an explicit `RateLimiter`, no globals

pub mod clock;
pub mod policies;
pub mod rate_limit;
pub mod sanitize;

pub use clock::{Clock, ManualClock, SystemClock};
pub use policies::{spawn_sweeper, PolicyRegistry, RateLimiter, Rejection};
pub use rate_limit::{Decision, RateLimitEntry, RateLimitGate, RateLimitPolicy};
pub use sanitize::{MongoKeyStripper, OperatorStripper, Sanitizer};
