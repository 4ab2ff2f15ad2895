//! Request guard for the finance API.
//!
//! Every request passes a per-client rate limiter and a payload sanitizer
//! before it is forwarded to the upstream API.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::GateConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
