//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + request ID + timeout layers)
//!     → middleware/rate_limit.rs (429 on violation)
//!     → middleware/sanitize.rs (rewrite params, query, JSON body)
//!     → server.rs proxy handler (forward to upstream API)
//!     → Send upstream response to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{client_key, UNKNOWN_CLIENT, X_REQUEST_ID};
pub use server::HttpServer;
