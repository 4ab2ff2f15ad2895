//! Rate limit policy selection.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (rule scan)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: names of every matching policy
//!
//! Rule Compilation (at startup and on reload):
//!     PolicyRuleConfig[]
//!     → Compile matchers
//!     → Sort by priority
//!     → Freeze as immutable PolicyRouter
//! ```
//!
//! # Design Decisions
//! - Rules compiled once, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always yields the same policies in the same order

pub mod matcher;
pub mod router;

pub use router::PolicyRouter;
