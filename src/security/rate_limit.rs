//! Fixed-window rate limiting per client identity.
//!
//! Each [`RateLimitGate`] owns one policy and one table of client counters.
//! Named policies (general, auth, transaction, query) are separate gates with
//! independent tables; see [`crate::security::policies`].

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Value};
use thiserror::Error;

use crate::observability::metrics;

/// Immutable rate limit configuration for one named policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicy {
    pub name: String,
    pub window_ms: u64,
    pub max_requests: u64,
    /// JSON body sent with the 429 response.
    pub rejection_payload: Value,
}

impl RateLimitPolicy {
    /// Build a policy with the standard error envelope as its rejection payload.
    pub fn new(
        name: impl Into<String>,
        window_ms: u64,
        max_requests: u64,
        message: &str,
        code: &str,
    ) -> Self {
        Self {
            name: name.into(),
            window_ms,
            max_requests,
            rejection_payload: json!({
                "success": false,
                "error": message,
                "code": code,
                "statusCode": 429,
            }),
        }
    }
}

/// Counter state for one client within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u64,
    pub reset_at_ms: u64,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Admit,
    Reject(Value),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("rate limit table lock poisoned")]
    Poisoned,
}

/// Admission control for a single policy.
pub struct RateLimitGate {
    policy: RateLimitPolicy,
    table: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimitGate {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Decide whether `key` may make a request at `now_ms`.
    ///
    /// Internal failures admit the request; they are logged and counted but
    /// never turned into an error response.
    pub fn check(&self, key: &str, now_ms: u64) -> Decision {
        match self.try_check(key, now_ms) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(
                    policy = %self.policy.name,
                    client = %key,
                    error = %e,
                    "Rate limit check failed, admitting request"
                );
                metrics::record_gate_failure(&self.policy.name);
                Decision::Admit
            }
        }
    }

    fn try_check(&self, key: &str, now_ms: u64) -> Result<Decision, GateError> {
        // The whole read-check-write runs under the lock so concurrent
        // requests cannot both slip under the limit.
        let mut table = match self.table.lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.table.clear_poison();
                return Err(GateError::Poisoned);
            }
        };

        match table.get_mut(key) {
            Some(entry) if now_ms <= entry.reset_at_ms => {
                if entry.count >= self.policy.max_requests {
                    // Rejections leave the entry untouched.
                    Ok(Decision::Reject(self.policy.rejection_payload.clone()))
                } else {
                    entry.count += 1;
                    Ok(Decision::Admit)
                }
            }
            _ => {
                table.insert(
                    key.to_string(),
                    RateLimitEntry {
                        count: 1,
                        reset_at_ms: now_ms.saturating_add(self.policy.window_ms),
                    },
                );
                Ok(Decision::Admit)
            }
        }
    }

    /// Current entry for `key`, if any.
    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.table.lock().ok()?.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose window has already passed. Returns how many were removed.
    ///
    /// An expired entry is replaced on its next request anyway, so sweeping
    /// never changes a decision.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let Ok(mut table) = self.table.lock() else {
            return 0;
        };
        let before = table.len();
        table.retain(|_, entry| now_ms <= entry.reset_at_ms);
        before - table.len()
    }
}

impl std::fmt::Debug for RateLimitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGate")
            .field("policy", &self.policy.name)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn policy(window_ms: u64, max_requests: u64) -> RateLimitPolicy {
        RateLimitPolicy::new(
            "test",
            window_ms,
            max_requests,
            "Too many requests",
            "TEST_RATE_LIMIT_EXCEEDED",
        )
    }

    #[test]
    fn test_window_scenario() {
        let gate = RateLimitGate::new(policy(1000, 2));
        let key = "1.2.3.4";

        assert_eq!(gate.check(key, 0), Decision::Admit);
        assert_eq!(gate.entry(key).unwrap().count, 1);

        assert_eq!(gate.check(key, 10), Decision::Admit);
        assert_eq!(gate.entry(key).unwrap().count, 2);

        assert!(!gate.check(key, 20).is_admit());

        assert_eq!(gate.check(key, 1001), Decision::Admit);
        assert_eq!(
            gate.entry(key).unwrap(),
            RateLimitEntry {
                count: 1,
                reset_at_ms: 2001
            }
        );
    }

    #[test]
    fn test_limit_enforcement() {
        let max = 5;
        let gate = RateLimitGate::new(policy(60_000, max));

        for i in 0..max {
            assert!(
                gate.check("k", i * 10).is_admit(),
                "call {} should be admitted",
                i + 1
            );
        }
        match gate.check("k", 100) {
            Decision::Reject(payload) => {
                assert_eq!(payload["statusCode"], 429);
                assert_eq!(payload["success"], false);
                assert_eq!(payload["code"], "TEST_RATE_LIMIT_EXCEEDED");
            }
            Decision::Admit => panic!("call {} should be rejected", max + 1),
        }
    }

    #[test]
    fn test_rejection_does_not_mutate_entry() {
        let gate = RateLimitGate::new(policy(1000, 1));
        gate.check("k", 0);
        let before = gate.entry("k").unwrap();

        for t in 1..50 {
            assert!(!gate.check("k", t).is_admit());
        }
        assert_eq!(gate.entry("k").unwrap(), before);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let gate = RateLimitGate::new(policy(1000, 1));
        gate.check("k", 0);

        // Still inside the window at exactly reset_at.
        assert!(!gate.check("k", 1000).is_admit());
        assert!(gate.check("k", 1001).is_admit());
    }

    #[test]
    fn test_reset_is_relative_to_new_call() {
        let gate = RateLimitGate::new(policy(1000, 3));
        for t in [0, 100, 200] {
            gate.check("k", t);
        }

        assert!(gate.check("k", 5_000).is_admit());
        assert_eq!(gate.entry("k").unwrap().reset_at_ms, 6_000);
    }

    #[test]
    fn test_independent_keys() {
        let gate = RateLimitGate::new(policy(1000, 1));

        assert!(gate.check("a", 0).is_admit());
        assert!(!gate.check("a", 1).is_admit());

        assert!(gate.check("b", 2).is_admit());
        assert_eq!(gate.entry("a").unwrap().count, 1);
        assert_eq!(gate.entry("b").unwrap().count, 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let gate = RateLimitGate::new(policy(1000, 10));
        gate.check("old", 0);
        gate.check("fresh", 900);

        assert_eq!(gate.sweep(1500), 1);
        assert!(gate.entry("old").is_none());
        assert!(gate.entry("fresh").is_some());
        assert_eq!(gate.len(), 1);
    }

    #[test]
    fn test_poisoned_table_fails_open() {
        let gate = Arc::new(RateLimitGate::new(policy(1000, 1)));
        assert!(gate.check("k", 0).is_admit());

        let poisoner = gate.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.table.lock().unwrap();
            panic!("poison the table");
        })
        .join();
        assert!(gate.table.is_poisoned());

        // Would be rejected normally; the failure admits instead.
        assert!(gate.check("k", 1).is_admit());

        // The poison is cleared and counting resumes.
        assert!(!gate.table.is_poisoned());
        assert!(!gate.check("k", 2).is_admit());
    }

    #[test]
    fn test_concurrent_checks_never_overshoot() {
        let gate = Arc::new(RateLimitGate::new(policy(60_000, 50)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    (0..100).filter(|_| gate.check("shared", 0).is_admit()).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
