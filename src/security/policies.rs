//! Named rate limit policies and the limiter that applies them.
//!
//! A [`PolicyRegistry`] is compiled from [`RateLimitConfig`]: one gate per
//! named policy plus the rules that pick gates for a request. The
//! [`RateLimiter`] owns the current registry behind an `ArcSwap` so a config
//! reload never blocks in-flight checks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::http::request::client_key;
use crate::observability::metrics;
use crate::routing::PolicyRouter;
use crate::security::clock::Clock;
use crate::security::rate_limit::{Decision, RateLimitGate, RateLimitPolicy};

/// A request turned away by one of the policies.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub policy: String,
    pub client: String,
    pub payload: Value,
}

/// Compiled rate limit configuration.
#[derive(Debug)]
pub struct PolicyRegistry {
    enabled: bool,
    trust_forwarded_for: bool,
    gates: HashMap<String, Arc<RateLimitGate>>,
    router: PolicyRouter,
}

impl PolicyRegistry {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::build(config, None)
    }

    /// Compile `config`, reusing gates from `previous` whose policy is unchanged
    /// so their counters survive a reload.
    fn build(config: &RateLimitConfig, previous: Option<&PolicyRegistry>) -> Self {
        let gates = config
            .policies
            .iter()
            .map(|p| {
                let policy = RateLimitPolicy::new(
                    p.name.clone(),
                    p.window_ms,
                    p.max_requests,
                    &p.message,
                    &p.code,
                );
                let gate = previous
                    .and_then(|prev| prev.gates.get(&p.name))
                    .filter(|gate| gate.policy() == &policy)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(RateLimitGate::new(policy)));
                (p.name.clone(), gate)
            })
            .collect();

        Self {
            enabled: config.enabled,
            trust_forwarded_for: config.trust_forwarded_for,
            gates,
            router: PolicyRouter::from_rules(&config.rules),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn gate(&self, name: &str) -> Option<&Arc<RateLimitGate>> {
        self.gates.get(name)
    }

    /// Gates applying to `req`, highest priority first.
    pub fn gates_for(&self, req: &Request<Body>) -> Vec<&Arc<RateLimitGate>> {
        self.router
            .matching_policies(req)
            .into_iter()
            .filter_map(|name| self.gates.get(name))
            .collect()
    }

    fn sweep(&self, now_ms: u64) -> usize {
        self.gates.values().map(|gate| gate.sweep(now_ms)).sum()
    }
}

/// Per-client admission control across all configured policies.
pub struct RateLimiter {
    registry: ArcSwap<PolicyRegistry>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: ArcSwap::from_pointee(PolicyRegistry::from_config(config)),
            clock,
        }
    }

    /// Snapshot of the current registry.
    pub fn registry(&self) -> Arc<PolicyRegistry> {
        self.registry.load_full()
    }

    /// Swap in a new configuration. Unchanged policies keep their counters.
    pub fn reload(&self, config: &RateLimitConfig) {
        let current = self.registry.load_full();
        let next = PolicyRegistry::build(config, Some(&*current));
        let policies = next.gates.len();
        self.registry.store(Arc::new(next));

        tracing::info!(
            enabled = config.enabled,
            policies,
            rules = config.rules.len(),
            "Rate limit configuration reloaded"
        );
    }

    /// Check `req` against every matching policy, stopping at the first rejection.
    ///
    /// Each admitting policy counts the request even if a later one rejects it.
    pub fn check_request(&self, req: &Request<Body>) -> Option<Rejection> {
        let registry = self.registry.load();
        if !registry.is_enabled() {
            return None;
        }

        let client = client_key(req, registry.trust_forwarded_for);
        let now_ms = self.clock.now_ms();

        for gate in registry.gates_for(req) {
            if let Decision::Reject(payload) = gate.check(&client, now_ms) {
                return Some(Rejection {
                    policy: gate.policy().name.clone(),
                    client,
                    payload,
                });
            }
        }
        None
    }

    /// Evict expired counters from every gate.
    pub fn sweep(&self) -> usize {
        let removed = self.registry.load().sweep(self.clock.now_ms());
        metrics::record_swept(removed);
        removed
    }
}

/// Periodically sweep `limiter` until shutdown. A zero interval disables sweeping.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        tracing::info!("Rate limit sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, "Swept expired rate limit entries");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::debug!("Rate limit sweeper stopped");
    }))
}
