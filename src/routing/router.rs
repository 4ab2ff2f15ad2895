//! Policy lookup for requests.
//!
//! # Responsibilities
//! - Store compiled policy rules
//! - Return every policy whose rule matches a request, in priority order
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan over rules (acceptable for typical rule counts)
//! - All matches are returned, not just the first: a global policy and a
//!   route-specific policy both apply to the same request

use axum::body::Body;
use axum::http::Request;

use crate::config::PolicyRuleConfig;
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPrefixMatcher};

#[derive(Debug)]
struct CompiledRule {
    policy: String,
    priority: u32,
    matcher: AndMatcher,
}

/// Maps requests to the names of the rate limit policies that apply to them.
#[derive(Debug, Default)]
pub struct PolicyRouter {
    rules: Vec<CompiledRule>,
}

impl PolicyRouter {
    /// Compile rules, highest priority first. Equal priorities keep their
    /// declaration order.
    pub fn from_rules(rules: &[PolicyRuleConfig]) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .iter()
            .map(|rule| {
                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                if !rule.methods.is_empty() {
                    matchers.push(Box::new(MethodMatcher::new(&rule.methods)));
                }
                if let Some(prefix) = &rule.path_prefix {
                    matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
                }
                CompiledRule {
                    policy: rule.policy.clone(),
                    priority: rule.priority,
                    matcher: AndMatcher::new(matchers),
                }
            })
            .collect();

        compiled.sort_by(|a, b| b.priority.cmp(&a.priority));

        Self { rules: compiled }
    }

    /// Names of all policies matching `req`, without duplicates.
    pub fn matching_policies(&self, req: &Request<Body>) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if rule.matcher.matches(req) && !names.contains(&rule.policy.as_str()) {
                names.push(&rule.policy);
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
