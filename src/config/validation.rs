//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (rules reference existing policies)
//! - Validate value ranges (windows > 0, limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::GateConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("rate limit policy name must not be empty")]
    EmptyPolicyName,

    #[error("duplicate rate limit policy {0:?}")]
    DuplicatePolicy(String),

    #[error("rule references unknown policy {0:?}")]
    UnknownPolicy(String),

    #[error("rule for policy {policy:?} has invalid method {method:?}")]
    InvalidMethod { policy: String, method: String },

    #[error("rule for policy {0:?} has a path prefix that does not start with '/'")]
    InvalidPathPrefix(String),
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        &mut errors,
        "listener.bind_address",
        &config.listener.bind_address,
    );
    check_address(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.request_secs".to_string(),
        });
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero {
            field: "security.max_body_size".to_string(),
        });
    }

    let mut names = HashSet::new();
    for policy in &config.rate_limit.policies {
        if policy.name.is_empty() {
            errors.push(ValidationError::EmptyPolicyName);
        } else if !names.insert(policy.name.as_str()) {
            errors.push(ValidationError::DuplicatePolicy(policy.name.clone()));
        }
        if policy.window_ms == 0 {
            errors.push(ValidationError::Zero {
                field: format!("rate_limit.policies.{}.window_ms", policy.name),
            });
        }
        if policy.max_requests == 0 {
            errors.push(ValidationError::Zero {
                field: format!("rate_limit.policies.{}.max_requests", policy.name),
            });
        }
    }

    for rule in &config.rate_limit.rules {
        if !names.contains(rule.policy.as_str()) {
            errors.push(ValidationError::UnknownPolicy(rule.policy.clone()));
        }
        for method in &rule.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::InvalidMethod {
                    policy: rule.policy.clone(),
                    method: method.clone(),
                });
            }
        }
        if let Some(prefix) = &rule.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::InvalidPathPrefix(rule.policy.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
