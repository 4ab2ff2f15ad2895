//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

const FIFTEEN_MINUTES_MS: u64 = 15 * 60 * 1000;

/// Root configuration for the finance gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The finance API that admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Payload sanitization and size limits.
    pub security: SecurityConfig,

    /// Rate limiting policies and the rules that select them.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Payload hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Rewrite unsafe strings in body, query and path params.
    pub sanitize_enabled: bool,
    /// Maximum JSON body size in bytes buffered for sanitization.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sanitize_enabled: true,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Take the client identity from the first `X-Forwarded-For` entry.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Interval for evicting expired counters, in seconds. 0 disables the sweeper.
    pub sweep_interval_secs: u64,

    /// Named policies, each with its own counters.
    pub policies: Vec<PolicyConfig>,

    /// Rules selecting which policies apply to a request.
    pub rules: Vec<PolicyRuleConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_forwarded_for: false,
            sweep_interval_secs: 300,
            policies: vec![
                PolicyConfig::new(
                    "general",
                    100,
                    "Too many requests from this IP, please try again later.",
                    "GENERAL_RATE_LIMIT_EXCEEDED",
                ),
                PolicyConfig::new(
                    "transaction",
                    10,
                    "Too many transactions created, please try again later.",
                    "TRANSACTION_RATE_LIMIT_EXCEEDED",
                ),
                PolicyConfig::new(
                    "query",
                    30,
                    "Too many queries, please try again later.",
                    "QUERY_RATE_LIMIT_EXCEEDED",
                ),
                PolicyConfig::new(
                    "auth",
                    5,
                    "Too many authentication attempts, please try again later.",
                    "AUTH_RATE_LIMIT_EXCEEDED",
                ),
            ],
            rules: vec![
                PolicyRuleConfig {
                    policy: "general".to_string(),
                    methods: Vec::new(),
                    path_prefix: None,
                    priority: 100,
                },
                PolicyRuleConfig {
                    policy: "auth".to_string(),
                    methods: Vec::new(),
                    path_prefix: Some("/api/auth".to_string()),
                    priority: 0,
                },
                PolicyRuleConfig {
                    policy: "transaction".to_string(),
                    methods: vec!["POST".to_string()],
                    path_prefix: Some("/api/transactions".to_string()),
                    priority: 0,
                },
                PolicyRuleConfig {
                    policy: "query".to_string(),
                    methods: vec!["GET".to_string()],
                    path_prefix: Some("/api/transactions".to_string()),
                    priority: 0,
                },
            ],
        }
    }
}

/// A named rate limit policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PolicyConfig {
    /// Policy identifier, referenced by rules and used in logs/metrics.
    pub name: String,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per client per window.
    pub max_requests: u64,

    /// Human-readable message in the 429 body.
    pub message: String,

    /// Machine-readable code in the 429 body.
    pub code: String,
}

impl PolicyConfig {
    fn new(name: &str, max_requests: u64, message: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            window_ms: FIFTEEN_MINUTES_MS,
            max_requests,
            message: message.to_string(),
            code: code.to_string(),
        }
    }
}

fn default_window_ms() -> u64 {
    FIFTEEN_MINUTES_MS
}

/// Selects a policy for requests matching a method set and path prefix.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PolicyRuleConfig {
    /// Name of the policy to apply.
    pub policy: String,

    /// HTTP methods to match. Empty matches every method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Rule priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
