//! Shared utilities for integration testing.

use std::net::SocketAddr;

use axum::{body::Body, http::Request, Json, Router};
use finance_gate::config::{GateConfig, PolicyConfig, PolicyRuleConfig};
use finance_gate::http::HttpServer;
use finance_gate::lifecycle::Shutdown;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A running gate and the handles to steer it.
pub struct TestGate {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    #[allow(dead_code)]
    pub updates: mpsc::UnboundedSender<GateConfig>,
}

impl TestGate {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> reqwest::Response {
        client().get(self.url(path)).send().await.unwrap()
    }
}

/// Start an upstream that answers every request with a JSON description of it.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().fallback(echo);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn echo(request: Request<Body>) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        serde_json::from_slice(&bytes).unwrap_or(Value::String(text))
    };

    Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "content_length": parts
            .headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok()),
        "received_bytes": bytes.len(),
        "body": body,
    }))
}

/// Start the gate with `config` on an ephemeral port.
pub async fn start_gate(mut config: GateConfig) -> TestGate {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestGate {
        addr,
        shutdown,
        updates,
    }
}

/// Default config forwarding to `upstream`.
pub fn config_for(upstream: SocketAddr) -> GateConfig {
    let mut config = GateConfig::default();
    config.upstream.address = upstream.to_string();
    config.rate_limit.sweep_interval_secs = 0;
    config
}

#[allow(dead_code)]
pub fn policy(name: &str, max_requests: u64) -> PolicyConfig {
    PolicyConfig {
        name: name.to_string(),
        window_ms: 60_000,
        max_requests,
        message: format!("Too many {name} requests"),
        code: format!("{}_RATE_LIMIT_EXCEEDED", name.to_uppercase()),
    }
}

#[allow(dead_code)]
pub fn rule(
    policy: &str,
    methods: &[&str],
    path_prefix: Option<&str>,
    priority: u32,
) -> PolicyRuleConfig {
    PolicyRuleConfig {
        policy: policy.to_string(),
        methods: methods.iter().map(|m| m.to_string()).collect(),
        path_prefix: path_prefix.map(str::to_string),
        priority,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
