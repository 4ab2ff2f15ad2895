//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: guard layers around a local health route and
//!   the upstream forwarder
//! - Wire up cross-cutting middleware (tracing, request ID, timeout)
//! - Serve with peer addresses so the rate limiter can key on them
//! - Apply rate limit config reloads and run the expired-entry sweeper

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GateConfig;
use crate::http::middleware::guard;
use crate::http::request::request_id;
use crate::http::response;
use crate::observability::metrics;
use crate::security::{spawn_sweeper, Clock, RateLimiter, SystemClock};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: String,
}

/// HTTP server for the finance gate.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
    limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GateConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a server whose rate limiter reads time from `clock`.
    pub fn with_clock(config: GateConfig, clock: Arc<dyn Clock>) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, clock));

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState {
            client,
            upstream: config.upstream.address.clone(),
        };

        let router = Self::build_router(&config, state, limiter.clone());
        Self {
            router,
            config,
            limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, state: AppState, limiter: Arc<RateLimiter>) -> Router {
        let inner = Router::new()
            .route("/health", get(health_handler))
            .fallback(proxy_handler)
            .with_state(state);

        let timeout = Duration::from_secs(config.timeouts.request_secs);
        guard(inner, limiter, &config.security)
            .layer(TimeoutLayer::new(timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the rate limit section;
    /// the rest of a new config takes effect only after a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTP server starting"
        );

        let sweeper = spawn_sweeper(
            self.limiter.clone(),
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
            shutdown.resubscribe(),
        );
        tokio::spawn(apply_config_updates(
            self.limiter.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_config_updates(
    limiter: Arc<RateLimiter>,
    mut updates: mpsc::UnboundedReceiver<GateConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => limiter.reload(&config.rate_limit),
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Forward an admitted, sanitized request to the upstream API.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(&request);
    let method = request.method().clone();
    let (mut parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("http://{}{}", state.upstream, path_and_query);
    let uri = match target.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Invalid upstream URI");
            return response::error(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_UNAVAILABLE",
                "Upstream request failed",
            );
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Forwarding request"
    );
    parts.uri = uri;

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(upstream_response) => {
            metrics::record_upstream(upstream_response.status().as_u16());
            let (parts, body) = upstream_response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_upstream(StatusCode::BAD_GATEWAY.as_u16());
            response::error(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_UNAVAILABLE",
                "Upstream request failed",
            )
        }
    }
}
