//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize subsystems in dependency order (metrics, watcher, server)
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A broken config watcher only disables hot reload
//! - The listener binds last (traffic only when ready)

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use notify::RecommendedWatcher;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, ConfigError, GateConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals::shutdown_signal, Shutdown};
use crate::observability::metrics;

/// Load the config at `path`, or the defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<GateConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(GateConfig::default()),
    }
}

/// Start every subsystem and serve until SIGINT/SIGTERM.
pub async fn run(config: GateConfig, config_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "finance-gate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        rate_limit_enabled = config.rate_limit.enabled,
        policies = config.rate_limit.policies.len(),
        sanitize_enabled = config.security.sanitize_enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let (config_updates, _watcher) = watch(config_path.as_deref());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => shutdown.trigger(),
    }

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Start the config watcher. The returned handle must outlive the server.
fn watch(
    path: Option<&Path>,
) -> (mpsc::UnboundedReceiver<GateConfig>, Option<RecommendedWatcher>) {
    let Some(path) = path else {
        let (_, updates) = mpsc::unbounded_channel();
        return (updates, None);
    };

    let (watcher, updates) = ConfigWatcher::new(path);
    match watcher.run() {
        Ok(handle) => (updates, Some(handle)),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            (updates, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_without_path_uses_defaults() {
        assert_eq!(load(None).unwrap(), GateConfig::default());
    }

    #[tokio::test]
    async fn test_watch_without_path_yields_closed_channel() {
        let (mut updates, handle) = watch(None);
        assert!(handle.is_none());
        assert!(updates.recv().await.is_none());
    }
}
