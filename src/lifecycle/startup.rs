//! Startup orchestration.
//!
//! # Responsibilities
//! - Load configuration and initialize logging/metrics
//! - Build the reconciler and apply the initial snapshot
//! - Start the config watcher and the admin API
//! - Apply reloads until shutdown, then stop in order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (diagnostics only once state exists)
//! - Process settings (admin, observability, probe concurrency) are read
//!   once; reloads only change clusters, destinations and routes

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AppState};
use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, ConfigError, ProxyConfig};
use crate::health::{ActiveHealthCheckMonitor, HttpProbeTransport};
use crate::lifecycle::signals::spawn_signal_listener;
use crate::lifecycle::Shutdown;
use crate::load_balancer::LoadBalancer;
use crate::observability::{logging, metrics};
use crate::reconcile::{ConfigReconciler, LoggingErrorReporter};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind admin listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("admin server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("failed to build probe client: {0}")]
    ProbeClient(#[from] reqwest::Error),
}

/// Reconciler wired to an HTTP probe transport and the built-in policies.
pub fn build_reconciler(config: &ProxyConfig) -> Result<Arc<ConfigReconciler>, StartupError> {
    let health = Arc::new(ActiveHealthCheckMonitor::new(
        Arc::new(HttpProbeTransport::new()?),
        config.health.max_concurrent_probes,
    ));
    Ok(Arc::new(ConfigReconciler::new(health, Arc::new(LoadBalancer::new()))))
}

/// Run the runtime until SIGINT/SIGTERM.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let config = load_config(config_path)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        clusters = config.clusters.len(),
        routes = config.routes.len(),
        max_concurrent_probes = config.health.max_concurrent_probes,
        "proxy-runtime starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let reconciler = build_reconciler(&config)?;
    reconciler
        .apply(&config.snapshot(), &LoggingErrorReporter)
        .await;

    let (watcher, mut updates) = ConfigWatcher::new(config_path);
    let _watch_handle = watcher.run()?;

    let shutdown = Shutdown::new();
    let signals = spawn_signal_listener(shutdown.clone());

    let admin = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address)
            .await
            .map_err(|source| StartupError::Bind {
                address: config.admin.bind_address.clone(),
                source,
            })?;
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        let router = setup_admin_router(AppState::new(reconciler.clone(), &config.admin.api_key));
        let graceful = shutdown.wait_owned();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
        }))
    } else {
        None
    };

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            update = updates.recv() => match update {
                Some(new_config) => {
                    reconciler
                        .apply(&new_config.snapshot(), &LoggingErrorReporter)
                        .await;
                }
                None => {
                    tracing::warn!("Config watcher stopped; waiting for shutdown");
                    shutdown.wait().await;
                    break;
                }
            },
        }
    }

    tracing::info!("Shutting down");
    let mut result = Ok(());
    if let Some(admin) = admin {
        match admin.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => result = Err(StartupError::Serve(e)),
            Err(e) => tracing::error!(error = %e, "Admin server task failed"),
        }
    }
    reconciler.shutdown().await;
    signals.abort();

    tracing::info!("Shutdown complete");
    result
}
