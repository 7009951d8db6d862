//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proxy_runtime::config::{ClusterConfig, ConfigSnapshot, DestinationConfig, RouteConfig, RouteMatch};
use proxy_runtime::health::{ActiveHealthCheckMonitor, ProbeOutcome, ProbeRequest, ProbeTransport};
use proxy_runtime::load_balancer::LoadBalancer;
use proxy_runtime::reconcile::ConfigReconciler;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` returns the status code to answer each request with.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = u16> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let status = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status_text
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Backend answering every request with a fixed status.
pub async fn start_mock_backend(status: u16) -> SocketAddr {
    start_programmable_backend(move || async move { status }).await
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Probe transport whose outcomes are set per destination.
///
/// While `hold` is set, probes block until released or cancelled, which
/// keeps them in flight for shutdown tests.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    hold: AtomicBool,
    release: Notify,
    pub in_flight: AtomicUsize,
    pub sent: AtomicUsize,
    pub canceled: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn holding() -> Arc<Self> {
        let transport = Self::default();
        transport.hold.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn set_outcome(&self, destination_id: &str, outcome: ProbeOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(destination_id.to_string(), outcome);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn send(&self, request: &ProbeRequest, cancel: &CancellationToken) -> ProbeOutcome {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let outcome = if self.hold.load(Ordering::SeqCst) {
            tokio::select! {
                _ = cancel.cancelled() => ProbeOutcome::Canceled,
                _ = self.release.notified() => self.outcome_for(&request.destination_id),
            }
        } else {
            self.outcome_for(&request.destination_id)
        };

        if outcome == ProbeOutcome::Canceled {
            self.canceled.fetch_add(1, Ordering::SeqCst);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

impl ScriptedTransport {
    fn outcome_for(&self, destination_id: &str) -> ProbeOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .get(destination_id)
            .copied()
            .unwrap_or(ProbeOutcome::Success)
    }
}

/// Reconciler over `transport` with the built-in policies.
pub fn reconciler(transport: Arc<dyn ProbeTransport>, max_concurrent_probes: usize) -> Arc<ConfigReconciler> {
    let health = Arc::new(ActiveHealthCheckMonitor::new(transport, max_concurrent_probes));
    Arc::new(ConfigReconciler::new(health, Arc::new(LoadBalancer::new())))
}

/// Fluent builder for snapshots.
#[derive(Debug, Default, Clone)]
pub struct SnapshotBuilder {
    clusters: Vec<ClusterConfig>,
    destinations: BTreeMap<String, Vec<DestinationConfig>>,
    routes: Vec<RouteConfig>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cluster(mut self, config: ClusterConfig) -> Self {
        self.clusters.push(config);
        self
    }

    pub fn destination(mut self, cluster_id: &str, id: &str, address: &str) -> Self {
        self.destinations
            .entry(cluster_id.to_string())
            .or_default()
            .push(DestinationConfig::new(id, address));
        self
    }

    /// Route matching every path under `/`.
    pub fn route(mut self, id: &str, cluster_id: &str) -> Self {
        let mut route = RouteConfig::new(id, cluster_id);
        route.route_match = RouteMatch {
            path: Some("/".to_string()),
            ..RouteMatch::default()
        };
        self.routes.push(route);
        self
    }

    pub fn build(self) -> ConfigSnapshot {
        ConfigSnapshot {
            routes: self.routes,
            clusters: self.clusters,
            destinations: self.destinations,
        }
    }
}

/// Cluster config with active checks enabled at `interval_ms`.
pub fn probed_cluster(id: &str, interval_ms: u64) -> ClusterConfig {
    let mut config = ClusterConfig::new(id);
    config.health_check.active.enabled = true;
    config.health_check.active.interval_ms = interval_ms;
    config.health_check.active.timeout_ms = 1_000;
    config
}
