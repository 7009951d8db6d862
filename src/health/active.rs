//! Active health checking.
//!
//! # Responsibilities
//! - Keep exactly one prober per cluster with active checks enabled
//! - Bound in-flight probes process-wide with one semaphore
//! - Stop every prober on shutdown and wait for them
//!
//! # Design Decisions
//! - A prober is bound to a config by identity; a republished config stops
//!   the old prober and starts a fresh one instead of diffing fields
//! - The prober map is behind a single async mutex, touched only from
//!   reconciliation and shutdown, never from the request path
//! - Disabling checks on a live cluster resets `Active` to `Unknown`, so a
//!   verdict nobody will refresh cannot keep a destination out

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::health::prober::{ClusterProber, ProbeContext};
use crate::health::transport::ProbeTransport;
use crate::model::{ClusterState, HealthStatus};
use crate::observability::metrics;

pub struct ActiveHealthCheckMonitor {
    context: ProbeContext,
    max_concurrent_probes: usize,
    probers: Mutex<HashMap<String, ClusterProber>>,
    shutdown: CancellationToken,
}

impl ActiveHealthCheckMonitor {
    pub fn new(transport: Arc<dyn ProbeTransport>, max_concurrent_probes: usize) -> Self {
        Self {
            context: ProbeContext {
                transport,
                semaphore: Arc::new(Semaphore::new(max_concurrent_probes)),
            },
            max_concurrent_probes,
            probers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Reconcile probers with the full current set of clusters.
    ///
    /// Clusters absent from `clusters` lose their prober.
    pub async fn update_tracked_clusters(&self, clusters: &[Arc<ClusterState>]) {
        let mut probers = self.probers.lock().await;

        let desired: HashMap<&str, &Arc<ClusterState>> = clusters
            .iter()
            .filter(|c| c.config().health_check.active.enabled)
            .map(|c| (c.cluster_id(), c))
            .collect();

        let stale: Vec<String> = probers
            .iter()
            .filter(|(id, prober)| match desired.get(id.as_str()) {
                Some(cluster) => !Arc::ptr_eq(prober.config(), &cluster.config()),
                None => true,
            })
            .map(|(id, _)| id.clone())
            .collect();

        let stopping: Vec<ClusterProber> = stale
            .iter()
            .filter_map(|id| probers.remove(id))
            .collect();
        let removed = stopping.len();
        join_all(stopping.into_iter().map(ClusterProber::stop)).await;

        // Clusters that stay but no longer probe.
        for id in &stale {
            if desired.contains_key(id.as_str()) {
                continue;
            }
            if let Some(cluster) = clusters.iter().find(|c| c.cluster_id() == id.as_str()) {
                for destination in cluster.destinations() {
                    destination.set_active_health(HealthStatus::Unknown);
                }
            }
        }

        let mut added = 0;
        if !self.shutdown.is_cancelled() {
            for (id, cluster) in &desired {
                if probers.contains_key(*id) {
                    continue;
                }
                let prober = ClusterProber::start(
                    cluster,
                    cluster.config(),
                    self.context.clone(),
                    &self.shutdown,
                );
                probers.insert(id.to_string(), prober);
                added += 1;
            }
        }

        metrics::record_active_probers(probers.len());
        if added > 0 || removed > 0 {
            tracing::info!(
                added = added,
                removed = removed,
                active = probers.len(),
                "Health probers updated"
            );
        }
    }

    /// Stop every prober concurrently and wait for all of them.
    ///
    /// Later calls to `update_tracked_clusters` start nothing.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let stopping: Vec<ClusterProber> = {
            let mut probers = self.probers.lock().await;
            probers.drain().map(|(_, p)| p).collect()
        };
        let count = stopping.len();
        join_all(stopping.into_iter().map(ClusterProber::stop)).await;
        metrics::record_active_probers(0);
        tracing::info!(stopped = count, "Health probers stopped");
    }

    /// Free slots in the shared probe semaphore.
    pub fn available_probe_permits(&self) -> usize {
        self.context.semaphore.available_permits()
    }

    pub fn max_concurrent_probes(&self) -> usize {
        self.max_concurrent_probes
    }

    pub async fn active_prober_count(&self) -> usize {
        self.probers.lock().await.len()
    }

    /// Ids of clusters currently probed, sorted.
    pub async fn probed_clusters(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.probers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ActiveHealthCheckMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveHealthCheckMonitor")
            .field("max_concurrent_probes", &self.max_concurrent_probes)
            .field("available_permits", &self.available_probe_permits())
            .finish()
    }
}
