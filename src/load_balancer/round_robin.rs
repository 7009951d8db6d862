//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::load_balancer::{LoadBalancingPolicy, RequestContext, ROUND_ROBIN};
use crate::model::{ClusterState, DestinationState};

/// Round-robin selector.
/// Stores one counter per cluster to rotate through its destinations.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    counters: DashMap<String, Arc<AtomicU32>>,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, cluster: &ClusterState) -> Arc<AtomicU32> {
        let cluster_id = cluster.cluster_id();
        if let Some(counter) = self.counters.get(cluster_id) {
            return Arc::clone(counter.value());
        }
        if cluster.is_retired() {
            // Straggler on a removed cluster: rotate without a stored counter.
            return Arc::default();
        }
        let counter = Arc::clone(self.counters.entry(cluster_id.to_string()).or_default().value());
        // Retired after the check above: undo the insert forget_cluster missed.
        if cluster.is_retired() {
            self.counters.remove(cluster_id);
        }
        counter
    }

    /// Number of clusters with a live counter.
    pub fn tracked_clusters(&self) -> usize {
        self.counters.len()
    }
}

impl LoadBalancingPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        ROUND_ROBIN
    }

    fn pick_destination(
        &self,
        _context: &RequestContext,
        cluster: &ClusterState,
        available: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        if available.is_empty() {
            return None;
        }

        let count = self
            .counter(cluster)
            .fetch_add(1, Ordering::Relaxed);
        // Sign bit masked so the index stays valid across the u32 wraparound.
        let index = (count & 0x7FFF_FFFF) as usize % available.len();
        Some(available[index].clone())
    }

    fn forget_cluster(&self, cluster_id: &str) {
        self.counters.remove(cluster_id);
    }
}
