//! Cluster runtime state.
//!
//! # Responsibilities
//! - Hold a cluster's config and destination map
//! - Derive the all/available destination lists (`ClusterDynamicState`)
//! - Recompute that derived state whenever membership or health changes
//!
//! # Design Decisions
//! - Destinations live in a `DashMap`; readers on the request path only
//!   ever touch the published `ClusterDynamicState`
//! - Each member's health slot is watched through `SlotSnapshot::on_change`,
//!   so a probe verdict recomputes the dynamic state without polling
//! - Watch callbacks hold weak references and stop re-arming once the
//!   destination leaves the cluster

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError, Weak};

use dashmap::DashMap;

use crate::config::ClusterConfig;
use crate::model::{AtomicSlot, DestinationState};
use crate::observability::metrics;

/// Destinations of a cluster, derived from the destination map and health.
#[derive(Debug, Default)]
pub struct ClusterDynamicState {
    all_destinations: Vec<Arc<DestinationState>>,
    available_destinations: Vec<Arc<DestinationState>>,
}

impl ClusterDynamicState {
    /// Every destination, ordered by id.
    pub fn all_destinations(&self) -> &[Arc<DestinationState>] {
        &self.all_destinations
    }

    /// Destinations that may receive traffic, ordered by id.
    pub fn available_destinations(&self) -> &[Arc<DestinationState>] {
        &self.available_destinations
    }

    fn same_members(&self, all: &[Arc<DestinationState>], available: &[Arc<DestinationState>]) -> bool {
        fn same(a: &[Arc<DestinationState>], b: &[Arc<DestinationState>]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
        }
        same(&self.all_destinations, all) && same(&self.available_destinations, available)
    }
}

/// A logical group of interchangeable destinations.
pub struct ClusterState {
    cluster_id: String,
    config: AtomicSlot<ClusterConfig>,
    destinations: DashMap<String, Arc<DestinationState>>,
    dynamic_state: AtomicSlot<ClusterDynamicState>,
    /// Serializes recomputation so a slower writer cannot publish stale lists.
    recompute: Mutex<()>,
    /// Set by every recompute request; cleared by the lock holder.
    recompute_pending: AtomicBool,
    /// Set once the cluster has been removed from the live configuration.
    retired: AtomicBool,
}

impl ClusterState {
    /// Create an empty cluster.
    pub fn new(config: ClusterConfig) -> Arc<Self> {
        Arc::new(Self {
            cluster_id: config.id.clone(),
            config: AtomicSlot::new(config),
            destinations: DashMap::new(),
            dynamic_state: AtomicSlot::default(),
            recompute: Mutex::new(()),
            recompute_pending: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Mark the cluster as removed. Requests still holding it keep working,
    /// but per-cluster policy state is no longer created for it.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Current config.
    pub fn config(&self) -> Arc<ClusterConfig> {
        self.config.value()
    }

    pub fn config_slot(&self) -> &AtomicSlot<ClusterConfig> {
        &self.config
    }

    /// Current derived destination lists.
    pub fn dynamic_state(&self) -> Arc<ClusterDynamicState> {
        self.dynamic_state.value()
    }

    pub fn dynamic_state_slot(&self) -> &AtomicSlot<ClusterDynamicState> {
        &self.dynamic_state
    }

    pub fn destination(&self, destination_id: &str) -> Option<Arc<DestinationState>> {
        self.destinations
            .get(destination_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of the destination map, ordered by id.
    pub fn destinations(&self) -> Vec<Arc<DestinationState>> {
        let mut destinations: Vec<_> = self
            .destinations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        destinations.sort_by(|a, b| a.destination_id().cmp(b.destination_id()));
        destinations
    }

    pub fn destination_ids(&self) -> Vec<String> {
        self.destinations.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Insert or replace a destination and start watching its health.
    ///
    /// The dynamic state is not recomputed; callers batch that.
    pub fn add_destination(
        self: &Arc<Self>,
        destination: Arc<DestinationState>,
    ) -> Option<Arc<DestinationState>> {
        let previous = self
            .destinations
            .insert(destination.destination_id().to_string(), Arc::clone(&destination));
        watch_health(Arc::downgrade(self), Arc::downgrade(&destination));
        previous
    }

    /// Remove a destination. The dynamic state is not recomputed.
    pub fn remove_destination(&self, destination_id: &str) -> Option<Arc<DestinationState>> {
        self.destinations.remove(destination_id).map(|(_, d)| d)
    }

    fn is_member(&self, destination: &Arc<DestinationState>) -> bool {
        self.destinations
            .get(destination.destination_id())
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), destination))
    }

    /// Recompute and publish the dynamic state.
    ///
    /// A call that lands while another recompute holds the lock (including a
    /// nested call from a change callback) marks the state dirty and returns;
    /// the holder recomputes again before it leaves. Returns true if this
    /// call published new lists.
    pub fn update_dynamic_state(&self) -> bool {
        self.recompute_pending.store(true, Ordering::SeqCst);
        let mut published = false;
        loop {
            let guard = match self.recompute.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return published,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            if !self.recompute_pending.swap(false, Ordering::SeqCst) {
                return published;
            }
            published |= self.recompute_locked();
            drop(guard);
            if !self.recompute_pending.load(Ordering::SeqCst) {
                return published;
            }
        }
    }

    /// Caller holds `recompute`.
    fn recompute_locked(&self) -> bool {
        let config = self.config();
        let active_enabled = config.health_check.active.enabled;
        let passive_enabled = config.health_check.passive.enabled;

        let all = self.destinations();
        let available: Vec<_> = all
            .iter()
            .filter(|d| d.health().is_available(active_enabled, passive_enabled))
            .cloned()
            .collect();

        if self.dynamic_state.value().same_members(&all, &available) {
            return false;
        }

        tracing::debug!(
            cluster_id = %self.cluster_id,
            all = all.len(),
            available = available.len(),
            "Cluster destinations recomputed"
        );
        for destination in &all {
            let up = available.iter().any(|d| Arc::ptr_eq(d, destination));
            metrics::record_destination_health(&self.cluster_id, destination.destination_id(), up);
        }
        self.dynamic_state.publish(ClusterDynamicState {
            all_destinations: all,
            available_destinations: available,
        });
        true
    }
}

impl fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterState")
            .field("cluster_id", &self.cluster_id)
            .field("destinations", &self.destinations.len())
            .finish()
    }
}

/// Recompute the cluster whenever the destination's health is republished.
fn watch_health(cluster: Weak<ClusterState>, destination: Weak<DestinationState>) {
    let Some(current) = destination.upgrade() else {
        return;
    };
    let snapshot = current.health_slot().snapshot();
    drop(current);

    snapshot.on_change(move || {
        let (Some(cluster), Some(member)) = (cluster.upgrade(), destination.upgrade()) else {
            return;
        };
        if !cluster.is_member(&member) {
            return;
        }
        drop(member);
        // Re-arm before reading health so a publish racing the recompute
        // still fires.
        watch_health(Arc::downgrade(&cluster), destination);
        cluster.update_dynamic_state();
    });
}
