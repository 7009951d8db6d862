//! Route runtime state.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::RouteConfig;
use crate::model::{AtomicSlot, ClusterState};

/// One routing rule and the cluster it currently resolves to.
///
/// The cluster is `None` when the configured cluster id does not exist;
/// such routes stay registered for diagnostics but are never published
/// to the endpoint table.
pub struct RouteState {
    route_id: String,
    config: AtomicSlot<RouteConfig>,
    cluster: ArcSwapOption<ClusterState>,
}

impl RouteState {
    pub fn new(config: RouteConfig, cluster: Option<Arc<ClusterState>>) -> Self {
        Self {
            route_id: config.id.clone(),
            config: AtomicSlot::new(config),
            cluster: ArcSwapOption::new(cluster),
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// Current config.
    pub fn config(&self) -> Arc<RouteConfig> {
        self.config.value()
    }

    pub fn config_slot(&self) -> &AtomicSlot<RouteConfig> {
        &self.config
    }

    /// The resolved cluster, if any.
    pub fn cluster(&self) -> Option<Arc<ClusterState>> {
        self.cluster.load_full()
    }

    /// Point the route at another cluster. Returns true if the target changed.
    pub fn set_cluster(&self, cluster: Option<Arc<ClusterState>>) -> bool {
        let current = self.cluster.load_full();
        let unchanged = match (current.as_ref(), cluster.as_ref()) {
            (Some(current), Some(next)) => Arc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            self.cluster.store(cluster);
        }
        !unchanged
    }

    pub fn is_resolved(&self) -> bool {
        self.cluster.load().is_some()
    }
}

impl fmt::Debug for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteState")
            .field("route_id", &self.route_id)
            .field(
                "cluster",
                &self.cluster.load_full().map(|c| c.cluster_id().to_string()),
            )
            .finish()
    }
}
