//! Config reconciler.
//!
//! # Responsibilities
//! - Own the registry of clusters, destinations and routes
//! - Diff each new snapshot against it and apply item by item
//! - Drive the health monitor and republish the endpoint table
//! - Own the passive health observer the forwarding path reports into
//!
//! # Design Decisions
//! - Validation runs first; invalid items are reported and skipped, and
//!   whatever runtime state they had stays as last-known-good
//! - Configs are compared by value, so re-applying an equal snapshot
//!   publishes nothing and restarts no prober
//! - A changed destination address replaces the destination, dropping its
//!   health and in-flight count; any other change republishes its config
//! - The endpoint table is rebuilt at most once per apply, after every
//!   cluster and route has been updated
//! - Removed clusters are unlinked from routes and the table before their
//!   prober is stopped and the entry is dropped
//! - Applies are serialized; readers never wait on them

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::{
    validate_snapshot, ClusterConfig, ConfigSnapshot, DestinationConfig, ValidationReport,
};
use crate::health::{ActiveHealthCheckMonitor, PassiveHealthObserver};
use crate::load_balancer::LoadBalancer;
use crate::model::{ClusterState, DestinationState, RouteState};
use crate::observability::metrics;
use crate::reconcile::report::{ErrorReporter, ReconcileError, ReportedError};
use crate::routing::{DynamicEndpointTable, RouteEndpoint};

/// Applies declarative snapshots to the runtime model.
pub struct ConfigReconciler {
    clusters: DashMap<String, Arc<ClusterState>>,
    routes: DashMap<String, Arc<RouteState>>,
    endpoint_table: Arc<DynamicEndpointTable>,
    health: Arc<ActiveHealthCheckMonitor>,
    passive: Arc<PassiveHealthObserver>,
    load_balancer: Arc<LoadBalancer>,
    apply_lock: tokio::sync::Mutex<()>,
    last_errors: ArcSwap<Vec<ReportedError>>,
    applies: AtomicU64,
}

/// Forwards to the caller's reporter and remembers what was reported.
struct ApplyErrors<'a> {
    reporter: &'a dyn ErrorReporter,
    reported: Mutex<Vec<ReportedError>>,
}

impl<'a> ApplyErrors<'a> {
    fn new(reporter: &'a dyn ErrorReporter) -> Self {
        Self {
            reporter,
            reported: Mutex::new(Vec::new()),
        }
    }

    fn report(&self, code: &str, item_id: &str, message: &str) {
        metrics::record_config_error(code);
        self.reporter.report_error(code, item_id, message);
        self.reported
            .lock()
            .expect("apply errors mutex poisoned")
            .push(ReportedError {
                code: code.to_string(),
                item_id: item_id.to_string(),
                message: message.to_string(),
            });
    }

    fn report_reconcile(&self, error: ReconcileError) {
        self.report(error.code(), &error.item_id(), &error.to_string());
    }

    fn into_inner(self) -> Vec<ReportedError> {
        self.reported
            .into_inner()
            .expect("apply errors mutex poisoned")
    }
}

/// Counts of what one apply changed, for the summary log line.
#[derive(Debug, Default)]
struct ApplyStats {
    clusters_added: usize,
    clusters_updated: usize,
    clusters_removed: usize,
    destinations_changed: usize,
    routes_changed: usize,
}

impl ConfigReconciler {
    pub fn new(health: Arc<ActiveHealthCheckMonitor>, load_balancer: Arc<LoadBalancer>) -> Self {
        Self {
            clusters: DashMap::new(),
            routes: DashMap::new(),
            endpoint_table: Arc::new(DynamicEndpointTable::new()),
            health,
            passive: Arc::new(PassiveHealthObserver::new()),
            load_balancer,
            apply_lock: tokio::sync::Mutex::new(()),
            last_errors: ArcSwap::from_pointee(Vec::new()),
            applies: AtomicU64::new(0),
        }
    }

    /// Bring the runtime model in line with `snapshot`.
    ///
    /// Every problem goes to `reporter`; valid items apply regardless.
    /// Returns true when nothing was reported.
    pub async fn apply(&self, snapshot: &ConfigSnapshot, reporter: &dyn ErrorReporter) -> bool {
        let _guard = self.apply_lock.lock().await;
        let errors = ApplyErrors::new(reporter);
        let mut stats = ApplyStats::default();

        let report = validate_snapshot(snapshot, |name| self.load_balancer.has_policy(name));
        for error in &report.errors {
            errors.report(error.code(), &error.item_id(), &error.to_string());
        }

        let declared_clusters: HashSet<&str> = snapshot
            .clusters
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        let removed_clusters: Vec<String> = self
            .clusters
            .iter()
            .filter(|entry| !declared_clusters.contains(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut mutated: Vec<Arc<ClusterState>> = Vec::new();
        for config in &snapshot.clusters {
            if !report.is_cluster_valid(&config.id) {
                continue;
            }
            let destinations = snapshot.destinations_for(&config.id);
            if let Some(cluster) = self.apply_cluster(config, destinations, &report, &mut stats) {
                mutated.push(cluster);
            }
        }

        let mut routes_changed =
            self.apply_routes(snapshot, &report, &removed_clusters, &errors, &mut stats);

        for cluster in &mutated {
            cluster.update_dynamic_state();
        }

        // Retained routes must not keep pointing at a cluster being removed.
        for entry in self.routes.iter() {
            let unlinked = entry
                .value()
                .cluster()
                .is_some_and(|c| removed_clusters.iter().any(|id| id == c.cluster_id()));
            if unlinked {
                entry.value().set_cluster(None);
                routes_changed = true;
            }
        }

        if routes_changed {
            self.publish_endpoints();
        }

        let surviving: Vec<Arc<ClusterState>> = self
            .clusters
            .iter()
            .filter(|entry| !removed_clusters.contains(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.health.update_tracked_clusters(&surviving).await;

        for id in &removed_clusters {
            if let Some((_, cluster)) = self.clusters.remove(id) {
                cluster.retire();
            }
            self.load_balancer.forget_cluster(id);
            self.passive.forget_cluster(id);
            stats.clusters_removed += 1;
            tracing::info!(cluster_id = %id, "Cluster removed");
        }

        let reported = errors.into_inner();
        let clean = reported.is_empty();
        self.last_errors.store(Arc::new(reported));
        self.applies.fetch_add(1, Ordering::Relaxed);
        metrics::record_config_apply(clean);

        tracing::info!(
            clusters = self.clusters.len(),
            routes = self.routes.len(),
            clusters_added = stats.clusters_added,
            clusters_updated = stats.clusters_updated,
            clusters_removed = stats.clusters_removed,
            destinations_changed = stats.destinations_changed,
            routes_changed = stats.routes_changed,
            errors = self.last_errors.load().len(),
            "Configuration applied"
        );
        clean
    }

    /// Create or update one valid cluster and its destinations.
    ///
    /// Returns the cluster if its dynamic state needs recomputing.
    fn apply_cluster(
        &self,
        config: &ClusterConfig,
        destinations: &[DestinationConfig],
        report: &ValidationReport,
        stats: &mut ApplyStats,
    ) -> Option<Arc<ClusterState>> {
        let existing = self.clusters.get(&config.id).map(|e| Arc::clone(e.value()));
        let (cluster, mut mutated) = match existing {
            Some(cluster) => {
                let changed = *cluster.config() != *config;
                if changed {
                    cluster.config_slot().publish(config.clone());
                    stats.clusters_updated += 1;
                    tracing::debug!(cluster_id = %config.id, "Cluster config updated");
                }
                (cluster, changed)
            }
            None => {
                let cluster = ClusterState::new(config.clone());
                self.clusters.insert(config.id.clone(), Arc::clone(&cluster));
                stats.clusters_added += 1;
                tracing::info!(cluster_id = %config.id, "Cluster added");
                (cluster, true)
            }
        };

        let declared: HashSet<&str> = destinations
            .iter()
            .map(|d| d.id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        for id in cluster.destination_ids() {
            if !declared.contains(id.as_str()) && cluster.remove_destination(&id).is_some() {
                stats.destinations_changed += 1;
                mutated = true;
                tracing::debug!(cluster_id = %config.id, destination_id = %id, "Destination removed");
            }
        }

        for destination in destinations {
            if !report.is_destination_valid(&config.id, &destination.id) {
                continue;
            }
            let changed = match cluster.destination(&destination.id) {
                None => {
                    cluster.add_destination(Arc::new(DestinationState::new(destination.clone())));
                    true
                }
                Some(current) => {
                    let current_config = current.config();
                    if current_config.address != destination.address {
                        tracing::info!(
                            cluster_id = %config.id,
                            destination_id = %destination.id,
                            from = %current_config.address,
                            to = %destination.address,
                            "Destination address changed, replacing"
                        );
                        cluster.add_destination(Arc::new(DestinationState::new(destination.clone())));
                        true
                    } else if *current_config != *destination {
                        current.config_slot().publish(destination.clone());
                        true
                    } else {
                        false
                    }
                }
            };
            if changed {
                stats.destinations_changed += 1;
                mutated = true;
            }
        }

        mutated.then_some(cluster)
    }

    /// Create, update and remove routes. Returns true if any route changed.
    fn apply_routes(
        &self,
        snapshot: &ConfigSnapshot,
        report: &ValidationReport,
        removed_clusters: &[String],
        errors: &ApplyErrors<'_>,
        stats: &mut ApplyStats,
    ) -> bool {
        let declared: HashSet<&str> = snapshot
            .routes
            .iter()
            .map(|r| r.id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        let removed: Vec<String> = self
            .routes
            .iter()
            .filter(|entry| !declared.contains(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();
        for id in &removed {
            self.routes.remove(id);
            stats.routes_changed += 1;
            tracing::debug!(route_id = %id, "Route removed");
        }

        for config in &snapshot.routes {
            if !report.is_route_valid(&config.id) {
                continue;
            }

            let cluster = if removed_clusters.contains(&config.cluster_id) {
                None
            } else {
                self.clusters
                    .get(&config.cluster_id)
                    .map(|e| Arc::clone(e.value()))
            };
            if cluster.is_none() {
                errors.report_reconcile(ReconcileError::UnresolvedClusterReference {
                    route_id: config.id.clone(),
                    cluster_id: config.cluster_id.clone(),
                });
            }

            let existing = self.routes.get(&config.id).map(|e| Arc::clone(e.value()));
            let changed = match existing {
                None => {
                    self.routes
                        .insert(config.id.clone(), Arc::new(RouteState::new(config.clone(), cluster)));
                    true
                }
                Some(route) => {
                    let config_changed = *route.config() != *config;
                    if config_changed {
                        route.config_slot().publish(config.clone());
                    }
                    let target_changed = route.set_cluster(cluster);
                    config_changed || target_changed
                }
            };
            if changed {
                stats.routes_changed += 1;
                tracing::debug!(route_id = %config.id, cluster_id = %config.cluster_id, "Route updated");
            }
        }

        !removed.is_empty() || stats.routes_changed > 0
    }

    /// Rebuild the endpoint table from every resolved route.
    fn publish_endpoints(&self) {
        let endpoints: Vec<Arc<RouteEndpoint>> = self
            .routes
            .iter()
            .filter_map(|entry| {
                let route = Arc::clone(entry.value());
                let cluster = route.cluster()?;
                Some(Arc::new(RouteEndpoint::new(route, cluster)))
            })
            .collect();
        metrics::record_endpoint_table_size(endpoints.len());
        self.endpoint_table.update(endpoints);
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<Arc<ClusterState>> {
        self.clusters.get(cluster_id).map(|e| Arc::clone(e.value()))
    }

    /// All clusters, ordered by id.
    pub fn clusters(&self) -> Vec<Arc<ClusterState>> {
        let mut clusters: Vec<_> = self.clusters.iter().map(|e| Arc::clone(e.value())).collect();
        clusters.sort_by(|a, b| a.cluster_id().cmp(b.cluster_id()));
        clusters
    }

    pub fn route(&self, route_id: &str) -> Option<Arc<RouteState>> {
        self.routes.get(route_id).map(|e| Arc::clone(e.value()))
    }

    /// All routes, resolved or not, ordered by id.
    pub fn routes(&self) -> Vec<Arc<RouteState>> {
        let mut routes: Vec<_> = self.routes.iter().map(|e| Arc::clone(e.value())).collect();
        routes.sort_by(|a, b| a.route_id().cmp(b.route_id()));
        routes
    }

    pub fn endpoint_table(&self) -> &Arc<DynamicEndpointTable> {
        &self.endpoint_table
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    pub fn health_monitor(&self) -> &Arc<ActiveHealthCheckMonitor> {
        &self.health
    }

    /// Where request outcomes are reported for passive health checks.
    pub fn passive_health(&self) -> &Arc<PassiveHealthObserver> {
        &self.passive
    }

    /// Errors reported by the most recent apply.
    pub fn last_errors(&self) -> Arc<Vec<ReportedError>> {
        self.last_errors.load_full()
    }

    /// Number of completed applies.
    pub fn apply_count(&self) -> u64 {
        self.applies.load(Ordering::Relaxed)
    }

    /// Stop every health prober and pending passive reactivation.
    pub async fn shutdown(&self) {
        self.health.stop().await;
        self.passive.stop().await;
    }
}

impl std::fmt::Debug for ConfigReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigReconciler")
            .field("clusters", &self.clusters.len())
            .field("routes", &self.routes.len())
            .field("applies", &self.apply_count())
            .finish()
    }
}
