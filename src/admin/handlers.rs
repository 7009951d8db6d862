use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AppState;
use crate::model::{ClusterState, HealthStatus, RouteState};
use crate::reconcile::ReportedError;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub applies: u64,
    pub clusters: usize,
    pub routes: usize,
    pub endpoints: usize,
    pub active_probers: usize,
    pub probe_permits_available: usize,
    pub max_concurrent_probes: usize,
    pub pending_reactivations: usize,
}

#[derive(Debug, Serialize)]
pub struct DestinationStatus {
    pub id: String,
    pub address: String,
    pub active_health: HealthStatus,
    pub passive_health: HealthStatus,
    pub concurrent_requests: i64,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ClusterStatus {
    pub id: String,
    pub load_balancing_policy: String,
    pub active_checks: bool,
    pub passive_checks: bool,
    pub available: usize,
    pub destinations: Vec<DestinationStatus>,
}

#[derive(Debug, Serialize)]
pub struct RouteStatus {
    pub id: String,
    pub cluster_id: String,
    pub priority: i32,
    pub resolved: bool,
    pub published: bool,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let reconciler = &state.reconciler;
    let health = reconciler.health_monitor();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        applies: reconciler.apply_count(),
        clusters: reconciler.clusters().len(),
        routes: reconciler.routes().len(),
        endpoints: reconciler.endpoint_table().len(),
        active_probers: health.active_prober_count().await,
        probe_permits_available: health.available_probe_permits(),
        max_concurrent_probes: health.max_concurrent_probes(),
        pending_reactivations: reconciler.passive_health().pending_reactivations(),
    })
}

pub async fn get_clusters(State(state): State<AppState>) -> Json<Vec<ClusterStatus>> {
    Json(
        state
            .reconciler
            .clusters()
            .iter()
            .map(|c| cluster_status(c))
            .collect(),
    )
}

pub(crate) fn cluster_status(cluster: &ClusterState) -> ClusterStatus {
    let config = cluster.config();
    let active_enabled = config.health_check.active.enabled;
    let passive_enabled = config.health_check.passive.enabled;
    let dynamic = cluster.dynamic_state();

    let destinations = cluster
        .destinations()
        .iter()
        .map(|d| {
            let health = d.health();
            DestinationStatus {
                id: d.destination_id().to_string(),
                address: d.config().address.clone(),
                active_health: health.active,
                passive_health: health.passive,
                concurrent_requests: d.concurrent_requests(),
                available: health.is_available(active_enabled, passive_enabled),
            }
        })
        .collect();

    ClusterStatus {
        id: cluster.cluster_id().to_string(),
        load_balancing_policy: config.load_balancing_policy.clone(),
        active_checks: active_enabled,
        passive_checks: passive_enabled,
        available: dynamic.available_destinations().len(),
        destinations,
    }
}

pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteStatus>> {
    let endpoints = state.reconciler.endpoint_table().endpoints();
    let routes = state
        .reconciler
        .routes()
        .iter()
        .map(|r| route_status(r, endpoints.iter().any(|e| e.route_id() == r.route_id())))
        .collect();
    Json(routes)
}

fn route_status(route: &RouteState, published: bool) -> RouteStatus {
    let config = route.config();
    RouteStatus {
        id: route.route_id().to_string(),
        cluster_id: config.cluster_id.clone(),
        priority: config.priority,
        resolved: route.is_resolved(),
        published,
    }
}

pub async fn get_errors(State(state): State<AppState>) -> Json<Vec<ReportedError>> {
    Json(state.reconciler.last_errors().as_ref().clone())
}
