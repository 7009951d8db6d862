//! Configuration validation.
//!
//! # Responsibilities
//! - Structural checks of a snapshot before it touches runtime state
//! - Unique ids, parseable addresses, sane health check options
//! - Record which items are invalid so the reconciler can skip just those
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ConfigSnapshot → ValidationReport
//! - A duplicated id invalidates every occurrence of it; a duplicated
//!   destination address invalidates only the later destinations
//! - Route → cluster resolution is left to the reconciler, which also sees
//!   clusters kept from earlier snapshots

use std::collections::HashSet;

use url::Url;

use crate::config::schema::{ClusterConfig, ConfigSnapshot, DestinationConfig, RouteConfig};

/// A structural problem with one config item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{kind} at index {index} has an empty id")]
    EmptyId { kind: &'static str, index: usize },

    #[error("cluster '{cluster_id}' is declared more than once")]
    DuplicateClusterId { cluster_id: String },

    #[error("route '{route_id}' is declared more than once")]
    DuplicateRouteId { route_id: String },

    #[error("destination '{destination_id}' is declared more than once in cluster '{cluster_id}'")]
    DuplicateDestinationId {
        cluster_id: String,
        destination_id: String,
    },

    #[error("destination '{destination_id}' in cluster '{cluster_id}' reuses address '{address}'")]
    DuplicateDestinationAddress {
        cluster_id: String,
        destination_id: String,
        address: String,
    },

    #[error("destination '{destination_id}' in cluster '{cluster_id}' has invalid address '{address}': {reason}")]
    InvalidDestinationAddress {
        cluster_id: String,
        destination_id: String,
        address: String,
        reason: String,
    },

    #[error("cluster '{cluster_id}' has invalid health check options: {reason}")]
    InvalidHealthCheck { cluster_id: String, reason: String },

    #[error("destination '{destination_id}' in cluster '{cluster_id}' has invalid health path '{path}'")]
    InvalidHealthPath {
        cluster_id: String,
        destination_id: String,
        path: String,
    },

    #[error("cluster '{cluster_id}' uses unknown load balancing policy '{policy}'")]
    UnknownLoadBalancingPolicy { cluster_id: String, policy: String },

    #[error("route '{route_id}' has an invalid match: {reason}")]
    InvalidRouteMatch { route_id: String, reason: String },

    #[error("destinations are declared for unknown cluster '{cluster_id}'")]
    DestinationsForUnknownCluster { cluster_id: String },
}

impl ValidationError {
    /// Stable code reported to the error sink.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyId { .. } => "EmptyId",
            ValidationError::DuplicateClusterId { .. } => "DuplicateClusterId",
            ValidationError::DuplicateRouteId { .. } => "DuplicateRouteId",
            ValidationError::DuplicateDestinationId { .. } => "DuplicateDestinationId",
            ValidationError::DuplicateDestinationAddress { .. } => "DuplicateDestinationAddress",
            ValidationError::InvalidDestinationAddress { .. } => "InvalidDestinationAddress",
            ValidationError::InvalidHealthCheck { .. } => "InvalidHealthCheck",
            ValidationError::InvalidHealthPath { .. } => "InvalidHealthCheck",
            ValidationError::UnknownLoadBalancingPolicy { .. } => "UnknownLoadBalancingPolicy",
            ValidationError::InvalidRouteMatch { .. } => "InvalidRouteMatch",
            ValidationError::DestinationsForUnknownCluster { .. } => "DestinationsForUnknownCluster",
        }
    }

    /// Id of the item the error concerns. Destinations are `cluster/destination`.
    pub fn item_id(&self) -> String {
        match self {
            ValidationError::EmptyId { kind, index } => format!("{}[{}]", kind, index),
            ValidationError::DuplicateClusterId { cluster_id }
            | ValidationError::InvalidHealthCheck { cluster_id, .. }
            | ValidationError::UnknownLoadBalancingPolicy { cluster_id, .. }
            | ValidationError::DestinationsForUnknownCluster { cluster_id } => cluster_id.clone(),
            ValidationError::DuplicateRouteId { route_id }
            | ValidationError::InvalidRouteMatch { route_id, .. } => route_id.clone(),
            ValidationError::DuplicateDestinationId {
                cluster_id,
                destination_id,
            }
            | ValidationError::DuplicateDestinationAddress {
                cluster_id,
                destination_id,
                ..
            }
            | ValidationError::InvalidDestinationAddress {
                cluster_id,
                destination_id,
                ..
            }
            | ValidationError::InvalidHealthPath {
                cluster_id,
                destination_id,
                ..
            } => format!("{}/{}", cluster_id, destination_id),
        }
    }
}

/// Outcome of validating a snapshot.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    invalid_clusters: HashSet<String>,
    invalid_destinations: HashSet<(String, String)>,
    invalid_routes: HashSet<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_cluster_valid(&self, cluster_id: &str) -> bool {
        !cluster_id.is_empty() && !self.invalid_clusters.contains(cluster_id)
    }

    pub fn is_destination_valid(&self, cluster_id: &str, destination_id: &str) -> bool {
        !destination_id.is_empty()
            && !self
                .invalid_destinations
                .contains(&(cluster_id.to_string(), destination_id.to_string()))
    }

    pub fn is_route_valid(&self, route_id: &str) -> bool {
        !route_id.is_empty() && !self.invalid_routes.contains(route_id)
    }

    fn invalidate_cluster(&mut self, cluster_id: &str, error: ValidationError) {
        self.invalid_clusters.insert(cluster_id.to_string());
        self.errors.push(error);
    }

    fn invalidate_destination(&mut self, cluster_id: &str, destination_id: &str, error: ValidationError) {
        self.invalid_destinations
            .insert((cluster_id.to_string(), destination_id.to_string()));
        self.errors.push(error);
    }

    fn invalidate_route(&mut self, route_id: &str, error: ValidationError) {
        self.invalid_routes.insert(route_id.to_string());
        self.errors.push(error);
    }
}

/// Validate `snapshot`. `is_known_policy` decides which policy names exist.
pub fn validate_snapshot<F>(snapshot: &ConfigSnapshot, is_known_policy: F) -> ValidationReport
where
    F: Fn(&str) -> bool,
{
    let mut report = ValidationReport::default();

    let cluster_ids = duplicated(snapshot.clusters.iter().map(|c| c.id.as_str()));
    for (index, cluster) in snapshot.clusters.iter().enumerate() {
        if cluster.id.is_empty() {
            report.errors.push(ValidationError::EmptyId { kind: "cluster", index });
            continue;
        }
        if cluster_ids.contains(cluster.id.as_str()) {
            if !report.invalid_clusters.contains(&cluster.id) {
                report.invalidate_cluster(
                    &cluster.id,
                    ValidationError::DuplicateClusterId {
                        cluster_id: cluster.id.clone(),
                    },
                );
            }
            continue;
        }
        validate_cluster(cluster, &is_known_policy, &mut report);
        validate_destinations(&cluster.id, snapshot.destinations_for(&cluster.id), &mut report);
    }

    let declared: HashSet<&str> = snapshot.clusters.iter().map(|c| c.id.as_str()).collect();
    for cluster_id in snapshot.destinations.keys() {
        if !declared.contains(cluster_id.as_str()) {
            report.errors.push(ValidationError::DestinationsForUnknownCluster {
                cluster_id: cluster_id.clone(),
            });
        }
    }

    let route_ids = duplicated(snapshot.routes.iter().map(|r| r.id.as_str()));
    for (index, route) in snapshot.routes.iter().enumerate() {
        if route.id.is_empty() {
            report.errors.push(ValidationError::EmptyId { kind: "route", index });
            continue;
        }
        if route_ids.contains(route.id.as_str()) {
            if !report.invalid_routes.contains(&route.id) {
                report.invalidate_route(
                    &route.id,
                    ValidationError::DuplicateRouteId {
                        route_id: route.id.clone(),
                    },
                );
            }
            continue;
        }
        if let Some(reason) = route_match_problem(route) {
            report.invalidate_route(
                &route.id,
                ValidationError::InvalidRouteMatch {
                    route_id: route.id.clone(),
                    reason,
                },
            );
        }
    }

    report
}

fn duplicated<'a>(ids: impl Iterator<Item = &'a str>) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut duplicates = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            duplicates.insert(id);
        }
    }
    duplicates
}

fn validate_cluster<F>(cluster: &ClusterConfig, is_known_policy: &F, report: &mut ValidationReport)
where
    F: Fn(&str) -> bool,
{
    if !is_known_policy(&cluster.load_balancing_policy) {
        report.invalidate_cluster(
            &cluster.id,
            ValidationError::UnknownLoadBalancingPolicy {
                cluster_id: cluster.id.clone(),
                policy: cluster.load_balancing_policy.clone(),
            },
        );
    }

    let active = &cluster.health_check.active;
    let passive = &cluster.health_check.passive;
    let problem = if active.enabled && active.interval_ms == 0 {
        Some("active interval must be greater than zero".to_string())
    } else if active.enabled && active.timeout_ms == 0 {
        Some("active timeout must be greater than zero".to_string())
    } else if active.enabled && !active.path.starts_with('/') {
        Some(format!("active path '{}' must start with '/'", active.path))
    } else if passive.enabled && passive.consecutive_failures == 0 {
        Some("passive failure threshold must be greater than zero".to_string())
    } else {
        None
    };
    if let Some(reason) = problem {
        report.invalidate_cluster(
            &cluster.id,
            ValidationError::InvalidHealthCheck {
                cluster_id: cluster.id.clone(),
                reason,
            },
        );
    }
}

fn validate_destinations(cluster_id: &str, destinations: &[DestinationConfig], report: &mut ValidationReport) {
    let duplicate_ids = duplicated(destinations.iter().map(|d| d.id.as_str()));
    let mut addresses: HashSet<String> = HashSet::new();

    for (index, destination) in destinations.iter().enumerate() {
        if destination.id.is_empty() {
            report.errors.push(ValidationError::EmptyId {
                kind: "destination",
                index,
            });
            continue;
        }
        if duplicate_ids.contains(destination.id.as_str()) {
            let key = (cluster_id.to_string(), destination.id.clone());
            if !report.invalid_destinations.contains(&key) {
                report.invalidate_destination(
                    cluster_id,
                    &destination.id,
                    ValidationError::DuplicateDestinationId {
                        cluster_id: cluster_id.to_string(),
                        destination_id: destination.id.clone(),
                    },
                );
            }
            continue;
        }

        if let Err(reason) = check_address(&destination.address) {
            report.invalidate_destination(
                cluster_id,
                &destination.id,
                ValidationError::InvalidDestinationAddress {
                    cluster_id: cluster_id.to_string(),
                    destination_id: destination.id.clone(),
                    address: destination.address.clone(),
                    reason,
                },
            );
            continue;
        }

        if let Some(path) = destination.health_path.as_deref() {
            if !path.starts_with('/') {
                report.invalidate_destination(
                    cluster_id,
                    &destination.id,
                    ValidationError::InvalidHealthPath {
                        cluster_id: cluster_id.to_string(),
                        destination_id: destination.id.clone(),
                        path: path.to_string(),
                    },
                );
                continue;
            }
        }

        let normalized = destination.address.trim_end_matches('/').to_ascii_lowercase();
        if !addresses.insert(normalized) {
            report.invalidate_destination(
                cluster_id,
                &destination.id,
                ValidationError::DuplicateDestinationAddress {
                    cluster_id: cluster_id.to_string(),
                    destination_id: destination.id.clone(),
                    address: destination.address.clone(),
                },
            );
        }
    }
}

fn check_address(address: &str) -> Result<(), String> {
    let url = Url::parse(address).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err("missing host".to_string()),
    }
}

fn route_match_problem(route: &RouteConfig) -> Option<String> {
    let route_match = &route.route_match;
    if route_match.is_empty() {
        return Some("at least one of hosts, path or methods is required".to_string());
    }
    if route_match.hosts.iter().any(|h| h.trim().is_empty()) {
        return Some("host entries must not be empty".to_string());
    }
    if route_match.methods.iter().any(|m| m.trim().is_empty()) {
        return Some("method entries must not be empty".to_string());
    }
    if let Some(path) = route_match.path.as_deref() {
        if !path.starts_with('/') {
            return Some(format!("path '{}' must start with '/'", path));
        }
    }
    None
}
