//! Configuration schema definitions.
//!
//! This module defines the declarative configuration consumed by the
//! reconciler plus the process settings of the runtime binary.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::DEFAULT_POLICY;

/// Root configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Diagnostics API settings.
    pub admin: AdminConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Active health probe scheduler settings.
    pub health: HealthProbeConfig,

    /// Cluster definitions.
    pub clusters: Vec<ClusterConfig>,

    /// Destinations keyed by the id of the cluster they belong to.
    pub destinations: BTreeMap<String, Vec<DestinationConfig>>,

    /// Route definitions.
    pub routes: Vec<RouteConfig>,
}

impl ProxyConfig {
    /// The declarative part of the file, as handed to the reconciler.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            routes: self.routes.clone(),
            clusters: self.clusters.clone(),
            destinations: self.destinations.clone(),
        }
    }
}

/// An immutable desired state: every cluster, destination and route.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub routes: Vec<RouteConfig>,
    pub clusters: Vec<ClusterConfig>,
    pub destinations: BTreeMap<String, Vec<DestinationConfig>>,
}

impl ConfigSnapshot {
    /// Destinations declared for `cluster_id` (empty if none).
    pub fn destinations_for(&self, cluster_id: &str) -> &[DestinationConfig] {
        self.destinations
            .get(cluster_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A logical backend group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Unique cluster identifier.
    pub id: String,

    /// Name of the load balancing policy.
    #[serde(default = "default_policy")]
    pub load_balancing_policy: String,

    /// Active and passive health check options.
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Arbitrary key/value pairs for extensions.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ClusterConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            load_balancing_policy: default_policy(),
            health_check: HealthCheckConfig::default(),
            metadata: BTreeMap::new(),
        }
    }
}

fn default_policy() -> String {
    DEFAULT_POLICY.to_string()
}

/// Health check options for a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub active: ActiveHealthCheckConfig,
    pub passive: PassiveHealthCheckConfig,
}

/// Periodic probing of every destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActiveHealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Delay between probes of one destination, in milliseconds.
    pub interval_ms: u64,

    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Path appended to the destination address.
    pub path: String,
}

impl ActiveHealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ActiveHealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 15_000,
            timeout_ms: 10_000,
            path: "/health".to_string(),
        }
    }
}

/// Health inferred from proxied request outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PassiveHealthCheckConfig {
    /// Enable passive health checks.
    pub enabled: bool,

    /// Consecutive failed requests before the destination is marked unhealthy.
    pub consecutive_failures: u32,

    /// How long a passively unhealthy destination is excluded, in milliseconds.
    pub reactivation_period_ms: u64,
}

impl PassiveHealthCheckConfig {
    pub fn reactivation_period(&self) -> Duration {
        Duration::from_millis(self.reactivation_period_ms)
    }
}

impl Default for PassiveHealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            consecutive_failures: 3,
            reactivation_period_ms: 60_000,
        }
    }
}

/// One backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DestinationConfig {
    /// Identifier, unique within its cluster.
    pub id: String,

    /// Base URL (e.g., "http://127.0.0.1:3000").
    pub address: String,

    /// Overrides the cluster's active health check path.
    #[serde(default)]
    pub health_path: Option<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DestinationConfig {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            health_path: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// A routing rule mapping matching requests to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub id: String,

    /// Cluster to forward to.
    pub cluster_id: String,

    /// Request match criteria.
    #[serde(default, rename = "match")]
    pub route_match: RouteMatch,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RouteConfig {
    pub fn new(id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster_id: cluster_id.into(),
            route_match: RouteMatch::default(),
            priority: 0,
            metadata: BTreeMap::new(),
        }
    }
}

/// Match criteria of a route. Empty criteria match everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteMatch {
    /// Host names, case-insensitive; a leading `*.` matches any subdomain.
    pub hosts: Vec<String>,

    /// Path prefix.
    pub path: Option<String>,

    /// HTTP methods, case-insensitive.
    pub methods: Vec<String>,
}

impl RouteMatch {
    /// True when no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.path.is_none() && self.methods.is_empty()
    }
}

/// Active probe scheduler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthProbeConfig {
    /// Upper bound on probe requests in flight across all clusters.
    pub max_concurrent_probes: usize,
}

impl Default for HealthProbeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Diagnostics API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the diagnostics API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Diagnostics API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let content = r#"
            [health]
            max_concurrent_probes = 10

            [[clusters]]
            id = "c1"
            load_balancing_policy = "RoundRobin"

            [clusters.health_check.active]
            enabled = true
            interval_ms = 500

            [[destinations.c1]]
            id = "d1"
            address = "http://127.0.0.1:9001"

            [[destinations.c1]]
            id = "d2"
            address = "http://127.0.0.1:9002"
            health_path = "/ready"

            [[routes]]
            id = "r1"
            cluster_id = "c1"
            priority = 5

            [routes.match]
            path = "/api"
            hosts = ["example.com"]
        "#;

        let config: ProxyConfig = toml::from_str(content).unwrap();
        assert_eq!(config.health.max_concurrent_probes, 10);

        let snapshot = config.snapshot();
        let cluster = &snapshot.clusters[0];
        assert_eq!(cluster.load_balancing_policy, "RoundRobin");
        assert!(cluster.health_check.active.enabled);
        assert_eq!(cluster.health_check.active.interval_ms, 500);
        // Unset fields keep their defaults.
        assert_eq!(cluster.health_check.active.path, "/health");
        assert!(!cluster.health_check.passive.enabled);

        let destinations = snapshot.destinations_for("c1");
        assert_eq!(destinations.len(), 2);
        assert_eq!(destinations[1].health_path.as_deref(), Some("/ready"));
        assert!(snapshot.destinations_for("missing").is_empty());

        let route = &snapshot.routes[0];
        assert_eq!(route.priority, 5);
        assert_eq!(route.route_match.path.as_deref(), Some("/api"));
    }

    #[test]
    fn test_default_policy() {
        let config: ClusterConfig = toml::from_str(r#"id = "c1""#).unwrap();
        assert_eq!(config.load_balancing_policy, DEFAULT_POLICY);
    }
}
