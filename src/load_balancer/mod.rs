//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → ClusterState identified
//!     → ClusterDynamicState::available_destinations (health-filtered)
//!     → LoadBalancer picks the cluster's policy by name:
//!         - first.rs (smallest destination id)
//!         - random.rs (uniform pick)
//!         - round_robin.rs (per-cluster counter)
//!         - power_of_two.rs (two random draws, fewer requests wins)
//!         - least_requests.rs (full scan for fewest requests)
//!     → Return destination; forwarder tracks the request on it
//! ```
//!
//! # Design Decisions
//! - Policies see only the already-filtered list; unhealthy destinations
//!   never reach them
//! - Only RoundRobin keeps state, keyed by cluster id and dropped when the
//!   cluster is removed
//! - Policy names compare case-insensitively; an unknown name at pick time
//!   falls back to the default policy

pub mod first;
pub mod least_requests;
pub mod power_of_two;
pub mod random;
pub mod round_robin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{ClusterState, DestinationState};

pub use crate::routing::RequestContext;
pub use first::FirstPolicy;
pub use least_requests::LeastRequestsPolicy;
pub use power_of_two::PowerOfTwoChoicesPolicy;
pub use random::{RandomPolicy, RandomSource, SeededRandom, ThreadRandom};
pub use round_robin::RoundRobinPolicy;

pub const FIRST: &str = "First";
pub const RANDOM: &str = "Random";
pub const ROUND_ROBIN: &str = "RoundRobin";
pub const POWER_OF_TWO_CHOICES: &str = "PowerOfTwoChoices";
pub const LEAST_REQUESTS: &str = "LeastRequests";

/// Policy used when a cluster does not name one.
pub const DEFAULT_POLICY: &str = POWER_OF_TWO_CHOICES;

/// Trait for load balancing strategies.
pub trait LoadBalancingPolicy: Send + Sync + fmt::Debug {
    /// Name used in cluster config.
    fn name(&self) -> &'static str;

    /// Select a destination from the cluster's available destinations.
    ///
    /// Returns `None` only when `available` is empty.
    fn pick_destination(
        &self,
        context: &RequestContext,
        cluster: &ClusterState,
        available: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>>;

    /// Drop any state kept for a removed cluster.
    fn forget_cluster(&self, _cluster_id: &str) {}
}

/// Registry of policies keyed by name.
#[derive(Debug)]
pub struct LoadBalancer {
    policies: HashMap<String, Arc<dyn LoadBalancingPolicy>>,
}

impl LoadBalancer {
    /// Registry with the built-in policies, drawing randomness per thread.
    pub fn new() -> Self {
        Self::with_random_source(Arc::new(ThreadRandom))
    }

    /// Registry with the built-in policies sharing `random`.
    pub fn with_random_source(random: Arc<dyn RandomSource>) -> Self {
        let mut lb = Self {
            policies: HashMap::new(),
        };
        lb.register(Arc::new(FirstPolicy));
        lb.register(Arc::new(RandomPolicy::new(random.clone())));
        lb.register(Arc::new(RoundRobinPolicy::new()));
        lb.register(Arc::new(PowerOfTwoChoicesPolicy::new(random)));
        lb.register(Arc::new(LeastRequestsPolicy));
        lb
    }

    /// Add or replace a policy under its own name.
    pub fn register(&mut self, policy: Arc<dyn LoadBalancingPolicy>) {
        self.policies
            .insert(policy.name().to_ascii_lowercase(), policy);
    }

    pub fn has_policy(&self, name: &str) -> bool {
        self.policies.contains_key(&name.to_ascii_lowercase())
    }

    pub fn policy(&self, name: &str) -> Option<Arc<dyn LoadBalancingPolicy>> {
        self.policies.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Pick a destination from the cluster's currently available set.
    pub fn pick_destination(
        &self,
        context: &RequestContext,
        cluster: &ClusterState,
    ) -> Option<Arc<DestinationState>> {
        let state = cluster.dynamic_state();
        let available = state.available_destinations();

        match available {
            [] => {
                tracing::debug!(cluster_id = %cluster.cluster_id(), "No available destinations");
                None
            }
            [only] => Some(Arc::clone(only)),
            _ => {
                let config = cluster.config();
                let policy = match self.policy(&config.load_balancing_policy) {
                    Some(policy) => policy,
                    None => {
                        tracing::warn!(
                            cluster_id = %cluster.cluster_id(),
                            policy = %config.load_balancing_policy,
                            "Unknown load balancing policy, using default"
                        );
                        self.policy(DEFAULT_POLICY)?
                    }
                };
                policy.pick_destination(context, cluster, available)
            }
        }
    }

    /// Tell every policy a cluster is gone.
    pub fn forget_cluster(&self, cluster_id: &str) {
        for policy in self.policies.values() {
            policy.forget_cluster(cluster_id);
        }
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{ClusterConfig, DestinationConfig};

    pub fn cluster(id: &str) -> Arc<ClusterState> {
        ClusterState::new(ClusterConfig::new(id))
    }

    pub fn destinations(ids: &[&str]) -> Vec<Arc<DestinationState>> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                Arc::new(DestinationState::new(DestinationConfig::new(
                    *id,
                    format!("http://127.0.0.1:{}", 9000 + i),
                )))
            })
            .collect()
    }

    pub fn context() -> RequestContext {
        RequestContext::new("GET", Some("example.com"), "/")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::{ClusterConfig, DestinationConfig};

    #[test]
    fn test_policy_names_are_case_insensitive() {
        let lb = LoadBalancer::new();
        for name in [FIRST, RANDOM, ROUND_ROBIN, POWER_OF_TWO_CHOICES, LEAST_REQUESTS] {
            assert!(lb.has_policy(name));
            assert!(lb.has_policy(&name.to_ascii_uppercase()));
        }
        assert!(!lb.has_policy("WeightedRandom"));
    }

    #[test]
    fn test_pick_from_cluster() {
        let lb = LoadBalancer::new();
        let mut config = ClusterConfig::new("c1");
        config.load_balancing_policy = "first".into();
        let cluster = ClusterState::new(config);

        assert!(lb.pick_destination(&context(), &cluster).is_none());

        for (id, port) in [("d2", 9002), ("d1", 9001)] {
            cluster.add_destination(Arc::new(DestinationState::new(DestinationConfig::new(
                id,
                format!("http://127.0.0.1:{}", port),
            ))));
        }
        cluster.update_dynamic_state();

        let picked = lb.pick_destination(&context(), &cluster).unwrap();
        assert_eq!(picked.destination_id(), "d1");
    }

    #[test]
    fn test_unknown_policy_falls_back_to_default() {
        let lb = LoadBalancer::new();
        let mut config = ClusterConfig::new("c1");
        config.load_balancing_policy = "Nope".into();
        let cluster = ClusterState::new(config);
        for d in destinations(&["d1", "d2"]) {
            cluster.add_destination(d);
        }
        cluster.update_dynamic_state();

        assert!(lb.pick_destination(&context(), &cluster).is_some());
    }
}
