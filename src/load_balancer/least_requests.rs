//! Least Requests load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancingPolicy, RequestContext, LEAST_REQUESTS};
use crate::model::{ClusterState, DestinationState};

/// Least requests selector.
/// Selects the destination with the fewest requests in flight.
#[derive(Debug, Default)]
pub struct LeastRequestsPolicy;

impl LoadBalancingPolicy for LeastRequestsPolicy {
    fn name(&self) -> &'static str {
        LEAST_REQUESTS
    }

    fn pick_destination(
        &self,
        _context: &RequestContext,
        _cluster: &ClusterState,
        available: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        // In case of tie, the first one is selected (stability)
        available
            .iter()
            .min_by_key(|d| d.concurrent_requests())
            .cloned()
    }
}
