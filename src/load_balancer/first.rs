//! First-by-id load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancingPolicy, RequestContext, FIRST};
use crate::model::{ClusterState, DestinationState};

/// Always selects the destination with the smallest id (ordinal order).
#[derive(Debug, Default)]
pub struct FirstPolicy;

impl LoadBalancingPolicy for FirstPolicy {
    fn name(&self) -> &'static str {
        FIRST
    }

    fn pick_destination(
        &self,
        _context: &RequestContext,
        _cluster: &ClusterState,
        available: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        available
            .iter()
            .min_by(|a, b| a.destination_id().cmp(b.destination_id()))
            .cloned()
    }
}
