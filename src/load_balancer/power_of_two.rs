//! Power-of-two-choices load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancingPolicy, RandomSource, RequestContext, POWER_OF_TWO_CHOICES};
use crate::model::{ClusterState, DestinationState};

/// Draws two destinations at random (with replacement) and keeps the one
/// with fewer requests in flight. Ties go to the first draw.
#[derive(Debug)]
pub struct PowerOfTwoChoicesPolicy {
    random: Arc<dyn RandomSource>,
}

impl PowerOfTwoChoicesPolicy {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }
}

impl LoadBalancingPolicy for PowerOfTwoChoicesPolicy {
    fn name(&self) -> &'static str {
        POWER_OF_TWO_CHOICES
    }

    fn pick_destination(
        &self,
        _context: &RequestContext,
        _cluster: &ClusterState,
        available: &[Arc<DestinationState>],
    ) -> Option<Arc<DestinationState>> {
        if available.is_empty() {
            return None;
        }

        let first = &available[self.random.next_index(available.len())];
        let second = &available[self.random.next_index(available.len())];
        let picked = if first.concurrent_requests() <= second.concurrent_requests() {
            first
        } else {
            second
        };
        Some(picked.clone())
    }
}
