//! Random load balancing strategy and the randomness it draws from.

use std::fmt;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::load_balancer::{LoadBalancingPolicy, RequestContext, RANDOM};
use crate::model::{ClusterState, DestinationState};

/// Source of uniform indices, injectable so tests can be deterministic.
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Uniform index in `0..upper`. Callers never pass zero.
    fn next_index(&self, upper: usize) -> usize;
}

/// Thread-local fast generator. The production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_index(&self, upper: usize) -> usize {
        fastrand::usize(..upper)
    }
}

/// Reproducible generator for tests and benchmarks.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_index(&self, upper: usize) -> usize {
        self.rng
            .lock()
            .expect("random source mutex poisoned")
            .gen_range(0..upper)
    }
}

/// Uniformly random selector.
#[derive(Debug)]
pub struct RandomPolicy {
    random: Arc<dyn RandomSource>,
}

impl RandomPolicy {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }
}

impl LoadBalancingPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        RANDOM
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
        Some(available[self.random.next_index(available.len())].clone())
    }
}
