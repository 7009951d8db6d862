//! Destination runtime state.
//!
//! # Responsibilities
//! - Represent a single backend endpoint inside a cluster
//! - Publish its config and health as lock-free slots
//! - Track in-flight requests (read by LeastRequests / PowerOfTwoChoices)
//!
//! # Design Decisions
//! - Active health is written only by the prober, passive only by the
//!   passive observer; both live in one tuple updated by compare-and-swap
//! - Health writes that would not change the value are skipped, so an
//!   unchanged probe result never wakes change watchers

use std::ops::Deref;
use std::sync::Arc;

use serde::Serialize;

use crate::config::DestinationConfig;
use crate::model::{AtomicCounter, AtomicSlot};

/// Health of a destination as seen by one health source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Active and passive health of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DestinationHealthState {
    pub active: HealthStatus,
    pub passive: HealthStatus,
}

impl DestinationHealthState {
    pub fn new(active: HealthStatus, passive: HealthStatus) -> Self {
        Self { active, passive }
    }

    /// Effective active health given whether active checks are enabled.
    ///
    /// An `Unhealthy` verdict always wins; with checks disabled anything else
    /// counts as healthy.
    pub fn effective_active(&self, active_enabled: bool) -> HealthStatus {
        match self.active {
            HealthStatus::Unhealthy => HealthStatus::Unhealthy,
            _ if !active_enabled => HealthStatus::Healthy,
            status => status,
        }
    }

    /// Whether the destination may receive traffic.
    pub fn is_available(&self, active_enabled: bool, passive_enabled: bool) -> bool {
        self.effective_active(active_enabled) == HealthStatus::Healthy
            && !(passive_enabled && self.passive == HealthStatus::Unhealthy)
    }
}

/// A single backend endpoint.
#[derive(Debug)]
pub struct DestinationState {
    destination_id: String,
    config: AtomicSlot<DestinationConfig>,
    health: AtomicSlot<DestinationHealthState>,
    concurrency: AtomicCounter,
}

impl DestinationState {
    /// Create a destination with unknown health and no requests in flight.
    pub fn new(config: DestinationConfig) -> Self {
        Self {
            destination_id: config.id.clone(),
            config: AtomicSlot::new(config),
            health: AtomicSlot::default(),
            concurrency: AtomicCounter::new(),
        }
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    /// Current config.
    pub fn config(&self) -> Arc<DestinationConfig> {
        self.config.value()
    }

    pub fn config_slot(&self) -> &AtomicSlot<DestinationConfig> {
        &self.config
    }

    /// Current health.
    pub fn health(&self) -> DestinationHealthState {
        *self.health.value()
    }

    pub fn health_slot(&self) -> &AtomicSlot<DestinationHealthState> {
        &self.health
    }

    /// Record an active probe verdict. Returns true if the value changed.
    pub fn set_active_health(&self, status: HealthStatus) -> bool {
        self.health.update(|current| {
            (current.active != status).then_some(DestinationHealthState {
                active: status,
                ..*current
            })
        })
    }

    /// Record a passive verdict. Returns true if the value changed.
    pub fn set_passive_health(&self, status: HealthStatus) -> bool {
        self.health.update(|current| {
            (current.passive != status).then_some(DestinationHealthState {
                passive: status,
                ..*current
            })
        })
    }

    /// In-flight request counter.
    pub fn concurrency(&self) -> &AtomicCounter {
        &self.concurrency
    }

    /// Number of requests currently in flight.
    pub fn concurrent_requests(&self) -> i64 {
        self.concurrency.value()
    }

    /// Count a request as in flight until the returned guard drops.
    pub fn track_request(self: &Arc<Self>) -> RequestGuard {
        self.concurrency.increment();
        RequestGuard {
            destination: Arc::clone(self),
        }
    }
}

/// A RAII guard that keeps a request counted against its destination.
#[derive(Debug)]
pub struct RequestGuard {
    destination: Arc<DestinationState>,
}

impl Deref for RequestGuard {
    type Target = DestinationState;
    fn deref(&self) -> &Self::Target {
        &self.destination
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.destination.concurrency.decrement();
    }
}
