//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Observe request outcomes
//! - Track consecutive failures
//! - Trigger state transition on threshold breach
//! - Put the destination back into rotation after the reactivation period
//!
//! # Design Decisions
//! - Only connection errors, timeouts and 502/503/504 count as failures
//! - 4xx are NOT failures (client error, not backend)
//! - Reactivation sets `Passive` back to `Unknown`, not `Healthy`; the next
//!   successful request promotes it
//! - Thread-safe counters for concurrent request tracking

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::model::{ClusterState, DestinationState, HealthStatus};

/// What the forwarder saw for one proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Failure,
}

impl RequestOutcome {
    /// Classify a response status from the destination.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                RequestOutcome::Failure
            }
            _ => RequestOutcome::Success,
        }
    }

    /// A request that never produced a response (connect error, reset, timeout).
    pub fn transport_error() -> Self {
        RequestOutcome::Failure
    }
}

/// Turns observed request outcomes into `Passive` health verdicts.
#[derive(Debug)]
pub struct PassiveHealthObserver {
    /// Consecutive failures keyed by `cluster/destination`.
    failures: DashMap<String, u32>,
    reactivations: Mutex<JoinSet<()>>,
    shutdown: CancellationToken,
}

impl PassiveHealthObserver {
    pub fn new() -> Self {
        Self {
            failures: DashMap::new(),
            reactivations: Mutex::new(JoinSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Record the outcome of one request to `destination`.
    ///
    /// Ignored unless the cluster has passive checks enabled. Must be called
    /// from within a Tokio runtime.
    pub fn report(
        &self,
        cluster: &ClusterState,
        destination: &Arc<DestinationState>,
        outcome: RequestOutcome,
    ) {
        let config = cluster.config();
        let passive = &config.health_check.passive;
        if !passive.enabled {
            return;
        }

        let key = format!("{}/{}", cluster.cluster_id(), destination.destination_id());
        match outcome {
            RequestOutcome::Success => {
                self.failures.remove(&key);
                if destination.health().passive == HealthStatus::Unknown {
                    destination.set_passive_health(HealthStatus::Healthy);
                }
            }
            RequestOutcome::Failure => {
                let count = {
                    let mut entry = self.failures.entry(key.clone()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                if count < passive.consecutive_failures {
                    return;
                }
                self.failures.remove(&key);

                if destination.set_passive_health(HealthStatus::Unhealthy) {
                    tracing::warn!(
                        cluster_id = %cluster.cluster_id(),
                        destination_id = %destination.destination_id(),
                        failures = count,
                        reactivation_ms = passive.reactivation_period_ms,
                        "Destination marked unhealthy by passive checks"
                    );
                    self.schedule_reactivation(
                        cluster.cluster_id().to_string(),
                        Arc::clone(destination),
                        passive.reactivation_period(),
                    );
                }
            }
        }
    }

    fn schedule_reactivation(
        &self,
        cluster_id: String,
        destination: Arc<DestinationState>,
        period: std::time::Duration,
    ) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let shutdown = self.shutdown.clone();
        let mut tasks = self.reactivations.lock().expect("reactivation mutex poisoned");
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(period) => {
                    let reactivated = destination.health_slot().update(|current| {
                        (current.passive == HealthStatus::Unhealthy).then_some(
                            crate::model::DestinationHealthState {
                                passive: HealthStatus::Unknown,
                                ..*current
                            },
                        )
                    });
                    if reactivated {
                        tracing::info!(
                            cluster_id = %cluster_id,
                            destination_id = %destination.destination_id(),
                            "Destination reactivated after passive failure"
                        );
                    }
                }
            }
        });
    }

    /// Drop failure counts kept for a removed cluster.
    pub fn forget_cluster(&self, cluster_id: &str) {
        let prefix = format!("{}/", cluster_id);
        self.failures.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Destinations with at least one uncleared failure.
    pub fn tracked_failures(&self) -> usize {
        self.failures.len()
    }

    /// Number of reactivations still waiting.
    pub fn pending_reactivations(&self) -> usize {
        let mut tasks = self.reactivations.lock().expect("reactivation mutex poisoned");
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Cancel pending reactivations and wait for them to finish.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let mut tasks = {
            let mut guard = self.reactivations.lock().expect("reactivation mutex poisoned");
            std::mem::take(&mut *guard)
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Reactivation task failed");
            }
        }
    }
}

impl Default for PassiveHealthObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, DestinationConfig};
    use std::time::Duration;

    fn cluster(passive: bool) -> (Arc<ClusterState>, Arc<DestinationState>) {
        let mut config = ClusterConfig::new("c1");
        config.health_check.passive.enabled = passive;
        config.health_check.passive.consecutive_failures = 2;
        config.health_check.passive.reactivation_period_ms = 5_000;
        let cluster = ClusterState::new(config);
        let destination = Arc::new(DestinationState::new(DestinationConfig::new(
            "d1",
            "http://127.0.0.1:9001",
        )));
        cluster.add_destination(destination.clone());
        cluster.update_dynamic_state();
        (cluster, destination)
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(RequestOutcome::from_status(StatusCode::OK), RequestOutcome::Success);
        assert_eq!(RequestOutcome::from_status(StatusCode::NOT_FOUND), RequestOutcome::Success);
        assert_eq!(
            RequestOutcome::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            RequestOutcome::Success
        );
        assert_eq!(RequestOutcome::from_status(StatusCode::BAD_GATEWAY), RequestOutcome::Failure);
        assert_eq!(
            RequestOutcome::from_status(StatusCode::GATEWAY_TIMEOUT),
            RequestOutcome::Failure
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_eject_then_reactivate() {
        let observer = PassiveHealthObserver::new();
        let (cluster, d1) = cluster(true);

        observer.report(&cluster, &d1, RequestOutcome::Failure);
        assert_eq!(cluster.dynamic_state().available_destinations().len(), 1);

        observer.report(&cluster, &d1, RequestOutcome::Failure);
        assert_eq!(d1.health().passive, HealthStatus::Unhealthy);
        assert!(cluster.dynamic_state().available_destinations().is_empty());
        assert_eq!(observer.pending_reactivations(), 1);

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert_eq!(d1.health().passive, HealthStatus::Unknown);
        assert_eq!(cluster.dynamic_state().available_destinations().len(), 1);

        observer.report(&cluster, &d1, RequestOutcome::Success);
        assert_eq!(d1.health().passive, HealthStatus::Healthy);
        observer.stop().await;
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let observer = PassiveHealthObserver::new();
        let (cluster, d1) = cluster(true);

        observer.report(&cluster, &d1, RequestOutcome::Failure);
        observer.report(&cluster, &d1, RequestOutcome::Success);
        observer.report(&cluster, &d1, RequestOutcome::Failure);
        assert_eq!(d1.health().passive, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_disabled_passive_ignores_reports() {
        let observer = PassiveHealthObserver::new();
        let (cluster, d1) = cluster(false);
        for _ in 0..5 {
            observer.report(&cluster, &d1, RequestOutcome::Failure);
        }
        assert_eq!(d1.health().passive, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_forget_cluster_drops_its_failure_counts() {
        let observer = PassiveHealthObserver::new();
        let (cluster, d1) = cluster(true);
        observer.report(&cluster, &d1, RequestOutcome::Failure);
        assert_eq!(observer.tracked_failures(), 1);

        // Prefix match is on the whole cluster id.
        observer.forget_cluster("c");
        assert_eq!(observer.tracked_failures(), 1);

        observer.forget_cluster("c1");
        assert_eq!(observer.tracked_failures(), 0);
    }
}
