//! Per-cluster active prober.
//!
//! # Responsibilities
//! - Run one probe loop per destination of a cluster
//! - Follow destination membership changes without a restart
//! - Turn probe outcomes into `Active` health verdicts
//!
//! # Design Decisions
//! - Bound to the `ClusterConfig` it was started with; the monitor replaces
//!   the prober when the cluster's config is republished
//! - Every probe holds one permit of the shared semaphore for its whole
//!   duration; the permit is an owned guard, so it returns on every path
//! - Cancellation is never a health signal

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ClusterConfig;
use crate::health::transport::{ProbeOutcome, ProbeRequest, ProbeTransport};
use crate::model::{ClusterState, DestinationState};
use crate::observability::metrics;

/// What every prober shares.
#[derive(Debug, Clone)]
pub(crate) struct ProbeContext {
    pub transport: Arc<dyn ProbeTransport>,
    pub semaphore: Arc<Semaphore>,
}

/// A running prober for one cluster.
#[derive(Debug)]
pub(crate) struct ClusterProber {
    cluster_id: String,
    config: Arc<ClusterConfig>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ClusterProber {
    /// Start probing `cluster` with `config`. Stops when `parent` is cancelled.
    pub fn start(
        cluster: &Arc<ClusterState>,
        config: Arc<ClusterConfig>,
        context: ProbeContext,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let task = tokio::spawn(run(
            Arc::downgrade(cluster),
            Arc::clone(&config),
            context,
            cancel.clone(),
        ));
        tracing::debug!(
            cluster_id = %cluster.cluster_id(),
            interval_ms = config.health_check.active.interval_ms,
            "Prober started"
        );
        Self {
            cluster_id: cluster.cluster_id().to_string(),
            config,
            cancel,
            task,
        }
    }

    /// Config this prober was started with.
    pub fn config(&self) -> &Arc<ClusterConfig> {
        &self.config
    }

    /// Cancel and wait for every probe loop to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(cluster_id = %self.cluster_id, error = %e, "Prober task failed");
        }
        tracing::debug!(cluster_id = %self.cluster_id, "Prober stopped");
    }
}

struct DestinationLoop {
    destination: Arc<DestinationState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

async fn run(
    cluster: Weak<ClusterState>,
    config: Arc<ClusterConfig>,
    context: ProbeContext,
    cancel: CancellationToken,
) {
    let mut loops: HashMap<String, DestinationLoop> = HashMap::new();
    let mut retired = Vec::new();

    loop {
        let Some(current) = cluster.upgrade() else {
            break;
        };
        let cluster_id = current.cluster_id().to_string();
        let snapshot = current.dynamic_state_slot().snapshot();
        drop(current);

        sync_loops(
            &mut loops,
            &mut retired,
            &cluster_id,
            snapshot.value().all_destinations(),
            &config,
            &context,
            &cancel,
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = snapshot.changed() => {}
        }
    }

    cancel.cancel();
    let tasks = loops.into_values().map(|l| l.task).chain(retired);
    let results = join_all(tasks).await;
    for result in results {
        if let Err(e) = result {
            tracing::error!(cluster_id = %config.id, error = %e, "Probe loop failed");
        }
    }
}

/// Start loops for new members, stop loops for departed ones.
///
/// Stopped loops are moved to `retired` so their in-flight probes are still
/// awaited on shutdown.
fn sync_loops(
    loops: &mut HashMap<String, DestinationLoop>,
    retired: &mut Vec<JoinHandle<()>>,
    cluster_id: &str,
    members: &[Arc<DestinationState>],
    config: &Arc<ClusterConfig>,
    context: &ProbeContext,
    cancel: &CancellationToken,
) {
    retired.retain(|task| !task.is_finished());

    let departed: Vec<String> = loops
        .iter()
        .filter(|(_, l)| {
            l.task.is_finished() || !members.iter().any(|d| Arc::ptr_eq(d, &l.destination))
        })
        .map(|(id, _)| id.clone())
        .collect();
    for id in departed {
        if let Some(l) = loops.remove(&id) {
            l.cancel.cancel();
            retired.push(l.task);
        }
    }

    for destination in members {
        if loops.contains_key(destination.destination_id()) {
            continue;
        }
        let loop_cancel = cancel.child_token();
        let task = tokio::spawn(probe_destination(
            cluster_id.to_string(),
            Arc::clone(destination),
            Arc::clone(config),
            context.clone(),
            loop_cancel.clone(),
        ));
        loops.insert(
            destination.destination_id().to_string(),
            DestinationLoop {
                destination: Arc::clone(destination),
                cancel: loop_cancel,
                task,
            },
        );
    }
}

async fn probe_destination(
    cluster_id: String,
    destination: Arc<DestinationState>,
    config: Arc<ClusterConfig>,
    context: ProbeContext,
    cancel: CancellationToken,
) {
    let active = &config.health_check.active;
    let mut ticker = time::interval(active.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let request = ProbeRequest {
            destination_id: destination.destination_id().to_string(),
            address: destination.config().address.clone(),
            path: destination
                .config()
                .health_path
                .clone()
                .unwrap_or_else(|| active.path.clone()),
            timeout: active.timeout(),
        };

        let outcome = probe_once(&request, &context, &cancel).await;
        metrics::record_probe(&cluster_id, outcome.as_str());

        let Some(verdict) = outcome.health() else {
            break;
        };
        match outcome {
            ProbeOutcome::Success => tracing::debug!(
                cluster_id = %cluster_id,
                destination_id = %request.destination_id,
                "Health probe succeeded"
            ),
            _ => tracing::warn!(
                cluster_id = %cluster_id,
                destination_id = %request.destination_id,
                uri = %request.uri(),
                outcome = %outcome,
                "Health probe failed"
            ),
        }

        if destination.set_active_health(verdict) {
            tracing::info!(
                cluster_id = %cluster_id,
                destination_id = %request.destination_id,
                health = ?verdict,
                "Destination active health changed"
            );
        }
    }
}

/// Acquire a permit, then send. The permit is released when this returns.
async fn probe_once(
    request: &ProbeRequest,
    context: &ProbeContext,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return ProbeOutcome::Canceled,
        permit = Arc::clone(&context.semaphore).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return ProbeOutcome::Canceled,
        },
    };
    context.transport.send(request, cancel).await
}
