//! Probe concurrency and shutdown of the health monitor.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use proxy_runtime::config::DestinationConfig;
use proxy_runtime::health::ActiveHealthCheckMonitor;
use proxy_runtime::model::{ClusterState, DestinationState, HealthStatus};

mod common;
use common::{probed_cluster, wait_until, ScriptedTransport};

fn clusters(count: usize, destinations_each: usize) -> Vec<Arc<ClusterState>> {
    (0..count)
        .map(|c| {
            let cluster = ClusterState::new(probed_cluster(&format!("c{}", c), 60_000));
            for d in 0..destinations_each {
                let config = DestinationConfig::new(format!("d{}", d), format!("http://10.{}.0.{}:80", c, d + 1));
                cluster.add_destination(Arc::new(DestinationState::new(config)));
            }
            cluster.update_dynamic_state();
            cluster
        })
        .collect()
}

#[tokio::test]
async fn test_stop_cancels_in_flight_probes_and_returns_permits() {
    let transport = ScriptedTransport::holding();
    let monitor = ActiveHealthCheckMonitor::new(transport.clone(), 100);
    let clusters = clusters(10, 5);

    monitor.update_tracked_clusters(&clusters).await;
    assert_eq!(monitor.active_prober_count().await, 10);

    let all_in_flight = wait_until(Duration::from_secs(5), || {
        transport.in_flight.load(Ordering::SeqCst) == 50
    })
    .await;
    assert!(all_in_flight);
    assert_eq!(monitor.available_probe_permits(), 50);

    monitor.stop().await;

    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(transport.canceled.load(Ordering::SeqCst), 50);
    assert_eq!(transport.sent.load(Ordering::SeqCst), 50);
    assert_eq!(monitor.available_probe_permits(), 100);
    assert_eq!(monitor.active_prober_count().await, 0);

    // Cancellation is not a health verdict.
    for cluster in &clusters {
        for destination in cluster.destinations() {
            assert_eq!(destination.health().active, HealthStatus::Unknown);
        }
    }
}

#[tokio::test]
async fn test_probes_never_exceed_the_shared_limit() {
    let transport = ScriptedTransport::holding();
    let monitor = ActiveHealthCheckMonitor::new(transport.clone(), 8);
    let clusters = clusters(4, 5);

    monitor.update_tracked_clusters(&clusters).await;
    assert!(wait_until(Duration::from_secs(5), || transport.in_flight.load(Ordering::SeqCst) == 8).await);

    // The other twelve stay queued on the semaphore.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 8);
    assert_eq!(transport.sent.load(Ordering::SeqCst), 8);
    assert_eq!(monitor.available_probe_permits(), 0);

    monitor.stop().await;
    assert_eq!(transport.canceled.load(Ordering::SeqCst), 8);
    assert_eq!(monitor.available_probe_permits(), 8);
}

#[tokio::test]
async fn test_nothing_starts_after_stop() {
    let transport = ScriptedTransport::new();
    let monitor = ActiveHealthCheckMonitor::new(transport.clone(), 10);
    let clusters = clusters(2, 1);

    monitor.stop().await;
    monitor.update_tracked_clusters(&clusters).await;

    assert_eq!(monitor.active_prober_count().await, 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.sent.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_removed_cluster_stops_its_prober_only() {
    let transport = ScriptedTransport::holding();
    let monitor = ActiveHealthCheckMonitor::new(transport.clone(), 100);
    let clusters = clusters(2, 2);

    monitor.update_tracked_clusters(&clusters).await;
    assert!(wait_until(Duration::from_secs(5), || transport.in_flight.load(Ordering::SeqCst) == 4).await);

    monitor.update_tracked_clusters(&clusters[1..]).await;
    assert_eq!(monitor.probed_clusters().await, vec!["c1"]);
    assert_eq!(transport.canceled.load(Ordering::SeqCst), 2);
    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 2);

    monitor.stop().await;
    assert_eq!(monitor.available_probe_permits(), 100);
}
