//! Active and passive health checks against real sockets.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proxy_runtime::config::ClusterConfig;
use proxy_runtime::health::{HttpProbeTransport, RequestOutcome};
use proxy_runtime::model::{ClusterState, HealthStatus};
use proxy_runtime::reconcile::CollectingErrorReporter;
use proxy_runtime::routing::RequestContext;

mod common;
use common::{probed_cluster, reconciler, start_mock_backend, start_programmable_backend, wait_until};

fn available(cluster: &ClusterState) -> Vec<String> {
    cluster
        .dynamic_state()
        .available_destinations()
        .iter()
        .map(|d| d.destination_id().to_string())
        .collect()
}

#[tokio::test]
async fn test_failing_destination_is_excluded() {
    let healthy = start_mock_backend(200).await;
    let failing = start_mock_backend(503).await;

    let reconciler = reconciler(Arc::new(HttpProbeTransport::new().unwrap()), 10);
    let snapshot = common::SnapshotBuilder::new()
        .cluster(probed_cluster("api", 50))
        .destination("api", "good", &format!("http://{}", healthy))
        .destination("api", "bad", &format!("http://{}", failing))
        .route("r1", "api")
        .build();
    assert!(reconciler.apply(&snapshot, &CollectingErrorReporter::new()).await);

    let cluster = reconciler.cluster("api").unwrap();
    let good = cluster.destination("good").unwrap();
    let bad = cluster.destination("bad").unwrap();

    let settled = wait_until(Duration::from_secs(5), || {
        good.health().active == HealthStatus::Healthy && bad.health().active == HealthStatus::Unhealthy
    })
    .await;
    assert!(settled);
    assert_eq!(available(&cluster), vec!["good"]);

    // Further failures keep it out.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bad.health().active, HealthStatus::Unhealthy);

    let ctx = RequestContext::new("GET", None, "/");
    for _ in 0..20 {
        let picked = reconciler.load_balancer().pick_destination(&ctx, &cluster).unwrap();
        assert_eq!(picked.destination_id(), "good");
    }

    reconciler.shutdown().await;
}

#[tokio::test]
async fn test_destination_recovers_when_backend_does() {
    let status = Arc::new(AtomicU16::new(503));
    let backend = {
        let status = status.clone();
        start_programmable_backend(move || {
            let status = status.clone();
            async move { status.load(Ordering::SeqCst) }
        })
        .await
    };

    let reconciler = reconciler(Arc::new(HttpProbeTransport::new().unwrap()), 10);
    let snapshot = common::SnapshotBuilder::new()
        .cluster(probed_cluster("api", 50))
        .destination("api", "d1", &format!("http://{}", backend))
        .build();
    reconciler.apply(&snapshot, &CollectingErrorReporter::new()).await;

    let cluster = reconciler.cluster("api").unwrap();
    let d1 = cluster.destination("d1").unwrap();
    assert!(wait_until(Duration::from_secs(5), || d1.health().active == HealthStatus::Unhealthy).await);
    assert!(available(&cluster).is_empty());

    status.store(200, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(5), || available(&cluster) == vec!["d1"]).await);
    assert_eq!(d1.health().active, HealthStatus::Healthy);

    reconciler.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_destination_is_unhealthy() {
    // Bind then drop to get a port nothing listens on.
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let reconciler = reconciler(Arc::new(HttpProbeTransport::new().unwrap()), 10);
    let snapshot = common::SnapshotBuilder::new()
        .cluster(probed_cluster("api", 50))
        .destination("api", "gone", &format!("http://{}", closed))
        .build();
    reconciler.apply(&snapshot, &CollectingErrorReporter::new()).await;

    let gone = reconciler.cluster("api").unwrap().destination("gone").unwrap();
    assert!(wait_until(Duration::from_secs(5), || gone.health().active == HealthStatus::Unhealthy).await);

    reconciler.shutdown().await;
}

#[tokio::test]
async fn test_passive_failures_exclude_until_reactivation() {
    let reconciler = reconciler(Arc::new(HttpProbeTransport::new().unwrap()), 10);
    let mut config = ClusterConfig::new("api");
    config.health_check.passive.enabled = true;
    config.health_check.passive.consecutive_failures = 3;
    config.health_check.passive.reactivation_period_ms = 100;
    let snapshot = common::SnapshotBuilder::new()
        .cluster(config)
        .destination("api", "d1", "http://10.0.0.1:80")
        .destination("api", "d2", "http://10.0.0.2:80")
        .build();
    reconciler.apply(&snapshot, &CollectingErrorReporter::new()).await;

    let cluster = reconciler.cluster("api").unwrap();
    let d1 = cluster.destination("d1").unwrap();
    let observer = reconciler.passive_health();

    observer.report(&cluster, &d1, RequestOutcome::Failure);
    observer.report(&cluster, &d1, RequestOutcome::Failure);
    assert_eq!(available(&cluster), vec!["d1", "d2"]);

    observer.report(&cluster, &d1, RequestOutcome::Failure);
    assert_eq!(d1.health().passive, HealthStatus::Unhealthy);
    assert_eq!(available(&cluster), vec!["d2"]);
    assert_eq!(observer.pending_reactivations(), 1);

    assert!(wait_until(Duration::from_secs(5), || available(&cluster) == vec!["d1", "d2"]).await);
    assert_eq!(d1.health().passive, HealthStatus::Unknown);

    reconciler.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_pending_reactivations() {
    let reconciler = reconciler(Arc::new(HttpProbeTransport::new().unwrap()), 10);
    let mut config = ClusterConfig::new("api");
    config.health_check.passive.enabled = true;
    config.health_check.passive.consecutive_failures = 1;
    config.health_check.passive.reactivation_period_ms = 60_000;
    let snapshot = common::SnapshotBuilder::new()
        .cluster(config)
        .destination("api", "d1", "http://10.0.0.1:80")
        .destination("api", "d2", "http://10.0.0.2:80")
        .build();
    reconciler.apply(&snapshot, &CollectingErrorReporter::new()).await;

    let cluster = reconciler.cluster("api").unwrap();
    let d1 = cluster.destination("d1").unwrap();
    let d2 = cluster.destination("d2").unwrap();
    let observer = reconciler.passive_health();
    observer.report(&cluster, &d1, RequestOutcome::Failure);
    assert_eq!(observer.pending_reactivations(), 1);

    reconciler.shutdown().await;
    assert_eq!(observer.pending_reactivations(), 0);
    assert_eq!(d1.health().passive, HealthStatus::Unhealthy);

    // Nothing new is scheduled once stopped.
    observer.report(&cluster, &d2, RequestOutcome::Failure);
    assert_eq!(observer.pending_reactivations(), 0);
}

#[tokio::test]
async fn test_silent_destination_times_out_unhealthy() {
    // Accepts connections and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let reconciler = reconciler(Arc::new(HttpProbeTransport::new().unwrap()), 10);
    let mut config = probed_cluster("api", 50);
    config.health_check.active.timeout_ms = 100;
    let snapshot = common::SnapshotBuilder::new()
        .cluster(config)
        .destination("api", "slow", &format!("http://{}", silent))
        .build();
    reconciler.apply(&snapshot, &CollectingErrorReporter::new()).await;

    let cluster = reconciler.cluster("api").unwrap();
    let slow = cluster.destination("slow").unwrap();
    assert!(wait_until(Duration::from_secs(5), || slow.health().active == HealthStatus::Unhealthy).await);
    assert!(available(&cluster).is_empty());

    reconciler.shutdown().await;
}
