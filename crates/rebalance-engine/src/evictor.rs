use crate::types::EvictionReport;
use rebalance_cluster::ClusterClient;
use rebalance_core::{format_duration, EvictionOutcome, PodCandidate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Evicts pods one at a time with a pause between attempts
pub struct Evictor {
    cluster: Arc<dyn ClusterClient>,
}

impl Evictor {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Evict `pods` in order, waiting `interval` between consecutive attempts
    ///
    /// Each pod gets exactly one eviction request. Failures are recorded and
    /// the batch continues. Cancellation is honoured before each attempt and
    /// during waits; pods already evicted stay evicted.
    pub async fn evict(
        &self,
        pods: &[PodCandidate],
        interval: Duration,
        token: &CancellationToken,
    ) -> EvictionReport {
        let mut report = EvictionReport::default();
        let total = pods.len();

        for (i, pod) in pods.iter().enumerate() {
            if i > 0 {
                report.pacing_steps += 1;
                if !pace(interval, token).await {
                    warn!("Eviction cancelled while waiting; {} pod(s) not attempted", total - i);
                    report.cancelled = true;
                    report.skipped = total - i;
                    break;
                }
            }

            if token.is_cancelled() {
                warn!("Eviction cancelled; {} pod(s) not attempted", total - i);
                report.cancelled = true;
                report.skipped = total - i;
                break;
            }

            info!("Evicting pod {}/{}: {}", i + 1, total, pod.key());

            let outcome = match self.cluster.evict_pod(&pod.namespace, &pod.name).await {
                Ok(()) => {
                    info!("Successfully evicted pod {}", pod.key());
                    EvictionOutcome::succeeded(pod)
                }
                Err(e) => {
                    warn!("Failed to evict pod {}: {}", pod.key(), e);
                    EvictionOutcome::failed(pod, e.reason())
                }
            };
            report.record(outcome);

            if i + 1 < total && !interval.is_zero() {
                info!("Waiting {} before next eviction", format_duration(interval));
            }
        }

        info!(
            "Eviction finished: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        report
    }
}

/// Wait one pacing interval; returns false if cancelled first
///
/// A zero interval is a no-op step that still observes cancellation.
async fn pace(interval: Duration, token: &CancellationToken) -> bool {
    if interval.is_zero() {
        return !token.is_cancelled();
    }

    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(interval) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebalance_cluster::mock::fixtures::*;
    use rebalance_cluster::MockCluster;
    use rebalance_core::EvictionResult;
    use tokio::time::Instant;

    fn candidates(names: &[&str]) -> Vec<PodCandidate> {
        names
            .iter()
            .map(|n| PodCandidate::from_pod(&running_pod("web", n, "node-a", &[])))
            .collect()
    }

    fn cluster(names: &[&str]) -> MockCluster {
        names.iter().fold(MockCluster::new(), |c, n| {
            c.with_pod(running_pod("web", n, "node-a", &[]))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_issues_every_call_without_delay() {
        let cluster = Arc::new(cluster(&["p1", "p2", "p3"]));
        let evictor = Evictor::new(cluster.clone());

        let start = Instant::now();
        let report = evictor
            .evict(&candidates(&["p1", "p2", "p3"]), Duration::ZERO, &CancellationToken::new())
            .await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(cluster.eviction_calls().await, vec!["web/p1", "web/p2", "web/p3"]);
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.pacing_steps, 2);
        assert_eq!(report.succeeded, 3);
        assert_eq!(cluster.pod_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_attempts_only() {
        let evictor = Evictor::new(Arc::new(cluster(&["p1", "p2", "p3"])));

        let start = Instant::now();
        let report = evictor
            .evict(
                &candidates(&["p1", "p2", "p3"]),
                Duration::from_secs(10),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(start.elapsed(), Duration::from_secs(20));
        assert_eq!(report.pacing_steps, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_does_not_abort_batch() {
        let cluster = Arc::new(
            cluster(&["p1", "p2", "p3"]).with_eviction_failure(
                "web",
                "p2",
                429,
                "Cannot evict pod as it would violate the pod's disruption budget.",
            ),
        );
        let evictor = Evictor::new(cluster.clone());

        let start = Instant::now();
        let report = evictor
            .evict(
                &candidates(&["p1", "p2", "p3"]),
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(cluster.eviction_calls().await, vec!["web/p1", "web/p2", "web/p3"]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.cancelled);
        assert_eq!(
            report.outcomes[1].result,
            EvictionResult::Failed {
                reason: "disruption budget: Cannot evict pod as it would violate the pod's disruption budget."
                    .to_string()
            }
        );
        // The wait after a failure is still taken
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_stops_batch() {
        let cluster = Arc::new(cluster(&["p1", "p2", "p3"]));
        let evictor = Evictor::new(cluster.clone());
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(15)).await;
            canceller.cancel();
        });

        let report = evictor
            .evict(&candidates(&["p1", "p2", "p3"]), Duration::from_secs(10), &token)
            .await;

        assert!(report.cancelled);
        assert_eq!(cluster.eviction_calls().await, vec!["web/p1", "web/p2"]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.skipped, 1);
        // Evicted pods stay evicted
        assert_eq!(cluster.pod_count().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_attempts_nothing() {
        let cluster = Arc::new(cluster(&["p1", "p2"]));
        let evictor = Evictor::new(cluster.clone());
        let token = CancellationToken::new();
        token.cancel();

        let report = evictor
            .evict(&candidates(&["p1", "p2"]), Duration::ZERO, &token)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.skipped, 2);
        assert!(cluster.eviction_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let evictor = Evictor::new(Arc::new(MockCluster::new()));
        let report = evictor
            .evict(&[], Duration::from_secs(10), &CancellationToken::new())
            .await;
        assert_eq!(report.attempted(), 0);
        assert_eq!(report.pacing_steps, 0);
    }
}
