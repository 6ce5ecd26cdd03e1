use crate::error::Result;
use k8s_openapi::api::core::v1::Pod;
use rebalance_cluster::ClusterClient;
use rebalance_core::{LabelSelector, NamespaceScope, NodeLoad, PodCandidate};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gathers eviction candidates from ranked nodes
pub struct PodSelector {
    cluster: Arc<dyn ClusterClient>,
}

impl PodSelector {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Select up to `count` running pods matching `selector`, most loaded node first
    ///
    /// Nodes after the one that fills the quota are never listed. Fewer than
    /// `count` pods is not an error here. A node whose pods cannot be listed is
    /// skipped, unless no listing succeeded at all.
    pub async fn select(
        &self,
        nodes: &[NodeLoad],
        selector: &str,
        namespace: &NamespaceScope,
        count: usize,
    ) -> Result<Vec<PodCandidate>> {
        let selector = LabelSelector::parse(selector)?;
        let mut selected = Vec::with_capacity(count);
        let mut listed = 0usize;
        let mut last_error = None;

        for node in nodes {
            if selected.len() >= count {
                break;
            }

            let pods = match self
                .cluster
                .list_pods(&node.name, namespace.as_namespace())
                .await
            {
                Ok(pods) => {
                    listed += 1;
                    pods
                }
                Err(e) => {
                    warn!("Failed to list pods on node {}: {}", node.name, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let matched = filter_pods(&pods, &selector, count - selected.len());
            debug!(
                "Node {}: {} of {} pods selected",
                node.name,
                matched.len(),
                pods.len()
            );
            selected.extend(matched);
        }

        // Every listing failed: the API server is unreachable, not the nodes empty
        if listed == 0 {
            if let Some(e) = last_error {
                return Err(e.into());
            }
        }

        info!("Selected {} pod(s) matching '{}'", selected.len(), selector);
        Ok(selected)
    }
}

/// Running, non-terminating pods matching `selector`, in listing order, at most `max`
pub fn filter_pods(pods: &[Pod], selector: &LabelSelector, max: usize) -> Vec<PodCandidate> {
    pods.iter()
        .map(PodCandidate::from_pod)
        .filter(|p| p.is_running() && selector.matches(&p.labels))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebalance_cluster::mock::fixtures::*;
    use rebalance_cluster::MockCluster;
    use rebalance_core::MetricMode;

    fn load(name: &str, score: f64) -> NodeLoad {
        NodeLoad::from_usage(name, Some(score), Some(score), MetricMode::Both).unwrap()
    }

    fn keys(pods: &[PodCandidate]) -> Vec<String> {
        pods.iter().map(|p| p.key()).collect()
    }

    const PHP: &[(&str, &str)] = &[("name", "php")];

    fn ranked() -> Vec<NodeLoad> {
        vec![load("node-a", 90.0), load("node-b", 80.0), load("node-c", 70.0)]
    }

    fn cluster() -> MockCluster {
        MockCluster::new()
            .with_pod(running_pod("web", "a1", "node-a", PHP))
            .with_pod(running_pod("web", "a-other", "node-a", &[("name", "go")]))
            .with_pod(running_pod("web", "a2", "node-a", PHP))
            .with_pod(running_pod("shop", "a3", "node-a", PHP))
            .with_pod(running_pod("web", "b1", "node-b", PHP))
            .with_pod(running_pod("web", "b2", "node-b", PHP))
            .with_pod(running_pod("shop", "b3", "node-b", PHP))
            .with_pod(running_pod("web", "b4", "node-b", PHP))
            .with_pod(running_pod("web", "c1", "node-c", PHP))
    }

    #[tokio::test]
    async fn test_selection_stops_mid_node() {
        let cluster = Arc::new(cluster());
        let selector = PodSelector::new(cluster.clone());

        let pods = selector
            .select(&ranked(), "name=php", &NamespaceScope::All, 5)
            .await
            .unwrap();

        assert_eq!(
            keys(&pods),
            vec!["web/a1", "web/a2", "shop/a3", "web/b1", "web/b2"]
        );
        assert_eq!(cluster.pod_list_calls().await, vec!["node-a", "node-b"]);
    }

    #[tokio::test]
    async fn test_returns_fewer_when_not_enough_matches() {
        let selector = PodSelector::new(Arc::new(cluster()));

        let pods = selector
            .select(&ranked(), "name=php", &NamespaceScope::All, 50)
            .await
            .unwrap();
        assert_eq!(pods.len(), 8);
    }

    #[tokio::test]
    async fn test_namespace_scope() {
        let selector = PodSelector::new(Arc::new(cluster()));

        let pods = selector
            .select(
                &ranked(),
                "name=php",
                &NamespaceScope::Single("shop".to_string()),
                10,
            )
            .await
            .unwrap();
        assert_eq!(keys(&pods), vec!["shop/a3", "shop/b3"]);
    }

    #[tokio::test]
    async fn test_skips_non_running_and_terminating_pods() {
        let cluster = MockCluster::new()
            .with_pod(pod("web", "pending", "node-a", "Pending", PHP))
            .with_pod(pod("web", "done", "node-a", "Succeeded", PHP))
            .with_pod(terminating_pod("web", "leaving", "node-a", PHP))
            .with_pod(running_pod("web", "ok", "node-a", PHP));
        let selector = PodSelector::new(Arc::new(cluster));

        let pods = selector
            .select(&ranked(), "name=php", &NamespaceScope::All, 10)
            .await
            .unwrap();
        assert_eq!(keys(&pods), vec!["web/ok"]);
        assert!(pods.iter().all(|p| p.is_running()));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_fatal() {
        let cluster = Arc::new(cluster());
        let selector = PodSelector::new(cluster.clone());

        let err = selector
            .select(&ranked(), "name in (php", &NamespaceScope::All, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::RebalanceError::Core(_)));
        assert!(cluster.pod_list_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_skips_node() {
        let cluster = Arc::new(cluster().with_failing_node("node-a"));
        let selector = PodSelector::new(cluster.clone());

        let pods = selector
            .select(&ranked(), "name=php", &NamespaceScope::All, 5)
            .await
            .unwrap();
        assert_eq!(
            keys(&pods),
            vec!["web/b1", "web/b2", "shop/b3", "web/b4", "web/c1"]
        );
    }

    #[tokio::test]
    async fn test_all_listings_failing_is_fatal() {
        let cluster = Arc::new(
            cluster()
                .with_failing_node("node-a")
                .with_failing_node("node-b")
                .with_failing_node("node-c"),
        );
        let selector = PodSelector::new(cluster.clone());

        let err = selector
            .select(&ranked(), "name=php", &NamespaceScope::All, 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::RebalanceError::Cluster(rebalance_cluster::ClusterError::ApiStatus { status: 500, .. })
        ));
        assert_eq!(
            cluster.pod_list_calls().await,
            vec!["node-a", "node-b", "node-c"]
        );
    }

    #[tokio::test]
    async fn test_no_ranked_nodes_selects_nothing() {
        let selector = PodSelector::new(Arc::new(cluster()));
        let pods = selector
            .select(&[], "name=php", &NamespaceScope::All, 5)
            .await
            .unwrap();
        assert!(pods.is_empty());
    }

    #[test]
    fn test_filter_pods_respects_max() {
        let pods = vec![
            running_pod("web", "p1", "node-a", PHP),
            running_pod("web", "p2", "node-a", PHP),
            running_pod("web", "p3", "node-a", PHP),
        ];
        let selector = LabelSelector::parse("name=php").unwrap();

        assert_eq!(filter_pods(&pods, &selector, 2).len(), 2);
        assert!(filter_pods(&pods, &selector, 0).is_empty());
    }
}
