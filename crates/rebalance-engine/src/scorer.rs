use crate::error::Result;
use crate::types::{NodeScoring, UsageSnapshot};
use k8s_openapi::api::core::v1::Node;
use rebalance_cluster::ClusterClient;
use rebalance_core::{MetricMode, NodeLoad, NodeUsage, PodCandidate, ResourceQuantities};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ranks ready nodes by load
pub struct NodeScorer {
    cluster: Arc<dyn ClusterClient>,
}

impl NodeScorer {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Score all nodes and return the `cap` most loaded
    ///
    /// Listing nodes is fatal on failure. An unreachable metrics API is not:
    /// scoring falls back to pod counts with a warning.
    pub async fn score(&self, mode: MetricMode, cap: usize, threshold: f64) -> Result<NodeScoring> {
        let nodes = self.cluster.list_nodes().await?;
        debug!("Listed {} nodes", nodes.len());

        let usage = if mode.uses_usage() {
            Some(self.fetch_usage().await)
        } else {
            None
        };

        Ok(self.rank(&nodes, usage.as_ref(), mode, cap, threshold).await)
    }

    /// Fetch the usage snapshot, mapping any failure to `Unavailable`
    pub async fn fetch_usage(&self) -> UsageSnapshot {
        match self.cluster.list_node_metrics().await {
            Ok(metrics) => UsageSnapshot::from_metrics(metrics),
            Err(e) => UsageSnapshot::Unavailable(e.to_string()),
        }
    }

    /// Score `nodes` under `mode`, falling back to pod counts when usage is unavailable
    pub async fn rank(
        &self,
        nodes: &[Node],
        usage: Option<&UsageSnapshot>,
        mode: MetricMode,
        cap: usize,
        threshold: f64,
    ) -> NodeScoring {
        let mut warnings = Vec::new();

        let usage_map = match (mode.uses_usage(), usage) {
            (false, _) => None,
            (true, Some(UsageSnapshot::Available(map))) => Some(map),
            (true, Some(UsageSnapshot::Unavailable(reason))) => {
                let message = format!(
                    "metrics-server not available ({}), falling back to pod-count mode",
                    reason
                );
                warn!("{}", message);
                warnings.push(message);
                None
            }
            (true, None) => {
                let message = "no usage snapshot supplied, falling back to pod-count mode".to_string();
                warn!("{}", message);
                warnings.push(message);
                None
            }
        };

        let ready: Vec<&Node> = nodes.iter().filter(|n| is_node_ready(n)).collect();
        debug!("{} of {} nodes are ready", ready.len(), nodes.len());

        let (metric, mut loads) = match usage_map {
            Some(map) => {
                let loads = ready
                    .iter()
                    .filter_map(|node| score_by_usage(node, map, mode, &mut warnings))
                    .filter(|load| load.score >= threshold)
                    .collect();
                (mode, loads)
            }
            None => (MetricMode::PodCount, self.score_by_pod_count(&ready).await),
        };

        // Vec::sort_by is stable, so equal scores keep listing order
        loads.sort_by(|a, b| b.score.total_cmp(&a.score));
        loads.truncate(cap);

        info!(
            "Ranked {} node(s) by {} (cap {}, threshold {:.1})",
            loads.len(),
            metric,
            cap,
            threshold
        );

        NodeScoring {
            nodes: loads,
            requested_metric: mode,
            metric,
            warnings,
        }
    }

    /// One pod listing per node; nodes whose pods cannot be listed are skipped
    async fn score_by_pod_count(&self, nodes: &[&Node]) -> Vec<NodeLoad> {
        let mut loads = Vec::with_capacity(nodes.len());

        for node in nodes {
            let name = node_name(node);
            let pods = match self.cluster.list_pods(name, None).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!("Failed to count pods on node {}: {}", name, e);
                    continue;
                }
            };

            let running = pods
                .iter()
                .filter(|p| PodCandidate::from_pod(p).is_running())
                .count();
            debug!("Node {} runs {} pods", name, running);

            loads.push(NodeLoad::from_pod_count(name, running));
        }

        loads
    }
}

/// A node is ready when its `Ready` condition has status `True`
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True")
}

fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("unknown")
}

fn percent(used: i64, capacity: i64) -> Option<f64> {
    (capacity > 0).then(|| used as f64 / capacity as f64 * 100.0)
}

fn score_by_usage(
    node: &Node,
    usage: &std::collections::HashMap<String, NodeUsage>,
    mode: MetricMode,
    warnings: &mut Vec<String>,
) -> Option<NodeLoad> {
    let name = node_name(node);

    let Some(used) = usage.get(name) else {
        debug!("Node {} has no metrics, skipping", name);
        return None;
    };

    let allocatable = node
        .status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref())
        .map(ResourceQuantities::from_k8s_resource_map)
        .unwrap_or_default();

    let cpu = percent(used.cpu_millicores, allocatable.cpu_millicores);
    let memory = percent(used.memory_bytes, allocatable.memory_bytes);

    let load = NodeLoad::from_usage(name, cpu, memory, mode);
    match &load {
        Some(load) => debug!(
            "Node {} score: {:.1} (CPU: {:?}, Memory: {:?})",
            name, load.score, cpu, memory
        ),
        None => {
            let message = format!("node {} reports no allocatable capacity for {}, skipping", name, mode);
            warn!("{}", message);
            warnings.push(message);
        }
    }
    load
}
