use crate::error::{ClusterError, Result};
use crate::traits::ClusterClient;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use rebalance_core::NodeMetrics;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory cluster state for MockCluster
#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<Node>,
    pods: Vec<Pod>,
    /// `None` simulates an unreachable metrics API
    metrics: Option<Vec<NodeMetrics>>,
    failing_nodes: HashSet<String>,
    eviction_failures: HashMap<String, (u16, String)>,
    pod_list_calls: Vec<String>,
    eviction_calls: Vec<String>,
}

/// Mock cluster for testing without an API server
///
/// Pods are listed in insertion order. Successful evictions remove the pod.
/// Failures can be injected per node (pod listing) and per pod (eviction).
/// Share it as `Arc<MockCluster>` to inspect recorded calls afterwards.
pub struct MockCluster {
    state: RwLock<MockState>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    /// Empty cluster whose metrics API is available
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MockState {
                metrics: Some(Vec::new()),
                ..Default::default()
            }),
        }
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut()
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.state_mut().nodes.push(node);
        self
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.state_mut().pods.push(pod);
        self
    }

    pub fn with_metrics(mut self, metrics: NodeMetrics) -> Self {
        self.state_mut()
            .metrics
            .get_or_insert_with(Vec::new)
            .push(metrics);
        self
    }

    /// Make the metrics API fail
    pub fn without_metrics(mut self) -> Self {
        self.state_mut().metrics = None;
        self
    }

    /// Make pod listing fail for one node
    pub fn with_failing_node(mut self, node_name: &str) -> Self {
        self.state_mut().failing_nodes.insert(node_name.to_string());
        self
    }

    /// Make the eviction of `namespace/name` fail with an API status
    pub fn with_eviction_failure(mut self, namespace: &str, name: &str, status: u16, message: &str) -> Self {
        self.state_mut()
            .eviction_failures
            .insert(format!("{}/{}", namespace, name), (status, message.to_string()));
        self
    }

    /// Nodes whose pods were listed, in call order
    pub async fn pod_list_calls(&self) -> Vec<String> {
        self.state.read().await.pod_list_calls.clone()
    }

    /// `namespace/name` of every eviction attempt, in call order
    pub async fn eviction_calls(&self) -> Vec<String> {
        self.state.read().await.eviction_calls.clone()
    }

    pub async fn pod_count(&self) -> usize {
        self.state.read().await.pods.len()
    }
}

fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.state.read().await.nodes.clone())
    }

    async fn list_pods(&self, node_name: &str, namespace: Option<&str>) -> Result<Vec<Pod>> {
        let mut state = self.state.write().await;
        state.pod_list_calls.push(node_name.to_string());

        if state.failing_nodes.contains(node_name) {
            return Err(ClusterError::api_status(
                format!("list pods on node {}", node_name),
                500,
                "etcdserver: request timed out",
            ));
        }

        let pods = state
            .pods
            .iter()
            .filter(|p| {
                p.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node_name)
            })
            .filter(|p| namespace.map_or(true, |ns| p.metadata.namespace.as_deref() == Some(ns)))
            .cloned()
            .collect();
        Ok(pods)
    }

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>> {
        self.state.read().await.metrics.clone().ok_or_else(|| {
            ClusterError::api_status(
                "list node metrics",
                503,
                "the server is currently unable to handle the request (get nodes.metrics.k8s.io)",
            )
        })
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let key = format!("{}/{}", namespace, name);
        let mut state = self.state.write().await;
        state.eviction_calls.push(key.clone());

        if let Some((status, message)) = state.eviction_failures.get(&key).cloned() {
            return Err(ClusterError::api_status(format!("evict pod {}", key), status, message));
        }

        let before = state.pods.len();
        state.pods.retain(|p| pod_key(p) != key);
        if state.pods.len() == before {
            return Err(ClusterError::api_status(
                format!("evict pod {}", key),
                404,
                format!("pods \"{}\" not found", name),
            ));
        }

        debug!("Mock: pod evicted: {}", key);
        Ok(())
    }
}

/// Builders for nodes, pods and metrics used across test suites
pub mod fixtures {
    use chrono::Utc;
    use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeStatus, Pod, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use rebalance_core::NodeMetrics;
    use std::collections::BTreeMap;

    fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    }

    /// Node with a `Ready` condition of the given status
    pub fn node(name: &str, ready: bool, cpu: &str, memory: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node.status = Some(NodeStatus {
            allocatable: Some(quantities(cpu, memory)),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        node
    }

    pub fn ready_node(name: &str, cpu: &str, memory: &str) -> Node {
        node(name, true, cpu, memory)
    }

    pub fn metrics(node_name: &str, cpu: &str, memory: &str) -> NodeMetrics {
        let mut metrics = NodeMetrics::default();
        metrics.metadata.name = Some(node_name.to_string());
        metrics.usage = quantities(cpu, memory);
        metrics
    }

    /// Pod in the given phase with `labels` given as `key=value` pairs
    pub fn pod(namespace: &str, name: &str, node_name: &str, phase: &str, labels: &[(&str, &str)]) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(namespace.to_string());
        pod.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        pod.spec = Some(PodSpec {
            node_name: Some(node_name.to_string()),
            ..Default::default()
        });
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        });
        pod
    }

    pub fn running_pod(namespace: &str, name: &str, node_name: &str, labels: &[(&str, &str)]) -> Pod {
        pod(namespace, name, node_name, "Running", labels)
    }

    /// Running pod with a deletion timestamp
    pub fn terminating_pod(namespace: &str, name: &str, node_name: &str, labels: &[(&str, &str)]) -> Pod {
        let mut pod = running_pod(namespace, name, node_name, labels);
        pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
        pod
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn cluster() -> MockCluster {
        MockCluster::new()
            .with_node(ready_node("node-a", "4", "8Gi"))
            .with_pod(running_pod("web", "php-1", "node-a", &[("name", "php")]))
            .with_pod(running_pod("api", "go-1", "node-a", &[("name", "go")]))
            .with_pod(running_pod("web", "php-2", "node-b", &[("name", "php")]))
    }

    #[tokio::test]
    async fn test_list_pods_by_node_and_namespace() {
        let cluster = cluster();

        let all = cluster.list_pods("node-a", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let web = cluster.list_pods("node-a", Some("web")).await.unwrap();
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].metadata.name.as_deref(), Some("php-1"));

        assert_eq!(cluster.pod_list_calls().await, vec!["node-a", "node-a"]);
    }

    #[tokio::test]
    async fn test_evict_pod_removes_pod() {
        let cluster = cluster();

        cluster.evict_pod("web", "php-1").await.unwrap();
        assert_eq!(cluster.pod_count().await, 2);

        let err = cluster.evict_pod("web", "php-1").await.unwrap_err();
        assert!(matches!(err, ClusterError::ApiStatus { status: 404, .. }));
        assert_eq!(cluster.eviction_calls().await, vec!["web/php-1", "web/php-1"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cluster = cluster()
            .with_failing_node("node-b")
            .with_eviction_failure("api", "go-1", 429, "Cannot evict pod")
            .without_metrics();

        assert!(cluster.list_pods("node-b", None).await.is_err());
        assert!(cluster.list_node_metrics().await.is_err());

        let err = cluster.evict_pod("api", "go-1").await.unwrap_err();
        assert_eq!(err.reason(), "disruption budget: Cannot evict pod");
        assert_eq!(cluster.pod_count().await, 3);
    }
}
