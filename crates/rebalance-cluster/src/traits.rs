use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use rebalance_core::NodeMetrics;

/// Trait for the cluster API the rebalancer reads and mutates
///
/// `ApiClient` talks to a real API server; `MockCluster` keeps an in-memory
/// cluster for tests. Every call is a single request with no retry.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    // --- Read ---

    /// List all nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// List pods scheduled to a node, in one namespace or cluster-wide
    async fn list_pods(&self, node_name: &str, namespace: Option<&str>) -> Result<Vec<Pod>>;

    /// List per-node usage from the metrics API
    ///
    /// Fails when metrics-server is not installed or unreachable.
    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>>;

    // --- Write ---

    /// Submit an eviction for a pod
    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()>;
}
