//! `ClusterClient` over a `kube::Client`
//!
//! Kubeconfig handling (context selection, `KUBECONFIG` merging, embedded
//! or file-based CA and client certificates, exec plugins, in-cluster
//! service accounts) is delegated to `kube::Config`.

use crate::error::{ClusterError, Result};
use crate::traits::ClusterClient;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ApiResource, DynamicObject, EvictParams, GroupVersionKind, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use rebalance_core::NodeMetrics;
use std::path::Path;
use tracing::debug;

/// Cluster access through an authenticated kube client
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Resolve credentials the way kubectl does: `KUBECONFIG`, then
    /// `~/.kube/config`, then the in-cluster service account
    pub async fn infer() -> Result<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| ClusterError::kubeconfig("<inferred>", e.to_string()))?;
        Self::from_config(config)
    }

    /// Use the current context of one kubeconfig file
    pub async fn from_kubeconfig(path: &Path) -> Result<Self> {
        let config = load_kubeconfig(path).await?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        debug!("Connecting to {}", config.cluster_url);
        let client = Client::try_from(config)
            .map_err(|e| ClusterError::request_failed("build kube client", e.to_string()))?;
        Ok(Self { client })
    }
}

/// Read a kubeconfig file into a client config for its current context
pub async fn load_kubeconfig(path: &Path) -> Result<Config> {
    let source = path.display().to_string();
    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| ClusterError::kubeconfig(source.as_str(), e.to_string()))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ClusterError::kubeconfig(source.as_str(), e.to_string()))
}

/// API status responses keep their code so eviction outcomes can tell a
/// disruption budget refusal from other failures
fn map_error(operation: &str, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(resp) => ClusterError::api_status(operation, resp.code, resp.message),
        other => ClusterError::request_failed(operation, other.to_string()),
    }
}

fn node_metrics_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "NodeMetrics");
    ApiResource::from_gvk_with_plural(&gvk, "nodes")
}

fn decode_node_metrics(object: DynamicObject) -> Result<NodeMetrics> {
    let mut metrics: NodeMetrics = serde_json::from_value(object.data)
        .map_err(|e| ClusterError::decode("list node metrics", e.to_string()))?;
    metrics.metadata = object.metadata;
    Ok(metrics)
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| map_error("list nodes", e))?;
        Ok(list.items)
    }

    async fn list_pods(&self, node_name: &str, namespace: Option<&str>) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let params = ListParams::default().fields(&format!("spec.nodeName={}", node_name));
        let list = pods
            .list(&params)
            .await
            .map_err(|e| map_error(&format!("list pods on node {}", node_name), e))?;
        Ok(list.items)
    }

    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>> {
        let metrics: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &node_metrics_resource());
        let list = metrics
            .list(&ListParams::default())
            .await
            .map_err(|e| map_error("list node metrics", e))?;
        list.items.into_iter().map(decode_node_metrics).collect()
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.evict(name, &EvictParams::default())
            .await
            .map_err(|e| map_error(&format!("evict pod {}/{}", namespace, name), e))?;
        Ok(())
    }
}
