use crate::error::{ClusterError, Result};
use crate::traits::ClusterClient;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::Eviction;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rebalance_core::{NodeMetrics, NodeMetricsList};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Default listen address of `kubectl proxy`
pub const PROXY_URL: &str = "http://127.0.0.1:8001";

/// Lightweight HTTP client for an explicit API server URL or `kubectl proxy`
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

/// Generic `*List` envelope; only the items are needed
#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// `meta/v1` Status body returned on API errors
#[derive(Debug, Deserialize)]
struct ApiStatusBody {
    #[serde(default)]
    message: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client: Client::new(),
        }
    }

    /// Authenticate every request with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET a path and decode the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let resp = self
            .authorize(self.client.get(&url).query(query))
            .send()
            .await
            .map_err(|e| ClusterError::request_failed(operation, e.to_string()))?;

        let resp = check_status(operation, resp).await?;

        resp.json::<T>()
            .await
            .map_err(|e| ClusterError::decode(operation, e.to_string()))
    }
}

/// Turn a non-success response into `ClusterError::ApiStatus`
async fn check_status(operation: &str, resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(ClusterError::api_status(
        operation,
        status.as_u16(),
        status_message(&body),
    ))
}

/// Prefer the `message` of a Status body over the raw text
fn status_message(body: &str) -> String {
    serde_json::from_str::<ApiStatusBody>(body)
        .ok()
        .and_then(|s| s.message)
        .unwrap_or_else(|| body.trim().to_string())
}

fn pods_path(namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("/api/v1/namespaces/{}/pods", ns),
        None => "/api/v1/pods".to_string(),
    }
}

#[async_trait]
impl ClusterClient for ApiClient {
    /// GET /api/v1/nodes
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let list: ObjectList<Node> = self.get_json("list nodes", "/api/v1/nodes", &[]).await?;
        Ok(list.items)
    }

    /// GET /api/v1[/namespaces/{namespace}]/pods?fieldSelector=spec.nodeName={node}
    async fn list_pods(&self, node_name: &str, namespace: Option<&str>) -> Result<Vec<Pod>> {
        let field_selector = format!("spec.nodeName={}", node_name);
        let operation = format!("list pods on node {}", node_name);
        let list: ObjectList<Pod> = self
            .get_json(
                &operation,
                &pods_path(namespace),
                &[("fieldSelector", field_selector.as_str())],
            )
            .await?;
        Ok(list.items)
    }

    /// GET /apis/metrics.k8s.io/v1beta1/nodes
    async fn list_node_metrics(&self) -> Result<Vec<NodeMetrics>> {
        let list: NodeMetricsList = self
            .get_json("list node metrics", "/apis/metrics.k8s.io/v1beta1/nodes", &[])
            .await?;
        Ok(list.items)
    }

    /// POST /api/v1/namespaces/{namespace}/pods/{name}/eviction
    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let operation = format!("evict pod {}/{}", namespace, name);
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}/eviction",
            self.base_url, namespace, name
        );
        debug!("POST {}", url);

        let eviction = Eviction {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            delete_options: None,
        };

        let resp = self
            .authorize(self.client.post(&url).json(&eviction))
            .send()
            .await
            .map_err(|e| ClusterError::request_failed(&operation, e.to_string()))?;

        check_status(&operation, resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let client = ApiClient::new("http://127.0.0.1:8001/");
        assert_eq!(client.base_url(), "http://127.0.0.1:8001");
    }

    #[test]
    fn test_pods_path() {
        assert_eq!(pods_path(None), "/api/v1/pods");
        assert_eq!(pods_path(Some("web")), "/api/v1/namespaces/web/pods");
    }

    #[test]
    fn test_status_message() {
        let body = r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"Cannot evict pod as it would violate the pod's disruption budget.","reason":"TooManyRequests","code":429}"#;
        assert_eq!(
            status_message(body),
            "Cannot evict pod as it would violate the pod's disruption budget."
        );
        assert_eq!(status_message("  upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_node_list_decodes() {
        let body = r#"{"kind":"NodeList","apiVersion":"v1","metadata":{},"items":[{"metadata":{"name":"node-a"}}]}"#;
        let list: ObjectList<Node> = serde_json::from_str(body).unwrap();
        assert_eq!(list.items[0].metadata.name.as_deref(), Some("node-a"));

        let empty: ObjectList<Pod> = serde_json::from_str(r#"{"kind":"PodList"}"#).unwrap();
        assert!(empty.items.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_request_failure() {
        let client = ApiClient::new("http://127.0.0.1:1");
        let err = client.list_nodes().await.unwrap_err();
        assert!(matches!(err, ClusterError::RequestFailed { .. }));
    }

    #[test]
    fn test_with_token() {
        let client = ApiClient::new("https://k.example.com:6443/").with_token("abc");
        assert_eq!(client.base_url(), "https://k.example.com:6443");
        assert_eq!(client.token.as_deref(), Some("abc"));
    }
}
