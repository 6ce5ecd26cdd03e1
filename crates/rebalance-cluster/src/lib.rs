//! Rebalance Cluster - Kubernetes API access for kubectl-rebalance
//!
//! This crate provides:
//! - The `ClusterClient` trait (node/pod/metrics reads, pod eviction)
//! - `KubeClient`, backed by `kube` with full kubeconfig support
//! - `ApiClient`, plain HTTP for an explicit server URL or `kubectl proxy`
//! - `MockCluster`, an in-memory cluster for tests

pub mod api_client;
pub mod error;
pub mod kube_client;
pub mod mock;
pub mod traits;

// Re-export primary types
pub use api_client::{ApiClient, PROXY_URL};
pub use error::{ClusterError, Result};
pub use kube_client::KubeClient;
pub use mock::MockCluster;
pub use traits::ClusterClient;
