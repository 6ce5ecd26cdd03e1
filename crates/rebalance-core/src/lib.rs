//! Rebalance Core - Data model and input parsing for kubectl-rebalance
//!
//! This crate provides:
//! - Node load, pod candidate and eviction outcome types
//! - Label selector parsing and matching
//! - Kubernetes resource quantity parsing
//! - Run configuration and its validation
//! - Error types with miette diagnostics

pub mod config;
pub mod error;
pub mod labels;
pub mod quantities;
pub mod types;

// Re-export commonly used types
pub use config::{
    format_duration, parse_duration, NamespaceScope, RebalanceConfig, SelectionConstraints,
};
pub use error::{CoreError, Result};
pub use labels::{LabelSelector, Operator, Requirement};
pub use quantities::ResourceQuantities;
pub use types::{
    EvictionOutcome, EvictionResult, MetricMode, NodeLoad, NodeMetrics, NodeMetricsList,
    NodeUsage, PodCandidate,
};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};

/// Serialize a value to pretty JSON
pub fn to_json_pretty<T: serde::Serialize>(value: &T) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Serialize a value to YAML
pub fn to_yaml<T: serde::Serialize>(value: &T) -> std::result::Result<String, serde_yaml::Error> {
    serde_yaml::to_string(value)
}
