use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How a node's composite load score is derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricMode {
    /// CPU usage as a percentage of allocatable CPU
    Cpu,
    /// Memory usage as a percentage of allocatable memory
    Memory,
    /// Mean of the CPU and memory percentages
    #[default]
    Both,
    /// Number of running, non-terminating pods on the node
    PodCount,
}

impl MetricMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricMode::Cpu => "cpu",
            MetricMode::Memory => "memory",
            MetricMode::Both => "both",
            MetricMode::PodCount => "pod-count",
        }
    }

    /// Whether scoring needs a usage snapshot from the metrics API
    pub fn uses_usage(&self) -> bool {
        !matches!(self, MetricMode::PodCount)
    }
}

impl fmt::Display for MetricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(MetricMode::Cpu),
            "memory" => Ok(MetricMode::Memory),
            "both" => Ok(MetricMode::Both),
            "pod-count" => Ok(MetricMode::PodCount),
            other => Err(CoreError::invalid_config(
                format!("unknown metric '{}'", other),
                "Use one of: cpu, memory, both, pod-count",
            )),
        }
    }
}

/// Load of a single ready node, computed fresh for each run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLoad {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_pods: Option<usize>,
    /// Composite score the node is ranked by
    pub score: f64,
    pub ready: bool,
}

impl NodeLoad {
    /// Record for a node scored from its usage snapshot
    ///
    /// Returns `None` when the percentage the mode needs is unknown.
    pub fn from_usage(
        name: impl Into<String>,
        cpu_percent: Option<f64>,
        memory_percent: Option<f64>,
        mode: MetricMode,
    ) -> Option<Self> {
        let score = match mode {
            MetricMode::Cpu => cpu_percent?,
            MetricMode::Memory => memory_percent?,
            MetricMode::Both | MetricMode::PodCount => (cpu_percent? + memory_percent?) / 2.0,
        };
        Some(Self {
            name: name.into(),
            cpu_percent,
            memory_percent,
            running_pods: None,
            score,
            ready: true,
        })
    }

    /// Record for a node scored by its running pod count
    pub fn from_pod_count(name: impl Into<String>, running_pods: usize) -> Self {
        Self {
            name: name.into(),
            cpu_percent: None,
            memory_percent: None,
            running_pods: Some(running_pods),
            score: running_pods as f64,
            ready: true,
        }
    }
}

/// Live CPU and memory usage of one node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeUsage {
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
}

/// `metrics.k8s.io/v1beta1` NodeMetrics object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

/// `metrics.k8s.io/v1beta1` NodeMetricsList
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetricsList {
    #[serde(default)]
    pub items: Vec<NodeMetrics>,
}

/// A pod considered for eviction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCandidate {
    pub namespace: String,
    pub name: String,
    pub node_name: String,
    /// Pod phase as reported by the cluster (Running, Pending, ...)
    pub phase: String,
    /// A deletion timestamp is set
    pub terminating: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl PodCandidate {
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            name: pod.metadata.name.clone().unwrap_or_default(),
            node_name: pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.clone())
                .unwrap_or_default(),
            phase: pod
                .status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            terminating: pod.metadata.deletion_timestamp.is_some(),
            labels: pod.metadata.labels.clone().unwrap_or_default(),
        }
    }

    /// Running phase with no pending deletion
    pub fn is_running(&self) -> bool {
        self.phase == "Running" && !self.terminating
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Result of a single eviction attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum EvictionResult {
    Succeeded,
    Failed { reason: String },
}

/// Per-pod eviction outcome, used for reporting only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionOutcome {
    pub namespace: String,
    pub name: String,
    pub node_name: String,
    pub result: EvictionResult,
    pub attempted_at: DateTime<Utc>,
}

impl EvictionOutcome {
    pub fn succeeded(pod: &PodCandidate) -> Self {
        Self::new(pod, EvictionResult::Succeeded)
    }

    pub fn failed(pod: &PodCandidate, reason: impl Into<String>) -> Self {
        Self::new(
            pod,
            EvictionResult::Failed {
                reason: reason.into(),
            },
        )
    }

    fn new(pod: &PodCandidate, result: EvictionResult) -> Self {
        Self {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
            node_name: pod.node_name.clone(),
            result,
            attempted_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, EvictionResult::Succeeded)
    }
}
