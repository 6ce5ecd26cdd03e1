use rebalance_core::{
    EvictionOutcome, MetricMode, NodeLoad, NodeMetrics, NodeUsage, PodCandidate,
    ResourceQuantities,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Result of fetching live node usage
#[derive(Debug, Clone)]
pub enum UsageSnapshot {
    /// Usage keyed by node name
    Available(HashMap<String, NodeUsage>),
    /// Metrics API could not be used; the reason is surfaced to the operator
    Unavailable(String),
}

impl UsageSnapshot {
    /// Build the node name -> usage lookup from a metrics listing
    ///
    /// Entries without a name or with unparseable quantities are dropped.
    pub fn from_metrics(metrics: Vec<NodeMetrics>) -> Self {
        let mut usage = HashMap::with_capacity(metrics.len());

        for item in metrics {
            let Some(name) = item.metadata.name else {
                continue;
            };

            let cpu = item.usage.get("cpu").map(|q| ResourceQuantities::parse_cpu(&q.0));
            let memory = item.usage.get("memory").map(|q| ResourceQuantities::parse_memory(&q.0));

            match (cpu, memory) {
                (Some(Ok(cpu_millicores)), Some(Ok(memory_bytes))) => {
                    usage.insert(
                        name,
                        NodeUsage {
                            cpu_millicores,
                            memory_bytes,
                        },
                    );
                }
                _ => warn!("Ignoring unusable metrics for node {}", name),
            }
        }

        Self::Available(usage)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Ranked nodes plus how they were scored
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeScoring {
    pub nodes: Vec<NodeLoad>,
    /// Metric the operator asked for
    pub requested_metric: MetricMode,
    /// Metric actually used, after any fallback
    pub metric: MetricMode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl NodeScoring {
    pub fn fell_back(&self) -> bool {
        self.metric != self.requested_metric
    }
}

/// Reason a selection is not actionable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationFailure {
    #[error("requested {requested} pods but only found {found} matching pods on the most loaded nodes")]
    InsufficientCandidates { requested: usize, found: usize },

    #[error("minimum threshold not met: required {minimum} pods matching selector, but only found {found}")]
    BelowMinimum { minimum: usize, found: usize },

    /// Raised by pluggable policy checks
    #[error("{check}: {reason}")]
    Policy { check: String, reason: String },
}

/// Result of a single selection check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub check: String,
    pub failure: Option<ValidationFailure>,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            failure: None,
        }
    }

    /// Create a failing check result
    pub fn fail(check: impl Into<String>, failure: ValidationFailure) -> Self {
        Self {
            check: check.into(),
            failure: Some(failure),
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of an eviction batch
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionReport {
    pub outcomes: Vec<EvictionOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    /// Pacing waits taken between consecutive attempts
    pub pacing_steps: usize,
    /// Pods never attempted because the batch was cancelled
    pub skipped: usize,
    pub cancelled: bool,
}

impl EvictionReport {
    pub(crate) fn record(&mut self, outcome: EvictionOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Number of eviction requests issued
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }
}

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Scoring,
    Selecting,
    Validating,
    DryRunReport,
    Evicting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scoring => "scoring",
            Stage::Selecting => "selecting",
            Stage::Validating => "validating",
            Stage::DryRunReport => "dry-run report",
            Stage::Evicting => "evicting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a run ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum RunOutcome {
    /// No ready node met the load criteria
    NoOverloadedNodes { threshold: f64 },
    /// Preview only; the selected pods would have been evicted
    DryRun,
    Evicted(EvictionReport),
}

/// Everything a run produced, for the presentation layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub scoring: NodeScoring,
    pub selected: Vec<PodCandidate>,
    pub outcome: RunOutcome,
    /// States visited, ending in `Done`
    pub path: Vec<Stage>,
}
