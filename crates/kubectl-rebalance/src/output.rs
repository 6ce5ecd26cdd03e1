//! Rendering of run reports

use clap::ValueEnum;
use rebalance_core::{EvictionResult, MetricMode, NodeLoad, PodCandidate};
use rebalance_engine::{EvictionReport, RunOutcome, RunReport};
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable tables (default)
    #[default]
    Table,
    Json,
    Yaml,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "NODE")]
    name: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "PODS")]
    pods: String,
    #[tabled(rename = "SCORE")]
    score: String,
}

impl From<&NodeLoad> for NodeRow {
    fn from(load: &NodeLoad) -> Self {
        Self {
            name: load.name.clone(),
            cpu: format_percent(load.cpu_percent),
            memory: format_percent(load.memory_percent),
            pods: load
                .running_pods
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
            score: format!("{:.1}", load.score),
        }
    }
}

#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
    #[tabled(rename = "POD")]
    name: String,
    #[tabled(rename = "NODE")]
    node: String,
}

#[derive(Tabled)]
struct EvictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
    #[tabled(rename = "POD")]
    name: String,
    #[tabled(rename = "NODE")]
    node: String,
    #[tabled(rename = "RESULT")]
    result: String,
}

fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v))
}

/// Render `report` in the requested format
pub fn render(report: &RunReport, format: OutputFormat) -> miette::Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(report)),
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| miette::miette!("Failed to encode report as JSON: {}", e)),
        OutputFormat::Yaml => serde_yaml::to_string(report)
            .map_err(|e| miette::miette!("Failed to encode report as YAML: {}", e)),
    }
}

fn render_table(report: &RunReport) -> String {
    let mut out = String::new();

    for warning in &report.scoring.warnings {
        out.push_str(&format!("Warning: {}\n", warning));
    }

    if let RunOutcome::NoOverloadedNodes { threshold } = &report.outcome {
        out.push_str(&format!(
            "No nodes found with utilization above {:.0}%\n",
            threshold
        ));
        return out;
    }

    let label = match report.scoring.metric {
        MetricMode::PodCount => "running pods",
        MetricMode::Cpu => "cpu",
        MetricMode::Memory => "memory",
        MetricMode::Both => "cpu and memory",
    };
    out.push_str(&format!(
        "Found {} overloaded node(s), ranked by {}:\n",
        report.scoring.nodes.len(),
        label
    ));
    let nodes: Vec<NodeRow> = report.scoring.nodes.iter().map(NodeRow::from).collect();
    out.push_str(&table(&nodes));

    match &report.outcome {
        RunOutcome::DryRun => {
            out.push_str(&format!(
                "\nDRY-RUN MODE - Would evict the following {} pod(s):\n",
                report.selected.len()
            ));
            out.push_str(&table(&pod_rows(&report.selected)));
        }
        RunOutcome::Evicted(eviction) => {
            out.push('\n');
            out.push_str(&table(&eviction_rows(eviction)));
            out.push_str(&summary(eviction));
        }
        RunOutcome::NoOverloadedNodes { .. } => {}
    }

    out
}

fn table<T: Tabled>(rows: &[T]) -> String {
    let mut rendered = Table::new(rows).with(Style::rounded()).to_string();
    rendered.push('\n');
    rendered
}

fn pod_rows(pods: &[PodCandidate]) -> Vec<PodRow> {
    pods.iter()
        .enumerate()
        .map(|(i, pod)| PodRow {
            index: i + 1,
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
            node: pod.node_name.clone(),
        })
        .collect()
}

fn eviction_rows(report: &EvictionReport) -> Vec<EvictionRow> {
    report
        .outcomes
        .iter()
        .enumerate()
        .map(|(i, outcome)| EvictionRow {
            index: i + 1,
            namespace: outcome.namespace.clone(),
            name: outcome.name.clone(),
            node: outcome.node_name.clone(),
            result: match &outcome.result {
                EvictionResult::Succeeded => "evicted".to_string(),
                EvictionResult::Failed { reason } => format!("failed: {}", reason),
            },
        })
        .collect()
}

fn summary(report: &EvictionReport) -> String {
    let mut line = format!(
        "\nRebalancing complete: {} evicted, {} failed",
        report.succeeded, report.failed
    );
    if report.cancelled {
        line.push_str(&format!(
            " (cancelled, {} pod(s) not attempted)",
            report.skipped
        ));
    }
    line.push('\n');
    line
}
