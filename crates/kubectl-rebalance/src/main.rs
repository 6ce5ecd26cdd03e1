mod output;

use clap::{CommandFactory, FromArgMatches, Parser};
use output::{render, OutputFormat};
use rebalance_cluster::{ApiClient, ClusterClient, KubeClient, PROXY_URL};
use rebalance_core::{
    parse_duration, MetricMode, NamespaceScope, RebalanceConfig, SelectionConstraints,
};
use rebalance_engine::Rebalancer;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const AFTER_HELP: &str = "\
EXAMPLES:
  # Evict 10 pods with label 'name=php' from the 3 most loaded nodes
  kubectl rebalance --count 10 --selector name=php --from-nodes 3

  # Dry-run to see what would be evicted
  kubectl rebalance --count 10 --selector name=php --dry-run

  # Use pod-count for clusters without metrics-server
  kubectl rebalance --count 10 --selector name=php --metric pod-count

  # Target nodes over 90% utilization, with minimum 5 pods
  kubectl rebalance --count 20 --selector app=web --threshold 90 --min-pods 5";

#[derive(Parser, Debug)]
#[command(
    name = "kubectl-rebalance",
    version,
    about = "Rebalance pods from overloaded nodes",
    long_about = "Evict pods from the most heavily loaded nodes so they are \
                  rescheduled onto less loaded ones.",
    after_help = AFTER_HELP,
    arg_required_else_help = true
)]
struct Cli {
    /// Number of pods to evict
    #[arg(short, long, default_value_t = 10)]
    count: usize,

    /// Minimum matching pods required to proceed
    #[arg(long, default_value_t = 0)]
    min_pods: usize,

    /// Number of most loaded nodes to target
    #[arg(long, default_value_t = 3)]
    from_nodes: usize,

    /// CPU/memory threshold percentage
    #[arg(long, default_value_t = 80.0)]
    threshold: f64,

    /// Label selector for pods to evict
    #[arg(short = 'l', long)]
    selector: String,

    /// Namespace to select pods from (all namespaces when unset)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Target all namespaces, overriding --namespace
    #[arg(short = 'A', long)]
    all_namespaces: bool,

    /// Interval between evictions (e.g. 500ms, 10s, 1m30s)
    #[arg(long, default_value = "10s", value_parser = parse_interval)]
    interval: Duration,

    /// Show what would be evicted without evicting
    #[arg(long)]
    dry_run: bool,

    /// Load metric: cpu, memory, both or pod-count
    #[arg(long, default_value = "both", value_parser = parse_metric)]
    metric: MetricMode,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// API server URL, bypassing kubeconfig
    #[arg(long, env = "REBALANCE_SERVER")]
    server: Option<String>,

    /// Bearer token used with --server
    #[arg(long, env = "REBALANCE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
}

fn parse_interval(s: &str) -> rebalance_core::Result<Duration> {
    parse_duration(s)
}

fn parse_metric(s: &str) -> rebalance_core::Result<MetricMode> {
    s.parse()
}

impl Cli {
    fn rebalance_config(&self) -> RebalanceConfig {
        RebalanceConfig {
            constraints: SelectionConstraints {
                count: self.count,
                min_pods: self.min_pods,
                selector: self.selector.clone(),
                namespace: NamespaceScope::from_flags(
                    self.namespace.as_deref(),
                    self.all_namespaces,
                ),
                threshold: self.threshold,
                from_nodes: self.from_nodes,
            },
            interval: self.interval,
            dry_run: self.dry_run,
            metric: self.metric,
        }
    }

    /// Explicit server, then kubeconfig, then a local `kubectl proxy`
    async fn cluster_client(&self) -> miette::Result<Arc<dyn ClusterClient>> {
        if let Some(server) = &self.server {
            info!("Using API server {}", server);
            let client = ApiClient::new(server);
            return Ok(Arc::new(match &self.token {
                Some(token) => client.with_token(token.as_str()),
                None => client,
            }));
        }

        if let Some(path) = &self.kubeconfig {
            return Ok(Arc::new(KubeClient::from_kubeconfig(path).await?));
        }

        match KubeClient::infer().await {
            Ok(client) => Ok(Arc::new(client)),
            Err(e) => {
                warn!("{}, assuming kubectl proxy on {}", e, PROXY_URL);
                Ok(Arc::new(ApiClient::new(PROXY_URL)))
            }
        }
    }
}

/// Usage name: `kubectl rebalance` when installed as a kubectl plugin
fn invocation_name(argv0: Option<&OsStr>) -> String {
    let file_name = argv0
        .and_then(|a| Path::new(a).file_name())
        .and_then(|n| n.to_str());

    match file_name {
        Some(name) if name.starts_with("kubectl-") => name.replacen('-', " ", 1),
        Some(name) => name.to_string(),
        None => "kubectl-rebalance".to_string(),
    }
}

fn parse_cli() -> Cli {
    let name = invocation_name(std::env::args_os().next().as_deref());
    let matches = Cli::command().bin_name(name).get_matches();
    Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = parse_cli();

    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.rebalance_config();
    let client = cli.cluster_client().await?;

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, stopping after the current step");
            ctrl_c_token.cancel();
        }
    });

    let rebalancer = Rebalancer::new(client, config);
    let report = rebalancer.run(&token).await?;

    let rendered = render(&report, cli.output)?;
    if rendered.ends_with('\n') {
        print!("{}", rendered);
    } else {
        println!("{}", rendered);
    }

    Ok(())
}
