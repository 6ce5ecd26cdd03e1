use crate::error::{RebalanceError, Result};
use crate::evictor::Evictor;
use crate::scorer::NodeScorer;
use crate::selector::PodSelector;
use crate::types::{RunOutcome, RunReport, Stage};
use crate::validator::Validator;
use rebalance_cluster::ClusterClient;
use rebalance_core::{format_duration, RebalanceConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives one rebalance run: score, select, validate, then evict or report
pub struct Rebalancer {
    config: RebalanceConfig,
    scorer: NodeScorer,
    selector: PodSelector,
    validator: Validator,
    evictor: Evictor,
}

impl Rebalancer {
    pub fn new(cluster: Arc<dyn ClusterClient>, config: RebalanceConfig) -> Self {
        Self {
            config,
            scorer: NodeScorer::new(cluster.clone()),
            selector: PodSelector::new(cluster.clone()),
            validator: Validator::default(),
            evictor: Evictor::new(cluster),
        }
    }

    /// Replace the selection checks
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Run the pipeline once
    ///
    /// No pod is evicted unless every check passes and the run is not a dry run.
    /// Cancellation between stages aborts with [`RebalanceError::Cancelled`];
    /// cancellation during eviction ends the batch early and is reported in the
    /// returned [`RunOutcome::Evicted`] report.
    pub async fn run(&self, token: &CancellationToken) -> Result<RunReport> {
        self.config.validate()?;
        let constraints = &self.config.constraints;
        let mut path = Vec::with_capacity(5);

        enter(&mut path, Stage::Scoring);
        let scoring = self
            .scorer
            .score(self.config.metric, constraints.from_nodes, constraints.threshold)
            .await?;

        if scoring.nodes.is_empty() {
            info!(
                "No nodes above {}% threshold, nothing to rebalance",
                constraints.threshold
            );
            enter(&mut path, Stage::Done);
            return Ok(RunReport {
                scoring,
                selected: Vec::new(),
                outcome: RunOutcome::NoOverloadedNodes {
                    threshold: constraints.threshold,
                },
                path,
            });
        }
        info!(
            "Targeting {} node(s) scored by {}",
            scoring.nodes.len(),
            scoring.metric
        );
        check_cancelled(token, Stage::Selecting)?;

        enter(&mut path, Stage::Selecting);
        let selected = self
            .selector
            .select(
                &scoring.nodes,
                &constraints.selector,
                &constraints.namespace,
                constraints.count,
            )
            .await?;
        check_cancelled(token, Stage::Validating)?;

        enter(&mut path, Stage::Validating);
        self.validator.validate(&selected, constraints)?;

        if self.config.dry_run {
            enter(&mut path, Stage::DryRunReport);
            info!("Dry run: {} pod(s) would be evicted", selected.len());
            enter(&mut path, Stage::Done);
            return Ok(RunReport {
                scoring,
                selected,
                outcome: RunOutcome::DryRun,
                path,
            });
        }
        check_cancelled(token, Stage::Evicting)?;

        enter(&mut path, Stage::Evicting);
        info!(
            "Evicting {} pod(s) with {} between evictions",
            selected.len(),
            format_duration(self.config.interval)
        );
        let report = self
            .evictor
            .evict(&selected, self.config.interval, token)
            .await;

        enter(&mut path, Stage::Done);
        Ok(RunReport {
            scoring,
            selected,
            outcome: RunOutcome::Evicted(report),
            path,
        })
    }
}

fn enter(path: &mut Vec<Stage>, stage: Stage) {
    debug!("Entering stage: {}", stage);
    path.push(stage);
}

fn check_cancelled(token: &CancellationToken, next: Stage) -> Result<()> {
    if token.is_cancelled() {
        warn!("Cancelled before {}", next);
        return Err(RebalanceError::cancelled(next));
    }
    Ok(())
}
