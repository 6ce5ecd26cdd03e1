// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use crate::types::ValidationFailure;
use miette::Diagnostic;
use thiserror::Error;

/// Rebalance pipeline error type
#[derive(Error, Debug, Diagnostic)]
pub enum RebalanceError {
    /// Invalid configuration or selector
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] rebalance_core::CoreError),

    /// Cluster API call failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cluster(#[from] rebalance_cluster::ClusterError),

    /// Selection rejected before any eviction
    #[error("Validation failed: {0}")]
    #[diagnostic(
        code(rebalance::validation_failed),
        help("No pods were evicted. Lower --count or --min-pods, widen --selector, or raise --from-nodes")
    )]
    Validation(#[from] ValidationFailure),

    /// Run aborted by the operator
    #[error("Rebalance cancelled during {stage}")]
    #[diagnostic(
        code(rebalance::cancelled),
        help("Pods evicted before cancellation stay evicted")
    )]
    Cancelled {
        #[allow(unused)]
        stage: String,
    },
}

/// Result type for rebalance operations
pub type Result<T> = std::result::Result<T, RebalanceError>;

impl RebalanceError {
    pub fn cancelled(stage: impl ToString) -> Self {
        Self::Cancelled {
            stage: stage.to_string(),
        }
    }
}
