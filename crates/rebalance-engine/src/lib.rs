//! Rebalance Engine - The node scoring and eviction pipeline
//!
//! A run moves through four components, each behind the `ClusterClient` seam:
//! - `NodeScorer` ranks ready nodes by CPU, memory or running pod count
//! - `PodSelector` gathers matching pods from the most loaded nodes
//! - `Validator` rejects selections that fail the operator's constraints
//! - `Evictor` evicts the selection one pod at a time with pacing
//!
//! `Rebalancer` sequences them and returns a `RunReport`.

pub mod error;
pub mod evictor;
pub mod rebalancer;
pub mod scorer;
pub mod selector;
pub mod types;
pub mod validator;

// Re-export commonly used types
pub use error::{RebalanceError, Result};
pub use evictor::Evictor;
pub use rebalancer::Rebalancer;
pub use scorer::NodeScorer;
pub use selector::PodSelector;
pub use types::{
    CheckResult, EvictionReport, NodeScoring, RunOutcome, RunReport, Stage, UsageSnapshot,
    ValidationFailure,
};
pub use validator::{default_checks, MinimumPods, SelectionCheck, SufficientCandidates, Validator};
