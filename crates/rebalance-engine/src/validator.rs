use crate::types::{CheckResult, ValidationFailure};
use rebalance_core::{PodCandidate, SelectionConstraints};
use tracing::debug;

/// A policy a selection must satisfy before eviction
pub trait SelectionCheck: Send + Sync {
    /// Check the selection against the constraints; must not mutate anything
    fn check(&self, pods: &[PodCandidate], constraints: &SelectionConstraints) -> CheckResult;

    /// Name of the check
    fn name(&self) -> &str;
}

/// The selection must contain the full requested count
pub struct SufficientCandidates;

impl SelectionCheck for SufficientCandidates {
    fn check(&self, pods: &[PodCandidate], constraints: &SelectionConstraints) -> CheckResult {
        if pods.len() < constraints.count {
            return CheckResult::fail(
                self.name(),
                ValidationFailure::InsufficientCandidates {
                    requested: constraints.count,
                    found: pods.len(),
                },
            );
        }
        CheckResult::pass(self.name())
    }

    fn name(&self) -> &str {
        "SufficientCandidates"
    }
}

/// The selection must reach `min_pods` when one is configured
pub struct MinimumPods;

impl SelectionCheck for MinimumPods {
    fn check(&self, pods: &[PodCandidate], constraints: &SelectionConstraints) -> CheckResult {
        if constraints.min_pods > 0 && pods.len() < constraints.min_pods {
            return CheckResult::fail(
                self.name(),
                ValidationFailure::BelowMinimum {
                    minimum: constraints.min_pods,
                    found: pods.len(),
                },
            );
        }
        CheckResult::pass(self.name())
    }

    fn name(&self) -> &str {
        "MinimumPods"
    }
}

/// Get default selection checks, in evaluation order
pub fn default_checks() -> Vec<Box<dyn SelectionCheck>> {
    vec![Box::new(SufficientCandidates), Box::new(MinimumPods)]
}

/// Runs every check in order and stops at the first failure
pub struct Validator {
    checks: Vec<Box<dyn SelectionCheck>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            checks: default_checks(),
        }
    }
}

impl Validator {
    pub fn new(checks: Vec<Box<dyn SelectionCheck>>) -> Self {
        Self { checks }
    }

    /// Append a check after the existing ones
    pub fn with_check(mut self, check: Box<dyn SelectionCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn validate(
        &self,
        pods: &[PodCandidate],
        constraints: &SelectionConstraints,
    ) -> Result<(), ValidationFailure> {
        for check in &self.checks {
            let result = check.check(pods, constraints);
            if let Some(failure) = result.failure {
                debug!("Selection rejected by {}: {}", result.check, failure);
                return Err(failure);
            }
            debug!("Selection passed {}", result.check);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pods(n: usize) -> Vec<PodCandidate> {
        (0..n)
            .map(|i| PodCandidate {
                namespace: "web".to_string(),
                name: format!("php-{}", i),
                node_name: "node-a".to_string(),
                phase: "Running".to_string(),
                terminating: false,
                labels: BTreeMap::new(),
            })
            .collect()
    }

    fn constraints(count: usize, min_pods: usize) -> SelectionConstraints {
        SelectionConstraints {
            count,
            min_pods,
            selector: "name=php".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_full_selection_passes() {
        let validator = Validator::default();
        assert!(validator.validate(&pods(10), &constraints(10, 5)).is_ok());
        assert!(validator.validate(&pods(3), &constraints(3, 0)).is_ok());
    }

    #[test]
    fn test_count_check_ignores_generous_minimum() {
        let err = Validator::default()
            .validate(&pods(7), &constraints(10, 5))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationFailure::InsufficientCandidates {
                requested: 10,
                found: 7
            }
        );
    }

    #[test]
    fn test_count_check_runs_before_minimum() {
        let err = Validator::default()
            .validate(&pods(2), &constraints(10, 5))
            .unwrap_err();
        assert!(matches!(err, ValidationFailure::InsufficientCandidates { .. }));
    }

    #[test]
    fn test_minimum_check() {
        let check = MinimumPods;
        assert!(!check.check(&pods(2), &constraints(2, 5)).passed());
        assert!(check.check(&pods(2), &constraints(2, 0)).passed());

        // Only reachable as the deciding check when count is below the minimum
        let err = Validator::default()
            .validate(&pods(3), &constraints(3, 5))
            .unwrap_err();
        assert_eq!(err, ValidationFailure::BelowMinimum { minimum: 5, found: 3 });
    }

    struct NoKubeSystem;

    impl SelectionCheck for NoKubeSystem {
        fn check(&self, pods: &[PodCandidate], _: &SelectionConstraints) -> CheckResult {
            match pods.iter().find(|p| p.namespace == "kube-system") {
                Some(p) => CheckResult::fail(
                    self.name(),
                    ValidationFailure::Policy {
                        check: self.name().to_string(),
                        reason: format!("{} is a system pod", p.key()),
                    },
                ),
                None => CheckResult::pass(self.name()),
            }
        }

        fn name(&self) -> &str {
            "NoKubeSystem"
        }
    }

    #[test]
    fn test_custom_check() {
        let validator = Validator::default().with_check(Box::new(NoKubeSystem));

        let mut selection = pods(2);
        assert!(validator.validate(&selection, &constraints(2, 0)).is_ok());

        selection[1].namespace = "kube-system".to_string();
        let err = validator.validate(&selection, &constraints(2, 0)).unwrap_err();
        assert_eq!(err.to_string(), "NoKubeSystem: kube-system/php-1 is a system pod");
    }
}
