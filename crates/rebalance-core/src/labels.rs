//! Label selector parsing and matching
//!
//! Supports the Kubernetes label query syntax used by `kubectl -l`:
//! `key=value`, `key==value`, `key!=value`, `key in (a,b)`,
//! `key notin (a,b)`, `key`, `!key`, `key>N` and `key<N`, combined with
//! commas.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Comparison applied by a single requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
    /// Label value parses as an integer greater than the operand
    GreaterThan,
    /// Label value parses as an integer less than the operand
    LessThan,
}

/// One comma-separated clause of a selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl Requirement {
    /// Check a label set against this requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let current = labels.get(&self.key);
        match self.operator {
            Operator::Equals => current == self.values.first(),
            // Absent keys satisfy negative requirements
            Operator::NotEquals => current != self.values.first(),
            Operator::In => current.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => current.map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => current.is_some(),
            Operator::DoesNotExist => current.is_none(),
            Operator::GreaterThan | Operator::LessThan => {
                let (Some(value), Some(operand)) = (
                    current.and_then(|v| v.parse::<i64>().ok()),
                    self.values.first().and_then(|v| v.parse::<i64>().ok()),
                ) else {
                    return false;
                };
                if self.operator == Operator::GreaterThan {
                    value > operand
                } else {
                    value < operand
                }
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, self.values.join(",")),
            Operator::NotEquals => write!(f, "{}!={}", self.key, self.values.join(",")),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::GreaterThan => write!(f, "{}>{}", self.key, self.values.join(",")),
            Operator::LessThan => write!(f, "{}<{}", self.key, self.values.join(",")),
        }
    }
}

/// Parsed label selector; all requirements must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Selector that matches every label set
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parse a selector expression
    ///
    /// An empty or whitespace-only expression selects everything.
    pub fn parse(expr: &str) -> Result<Self> {
        if expr.trim().is_empty() {
            return Ok(Self::everything());
        }

        let requirements = split_clauses(expr)?
            .into_iter()
            .map(|clause| parse_requirement(expr, clause))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Check whether a label set satisfies every requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for LabelSelector {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", rendered.join(","))
    }
}

/// Split on commas that are not inside a value list
fn split_clauses(expr: &str) -> Result<Vec<&str>> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (idx, ch) in expr.char_indices() {
        match ch {
            '(' => {
                if depth > 0 {
                    return Err(CoreError::invalid_selector(expr, "nested '(' in value list"));
                }
                depth += 1;
            }
            ')' => {
                if depth == 0 {
                    return Err(CoreError::invalid_selector(expr, "unexpected ')'"));
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                clauses.push(&expr[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(CoreError::invalid_selector(expr, "unterminated value list"));
    }
    clauses.push(&expr[start..]);

    Ok(clauses)
}

fn parse_requirement(expr: &str, clause: &str) -> Result<Requirement> {
    let clause = clause.trim();
    if clause.is_empty() {
        return Err(CoreError::invalid_selector(expr, "empty requirement"));
    }

    if let Some(key) = clause.strip_prefix('!') {
        let key = key.trim();
        validate_key(expr, key)?;
        return Ok(requirement(key, Operator::DoesNotExist, Vec::new()));
    }

    if let Some(open) = clause.find('(') {
        return parse_set_requirement(expr, &clause[..open], &clause[open..]);
    }

    let (key, operator, value) = if let Some((k, v)) = clause.split_once("!=") {
        (k, Operator::NotEquals, v)
    } else if let Some((k, v)) = clause.split_once("==") {
        (k, Operator::Equals, v)
    } else if let Some((k, v)) = clause.split_once('=') {
        (k, Operator::Equals, v)
    } else if let Some((k, v)) = clause.split_once('>') {
        return parse_numeric_requirement(expr, k, Operator::GreaterThan, v);
    } else if let Some((k, v)) = clause.split_once('<') {
        return parse_numeric_requirement(expr, k, Operator::LessThan, v);
    } else {
        validate_key(expr, clause)?;
        return Ok(requirement(clause, Operator::Exists, Vec::new()));
    };

    let key = key.trim();
    let value = value.trim();
    validate_key(expr, key)?;
    validate_value(expr, value)?;

    Ok(requirement(key, operator, vec![value.to_string()]))
}

fn parse_numeric_requirement(
    expr: &str,
    key: &str,
    operator: Operator,
    value: &str,
) -> Result<Requirement> {
    let key = key.trim();
    let value = value.trim();
    validate_key(expr, key)?;

    if value.parse::<i64>().is_err() {
        return Err(CoreError::invalid_selector(
            expr,
            format!("'{}' needs an integer value, found '{}'", key, value),
        ));
    }

    Ok(requirement(key, operator, vec![value.to_string()]))
}

fn parse_set_requirement(expr: &str, head: &str, set: &str) -> Result<Requirement> {
    let mut words = head.split_whitespace();
    let (key, op) = match (words.next(), words.next(), words.next()) {
        (Some(key), Some(op), None) => (key, op),
        _ => {
            return Err(CoreError::invalid_selector(
                expr,
                format!("expected '<key> in (...)' or '<key> notin (...)', found '{}'", head.trim()),
            ))
        }
    };

    let operator = match op {
        "in" => Operator::In,
        "notin" => Operator::NotIn,
        other => {
            return Err(CoreError::invalid_selector(
                expr,
                format!("unknown set operator '{}'", other),
            ))
        }
    };
    validate_key(expr, key)?;

    let inner = set
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| CoreError::invalid_selector(expr, "trailing characters after value list"))?;

    let values = inner
        .split(',')
        .map(str::trim)
        .map(|v| validate_value(expr, v).map(|_| v.to_string()))
        .collect::<Result<Vec<_>>>()?;

    if inner.trim().is_empty() {
        return Err(CoreError::invalid_selector(
            expr,
            format!("'{}' requires at least one value", key),
        ));
    }

    Ok(requirement(key, operator, values))
}

fn requirement(key: &str, operator: Operator, values: Vec<String>) -> Requirement {
    Requirement {
        key: key.to_string(),
        operator,
        values,
    }
}

fn validate_key(expr: &str, key: &str) -> Result<()> {
    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            let prefix_ok = !prefix.is_empty()
                && prefix.len() <= MAX_PREFIX_LEN
                && prefix.split('.').all(|label| {
                    !label.is_empty()
                        && label
                            .chars()
                            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                        && !label.starts_with('-')
                        && !label.ends_with('-')
                });
            if !prefix_ok {
                return Err(CoreError::invalid_selector(
                    expr,
                    format!("invalid key prefix '{}'", prefix),
                ));
            }
            name
        }
        None => key,
    };

    if name.is_empty() || !is_qualified_name(name) {
        return Err(CoreError::invalid_selector(
            expr,
            format!("invalid label key '{}'", key),
        ));
    }
    Ok(())
}

fn validate_value(expr: &str, value: &str) -> Result<()> {
    if value.is_empty() || is_qualified_name(value) {
        Ok(())
    } else {
        Err(CoreError::invalid_selector(
            expr,
            format!("invalid label value '{}'", value),
        ))
    }
}

/// Up to 63 characters, alphanumeric at both ends, `-`, `_` or `.` inside
fn is_qualified_name(s: &str) -> bool {
    let bytes = s.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            s.len() <= MAX_NAME_LEN
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equality_selector() {
        let selector = LabelSelector::parse("app=web").unwrap();
        assert!(selector.matches(&labels(&[("app", "web"), ("tier", "frontend")])));
        assert!(!selector.matches(&labels(&[("app", "api")])));
        assert!(!selector.matches(&labels(&[])));

        let selector = LabelSelector::parse("app==web").unwrap();
        assert!(selector.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_inequality_matches_absent_key() {
        let selector = LabelSelector::parse("env!=prod").unwrap();
        assert!(selector.matches(&labels(&[("env", "dev")])));
        assert!(selector.matches(&labels(&[])));
        assert!(!selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_set_based_selector() {
        let selector = LabelSelector::parse("env in (prod, staging),tier notin (db)").unwrap();
        assert_eq!(selector.requirements().len(), 2);
        assert!(selector.matches(&labels(&[("env", "prod"), ("tier", "web")])));
        assert!(selector.matches(&labels(&[("env", "staging")])));
        assert!(!selector.matches(&labels(&[("env", "prod"), ("tier", "db")])));
        assert!(!selector.matches(&labels(&[("tier", "web")])));
    }

    #[test]
    fn test_existence_selector() {
        let selector = LabelSelector::parse("app.kubernetes.io/name,!canary").unwrap();
        assert!(selector.matches(&labels(&[("app.kubernetes.io/name", "php")])));
        assert!(!selector.matches(&labels(&[
            ("app.kubernetes.io/name", "php"),
            ("canary", "true")
        ])));
        assert!(!selector.matches(&labels(&[("canary", "true")])));
    }

    #[test]
    fn test_numeric_comparison_selector() {
        let selector = LabelSelector::parse("priority>5,tier<3").unwrap();
        assert_eq!(selector.requirements()[0].operator, Operator::GreaterThan);
        assert_eq!(selector.requirements()[1].operator, Operator::LessThan);

        assert!(selector.matches(&labels(&[("priority", "10"), ("tier", "1")])));
        assert!(!selector.matches(&labels(&[("priority", "5"), ("tier", "1")])));
        assert!(!selector.matches(&labels(&[("priority", "10"), ("tier", "3")])));
        // Missing or non-numeric labels never satisfy a comparison
        assert!(!selector.matches(&labels(&[("tier", "1")])));
        assert!(!selector.matches(&labels(&[("priority", "high"), ("tier", "1")])));

        assert_eq!(selector.to_string(), "priority>5,tier<3");

        for expr in ["priority>high", "priority>", ">5", "priority>-"] {
            assert!(LabelSelector::parse(expr).is_err(), "expected {} to be rejected", expr);
        }
        assert!(LabelSelector::parse("offset>-2").is_ok());
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::parse("   ").unwrap();
        assert!(selector.is_empty());
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("anything", "goes")])));
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let selector = LabelSelector::parse("role=").unwrap();
        assert!(selector.matches(&labels(&[("role", "")])));
        assert!(!selector.matches(&labels(&[("role", "worker")])));
    }

    #[test]
    fn test_invalid_selectors() {
        for expr in [
            "app in (web",
            "app in web)",
            "app in ()",
            "app between (a,b)",
            "=web",
            "app=web,,tier=db",
            "app=-web",
            "bad key=web",
            "app in (a,(b))",
            "Example.COM/app=web",
        ] {
            let err = LabelSelector::parse(expr).unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidSelector { .. }),
                "expected {} to be rejected",
                expr
            );
        }
    }

    #[test]
    fn test_display_round_trip() {
        let selector: LabelSelector = "app=web, env in (prod,staging), !canary".parse().unwrap();
        assert_eq!(selector.to_string(), "app=web,env in (prod,staging),!canary");
    }
}
