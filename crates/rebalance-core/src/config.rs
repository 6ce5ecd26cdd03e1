use crate::error::{CoreError, Result};
use crate::labels::LabelSelector;
use crate::types::MetricMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Namespaces pods are selected from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamespaceScope {
    #[default]
    All,
    Single(String),
}

impl NamespaceScope {
    /// Scope from the namespace flag pair; `all_namespaces` wins
    pub fn from_flags(namespace: Option<&str>, all_namespaces: bool) -> Self {
        match namespace {
            Some(ns) if !all_namespaces && !ns.is_empty() => Self::Single(ns.to_string()),
            _ => Self::All,
        }
    }

    /// Namespace to list in, `None` meaning cluster-wide
    pub fn as_namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Single(ns) => Some(ns),
        }
    }
}

/// Operator constraints a selection is built and validated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionConstraints {
    /// Number of pods to evict
    pub count: usize,
    /// Minimum matching pods required to proceed (0 disables the check)
    pub min_pods: usize,
    /// Label selector expression
    pub selector: String,
    pub namespace: NamespaceScope,
    /// Load threshold percent for cpu/memory/both scoring
    pub threshold: f64,
    /// Number of most loaded nodes to target
    pub from_nodes: usize,
}

impl Default for SelectionConstraints {
    fn default() -> Self {
        Self {
            count: 10,
            min_pods: 0,
            selector: String::new(),
            namespace: NamespaceScope::All,
            threshold: 80.0,
            from_nodes: 3,
        }
    }
}

/// Complete configuration of one rebalance run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceConfig {
    pub constraints: SelectionConstraints,
    /// Pause between consecutive evictions
    #[serde(with = "duration_str")]
    pub interval: Duration,
    pub dry_run: bool,
    pub metric: MetricMode,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            constraints: SelectionConstraints::default(),
            interval: Duration::from_secs(10),
            dry_run: false,
            metric: MetricMode::Both,
        }
    }
}

impl RebalanceConfig {
    /// Reject values the pipeline cannot act on
    pub fn validate(&self) -> Result<()> {
        let c = &self.constraints;

        if c.count == 0 {
            return Err(CoreError::invalid_config(
                "count must be greater than zero",
                "Pass --count with the number of pods to evict",
            ));
        }

        if c.from_nodes == 0 {
            return Err(CoreError::invalid_config(
                "from-nodes must be greater than zero",
                "Pass --from-nodes with the number of loaded nodes to target",
            ));
        }

        if !c.threshold.is_finite() || c.threshold < 0.0 {
            return Err(CoreError::invalid_config(
                format!("threshold {} is not a valid percentage", c.threshold),
                "Pass --threshold as a non-negative number, e.g. 80",
            ));
        }

        LabelSelector::parse(&c.selector)?;

        Ok(())
    }
}

/// Parse a Go-style duration such as `500ms`, `10s`, `1m30s` or `1h`
///
/// A bare `0` is accepted; any other number needs a unit.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = |reason: &str| {
        CoreError::invalid_config(
            format!("invalid duration '{}': {}", s, reason),
            "Use a number followed by a unit: ms, s, m or h (e.g. 10s, 1m30s)",
        )
    };

    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid("empty"));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("missing unit"))?;
        if digits == 0 {
            return Err(invalid("expected a number"));
        }
        let value: f64 = rest[..digits].parse().map_err(|_| invalid("bad number"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => return Err(invalid(&format!("unknown unit '{}'", other))),
        };
        rest = &rest[unit_len..];

        let step = Duration::try_from_secs_f64(value * seconds_per_unit)
            .map_err(|_| invalid("out of range"))?;
        total = total
            .checked_add(step)
            .ok_or_else(|| invalid("out of range"))?;
    }

    Ok(total)
}

/// Format a duration the way `parse_duration` reads it
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 {
        out.push_str(&format!("{}s", s));
    }
    out
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
