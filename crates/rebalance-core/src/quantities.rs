use crate::error::{CoreError, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

const BINARY_SUFFIXES: [(&str, i64); 5] = [
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
];

const DECIMAL_SUFFIXES: [(&str, i64); 5] = [
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
];

/// CPU and memory quantities of a node, either capacity or live usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    /// CPU in millicores (1000 = 1 core)
    pub cpu_millicores: i64,
    /// Memory in bytes
    pub memory_bytes: i64,
}

impl ResourceQuantities {
    pub fn new(cpu_millicores: i64, memory_bytes: i64) -> Self {
        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    /// Parse CPU string into millicores (e.g., "2", "1000m", "0.5", "250000u", "1500000n")
    ///
    /// metrics-server reports usage in nanocores, so the sub-milli suffixes
    /// are accepted and truncated to whole millicores.
    pub fn parse_cpu(s: &str) -> Result<i64> {
        let invalid = || CoreError::invalid_quantity("cpu", s);
        let s = s.trim();

        let millicores = if let Some(n) = s.strip_suffix('n') {
            n.parse::<i64>().map(|v| v / 1_000_000).map_err(|_| invalid())?
        } else if let Some(u) = s.strip_suffix('u') {
            u.parse::<i64>().map(|v| v / 1_000).map_err(|_| invalid())?
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<i64>().map_err(|_| invalid())?
        } else {
            let cores = s.parse::<f64>().map_err(|_| invalid())?;
            if !cores.is_finite() {
                return Err(invalid());
            }
            (cores * 1000.0).round() as i64
        };

        if millicores < 0 {
            return Err(invalid());
        }
        Ok(millicores)
    }

    /// Parse memory string into bytes (e.g., "128Mi", "1Gi", "1024", "2G", "1.5Gi")
    pub fn parse_memory(s: &str) -> Result<i64> {
        let invalid = || CoreError::invalid_quantity("memory", s);
        let s = s.trim();

        let (number, multiplier) = BINARY_SUFFIXES
            .iter()
            .chain(DECIMAL_SUFFIXES.iter())
            .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|n| (n, *mult)))
            .unwrap_or((s, 1));

        if let Ok(whole) = number.parse::<i64>() {
            return whole
                .checked_mul(multiplier)
                .filter(|bytes| *bytes >= 0)
                .ok_or_else(invalid);
        }

        let fractional = number.parse::<f64>().map_err(|_| invalid())?;
        if !fractional.is_finite() || fractional < 0.0 {
            return Err(invalid());
        }
        Ok((fractional * multiplier as f64).ceil() as i64)
    }

    /// Get CPU and memory from a resource map (k8s-openapi format)
    ///
    /// Missing or unparseable entries count as zero.
    pub fn from_k8s_resource_map(resources: &BTreeMap<String, Quantity>) -> Self {
        let cpu_millicores = resources
            .get("cpu")
            .and_then(|q| Self::parse_cpu(&q.0).ok())
            .unwrap_or(0);

        let memory_bytes = resources
            .get("memory")
            .and_then(|q| Self::parse_memory(&q.0).ok())
            .unwrap_or(0);

        Self {
            cpu_millicores,
            memory_bytes,
        }
    }
}
