//! Typed records produced by the trace parser and the sweep runner.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource dimension a utilization record measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
}

impl MetricKind {
    pub const ALL: [Self; 2] = [Self::Cpu, Self::Memory];

    /// Parse a kind token as it appears in long-form trace lines.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "cpu" => Some(Self::Cpu),
            "mem" | "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationRecord {
    pub timestamp: f64,
    pub entity_key: String,
    pub metric_kind: MetricKind,
    pub value: f64,
}

impl UtilizationRecord {
    pub fn new(
        timestamp: f64,
        entity_key: impl Into<String>,
        metric_kind: MetricKind,
        value: f64,
    ) -> Result<Self> {
        check_timestamp(timestamp)?;
        let entity_key = entity_key.into();
        if entity_key.is_empty() {
            return Err(Error::validation("entity key must not be empty"));
        }
        Ok(Self {
            timestamp,
            entity_key,
            metric_kind,
            value,
        })
    }
}

/// Scheduler queue length observed at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub timestamp: f64,
    pub queue_size: f64,
}

impl QueueRecord {
    pub fn new(timestamp: f64, queue_size: f64) -> Result<Self> {
        check_timestamp(timestamp)?;
        if !queue_size.is_finite() || queue_size < 0.0 {
            return Err(Error::validation(format!(
                "queue size must be a finite non-negative number, got {queue_size}"
            )));
        }
        Ok(Self {
            timestamp,
            queue_size,
        })
    }
}

/// One measured sweep iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterPoint {
    pub parameter_value: i64,
    pub metric_value: f64,
    pub variant_label: String,
}

fn check_timestamp(timestamp: f64) -> Result<()> {
    if timestamp.is_finite() && timestamp >= 0.0 {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "timestamp must be a finite non-negative number, got {timestamp}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_tokens() {
        assert_eq!(MetricKind::from_token("cpu"), Some(MetricKind::Cpu));
        assert_eq!(MetricKind::from_token("mem"), Some(MetricKind::Memory));
        assert_eq!(MetricKind::from_token("memory"), Some(MetricKind::Memory));
        assert_eq!(MetricKind::from_token("CPU"), None);
        assert_eq!(MetricKind::Memory.to_string(), "memory");
    }

    #[test]
    fn records_reject_negative_or_non_finite_timestamps() {
        assert!(UtilizationRecord::new(-1.0, "host-1", MetricKind::Cpu, 1.0).is_err());
        assert!(UtilizationRecord::new(f64::NAN, "host-1", MetricKind::Cpu, 1.0).is_err());
        assert!(QueueRecord::new(f64::INFINITY, 1.0).is_err());
        assert!(QueueRecord::new(0.0, -2.0).is_err());
        assert!(QueueRecord::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn utilization_record_requires_key() {
        let err = UtilizationRecord::new(0.0, "", MetricKind::Cpu, 1.0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
