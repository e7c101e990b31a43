//! Line-level trace parsing.
//!
//! Every line is resolved exactly once into a [`TraceLine`] by [`classify_line`];
//! callers never index fields positionally. Recognized shapes, with fields split
//! on whitespace and/or commas:
//!
//! | fields | first field | shape                                     |
//! |--------|-------------|-------------------------------------------|
//! | 2      | number      | queue: `timestamp queue_size`             |
//! | 4      | kind token  | long form: `kind timestamp entity value`  |
//! | 4      | number      | wide form: `timestamp entity cpu mem`     |
//!
//! Blank lines and `#` comments carry no record and are not errors.

use crate::error::{Error, Result};
use crate::record::{MetricKind, QueueRecord, UtilizationRecord};

/// A trace line resolved to its record shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceLine {
    Queue(QueueRecord),
    LongForm(UtilizationRecord),
    WideForm {
        cpu: UtilizationRecord,
        memory: UtilizationRecord,
    },
}

impl TraceLine {
    /// Utilization records carried by this line, cpu before memory.
    #[must_use]
    pub fn into_utilization(self) -> Vec<UtilizationRecord> {
        match self {
            Self::Queue(_) => Vec::new(),
            Self::LongForm(record) => vec![record],
            Self::WideForm { cpu, memory } => vec![cpu, memory],
        }
    }
}

/// Split a line into non-empty fields on any mix of whitespace and commas.
#[must_use]
pub fn split_fields(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .collect()
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Resolve one line of a utilization (or mixed) trace.
///
/// `line_number` is 1-based and only used for error reporting.
/// Returns `Ok(None)` for blank and comment lines.
pub fn classify_line(line_number: usize, line: &str) -> Result<Option<TraceLine>> {
    if is_skippable(line) {
        return Ok(None);
    }
    let fields = split_fields(line);
    let malformed = |reason: String| Error::malformed(line_number, line, reason);

    match fields.as_slice() {
        [timestamp, size] => {
            let timestamp = parse_number(timestamp, "timestamp").map_err(malformed)?;
            let size = parse_number(size, "queue size").map_err(malformed)?;
            let record = QueueRecord::new(timestamp, size).map_err(|e| malformed(reason_of(e)))?;
            Ok(Some(TraceLine::Queue(record)))
        }
        [first, second, third, fourth] => {
            if let Some(kind) = MetricKind::from_token(first) {
                let timestamp = parse_number(second, "timestamp").map_err(malformed)?;
                let value = parse_number(fourth, "value").map_err(malformed)?;
                let record = UtilizationRecord::new(timestamp, *third, kind, value)
                    .map_err(|e| malformed(reason_of(e)))?;
                return Ok(Some(TraceLine::LongForm(record)));
            }
            let timestamp = parse_number(first, "timestamp").map_err(|_| {
                malformed(format!(
                    "first field {first:?} is neither a metric kind nor a timestamp"
                ))
            })?;
            let cpu_value = parse_number(third, "cpu value").map_err(malformed)?;
            let mem_value = parse_number(fourth, "memory value").map_err(malformed)?;
            let cpu = UtilizationRecord::new(timestamp, *second, MetricKind::Cpu, cpu_value)
                .map_err(|e| malformed(reason_of(e)))?;
            let memory = UtilizationRecord::new(timestamp, *second, MetricKind::Memory, mem_value)
                .map_err(|e| malformed(reason_of(e)))?;
            Ok(Some(TraceLine::WideForm { cpu, memory }))
        }
        other => Err(malformed(format!(
            "expected 2 or 4 fields, found {}",
            other.len()
        ))),
    }
}

/// Parse one utilization line into its records (one for long form, two for wide form).
///
/// Queue-shaped lines are rejected here; use [`classify_line`] for mixed files.
pub fn parse_utilization_line(line_number: usize, line: &str) -> Result<Vec<UtilizationRecord>> {
    match classify_line(line_number, line)? {
        None => Ok(Vec::new()),
        Some(TraceLine::Queue(_)) => Err(Error::malformed(
            line_number,
            line,
            "queue record found where a utilization record was expected",
        )),
        Some(line) => Ok(line.into_utilization()),
    }
}

/// Parse one line of a dedicated queue trace: exactly `timestamp queue_size`.
pub fn parse_queue_line(line_number: usize, line: &str) -> Result<Option<QueueRecord>> {
    if is_skippable(line) {
        return Ok(None);
    }
    let (timestamp, size) = two_numbers(line_number, line, "queue size")?;
    QueueRecord::new(timestamp, size)
        .map(Some)
        .map_err(|e| Error::malformed(line_number, line, reason_of(e)))
}

/// Parse one line of a queue delta trace: `timestamp delta`, where delta may be negative.
pub fn parse_queue_delta_line(line_number: usize, line: &str) -> Result<Option<(f64, f64)>> {
    if is_skippable(line) {
        return Ok(None);
    }
    let (timestamp, delta) = two_numbers(line_number, line, "queue delta")?;
    if timestamp < 0.0 {
        return Err(Error::malformed(
            line_number,
            line,
            format!("timestamp must be non-negative, got {timestamp}"),
        ));
    }
    Ok(Some((timestamp, delta)))
}

fn two_numbers(line_number: usize, line: &str, second_name: &str) -> Result<(f64, f64)> {
    let malformed = |reason: String| Error::malformed(line_number, line, reason);
    match split_fields(line).as_slice() {
        [timestamp, second] => {
            let timestamp = parse_number(timestamp, "timestamp").map_err(malformed)?;
            let second = parse_number(second, second_name).map_err(malformed)?;
            Ok((timestamp, second))
        }
        other => Err(malformed(format!("expected 2 fields, found {}", other.len()))),
    }
}

fn parse_number(field: &str, name: &str) -> std::result::Result<f64, String> {
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(value) => Err(format!("{name} must be finite, got {value}")),
        Err(_) => Err(format!("invalid {name} {field:?}")),
    }
}

fn reason_of(err: Error) -> String {
    match err {
        Error::Validation(reason) => reason,
        other => other.to_string(),
    }
}
