//! Machine lifetime timelines (`id,start,end` CSV written by the cluster).
//!
//! Columns are located by header name. An empty, `None` or `NaN` end means the
//! machine was still up when the run stopped; such intervals are drawn up to a
//! horizon chosen by the caller.

use crate::error::{Error, Result};
use crate::ingest::MalformedLine;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default horizon for machines that never shut down, in simulation time units.
pub const DEFAULT_HORIZON: f64 = 15e9;

/// Horizons must be finite and non-negative.
pub fn validate_horizon(horizon: f64) -> Result<()> {
    if horizon.is_finite() && horizon >= 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "lifetime horizon must be a finite non-negative number, got {horizon}"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineLifetime {
    pub id: String,
    pub start: f64,
    pub end: Option<f64>,
}

impl MachineLifetime {
    /// The drawable interval, with an open end capped at `horizon`.
    #[must_use]
    pub fn segment(&self, horizon: f64) -> (f64, f64) {
        (self.start, self.end.unwrap_or(horizon))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LifetimeTable {
    /// Sorted by start time; ties keep file order.
    pub lifetimes: Vec<MachineLifetime>,
    pub malformed: Vec<MalformedLine>,
}

struct Columns {
    id: usize,
    start: usize,
    end: usize,
    width: usize,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|candidate| candidate == name)
                .ok_or_else(|| Error::validation(format!("lifetime header lacks a {name:?} column")))
        };
        Ok(Self {
            id: find("id")?,
            start: find("start")?,
            end: find("end")?,
            width: headers.len(),
        })
    }
}

fn parse_end(field: &str) -> std::result::Result<Option<f64>, String> {
    match field {
        "" | "None" | "none" | "NaN" | "nan" => Ok(None),
        other => other
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| format!("invalid end {other:?}")),
    }
}

fn parse_row(columns: &Columns, record: &StringRecord) -> std::result::Result<MachineLifetime, String> {
    if record.len() != columns.width {
        return Err(format!(
            "expected {} columns, found {}",
            columns.width,
            record.len()
        ));
    }
    let id = &record[columns.id];
    if id.is_empty() {
        return Err("empty machine id".to_string());
    }
    let start = record[columns.start]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| format!("invalid start {:?}", &record[columns.start]))?;
    let end = parse_end(&record[columns.end])?;
    if end.is_some_and(|end| end < start) {
        return Err(format!("end precedes start {start}"));
    }
    Ok(MachineLifetime {
        id: id.to_string(),
        start,
        end,
    })
}

fn line_of(position: Option<&csv::Position>) -> usize {
    position
        .and_then(|p| usize::try_from(p.line()).ok())
        .unwrap_or_default()
}

/// Parse a lifetime CSV. A missing or unusable header is fatal; bad rows are
/// reported and skipped. Empty input yields an empty table.
pub fn parse_lifetimes<R: Read>(source: &str, reader: R) -> Result<LifetimeTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut table = LifetimeTable::default();
    if headers.is_empty() {
        return Ok(table);
    }
    let columns = Columns::from_headers(&headers)?;

    for result in reader.records() {
        let outcome = match result {
            Ok(record) => {
                let line = line_of(record.position());
                let content = record.iter().collect::<Vec<_>>().join(",");
                parse_row(&columns, &record).map_err(|reason| (line, content, reason))
            }
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => Err((line_of(err.position()), String::new(), err.to_string())),
        };
        match outcome {
            Ok(lifetime) => table.lifetimes.push(lifetime),
            Err((line, content, reason)) => {
                tracing::warn!(
                    event = "lifetimes.malformed",
                    source,
                    line,
                    "Skipping malformed lifetime row: {reason}"
                );
                table.malformed.push(MalformedLine {
                    source: source.to_string(),
                    line,
                    content,
                    reason,
                });
            }
        }
    }
    table
        .lifetimes
        .sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(table)
}

pub fn load_lifetimes(path: &Path) -> Result<LifetimeTable> {
    parse_lifetimes(&path.display().to_string(), File::open(path)?)
}
