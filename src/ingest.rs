//! File-level ingestion: feeds parsed lines into the aggregator and keeps the
//! per-run report (malformed lines, record counts, series summaries).

use crate::aggregate::{Aggregate, AggregateStats, Aggregator, QueueSeries, SeriesSummary};
use crate::classify::EntityGrouping;
use crate::error::{Error, Result};
use crate::parser::{TraceLine, classify_line, parse_queue_delta_line, parse_queue_line};
use crate::record::MetricKind;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const INGEST_SUMMARY_SCHEMA: &str = "simtrace.ingest_summary.v1";

/// A skipped input line, reported once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLine {
    pub source: String,
    pub line: usize,
    pub content: String,
    pub reason: String,
}

/// Input-level bookkeeping for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub sources: Vec<String>,
    pub lines_read: usize,
    pub malformed: Vec<MalformedLine>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingestion {
    pub aggregate: Aggregate,
    pub report: IngestReport,
}

#[derive(Debug, Default)]
pub struct Ingestor {
    aggregator: Aggregator,
    report: IngestReport,
}

impl Ingestor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a utilization trace. Queue-shaped lines in the same file are
    /// routed to the queue series.
    pub fn ingest_trace<R: BufRead>(&mut self, source: &str, reader: R) -> Result<()> {
        self.for_each_line(source, reader, |aggregator, number, line| {
            match classify_line(number, line)? {
                None => {}
                Some(TraceLine::Queue(record)) => aggregator.push_queue(record),
                Some(parsed) => {
                    for record in parsed.into_utilization() {
                        aggregator.push_utilization(&record);
                    }
                }
            }
            Ok(())
        })
    }

    /// Ingest a dedicated `timestamp queue_size` trace.
    pub fn ingest_queue<R: BufRead>(&mut self, source: &str, reader: R) -> Result<()> {
        self.for_each_line(source, reader, |aggregator, number, line| {
            if let Some(record) = parse_queue_line(number, line)? {
                aggregator.push_queue(record);
            }
            Ok(())
        })
    }

    /// Ingest a `timestamp delta` trace and fold it into absolute queue sizes.
    pub fn ingest_queue_deltas<R: BufRead>(&mut self, source: &str, reader: R) -> Result<()> {
        let mut deltas = Vec::new();
        let mut size = 0.0_f64;
        self.for_each_line(source, reader, |_, number, line| {
            if let Some((timestamp, delta)) = parse_queue_delta_line(number, line)? {
                let next = (size + delta).max(0.0);
                if !next.is_finite() {
                    return Err(Error::malformed(
                        number,
                        line,
                        format!("delta {delta} overflows the queue size"),
                    ));
                }
                size = next;
                deltas.push((timestamp, delta));
            }
            Ok(())
        })?;
        for (timestamp, queue_size) in QueueSeries::from_deltas(deltas).series().points() {
            self.aggregator
                .push_queue(crate::record::QueueRecord::new(*timestamp, *queue_size)?);
        }
        Ok(())
    }

    pub fn ingest_trace_file(&mut self, path: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        self.ingest_trace(&path.display().to_string(), reader)
    }

    pub fn ingest_queue_file(&mut self, path: &Path, deltas: bool) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        let source = path.display().to_string();
        if deltas {
            self.ingest_queue_deltas(&source, reader)
        } else {
            self.ingest_queue(&source, reader)
        }
    }

    #[must_use]
    pub fn finish(self) -> Ingestion {
        let aggregate = self.aggregator.finish();
        tracing::info!(
            event = "ingest.done",
            utilization_records = aggregate.stats.utilization_records,
            queue_records = aggregate.stats.queue_records,
            unclassified = aggregate.stats.unclassified_records,
            malformed = self.report.malformed.len(),
            "Ingestion finished"
        );
        Ingestion {
            aggregate,
            report: self.report,
        }
    }

    /// Drive `handle` over every line. Malformed lines are reported and skipped;
    /// read failures abort.
    fn for_each_line<R, F>(&mut self, source: &str, mut reader: R, mut handle: F) -> Result<()>
    where
        R: BufRead,
        F: FnMut(&mut Aggregator, usize, &str) -> Result<()>,
    {
        self.report.sources.push(source.to_string());
        let mut buf = Vec::new();
        let mut number = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            number += 1;
            self.report.lines_read += 1;
            let bytes = buf.strip_suffix(b"\n").unwrap_or(buf.as_slice());
            let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);

            let outcome = match std::str::from_utf8(bytes) {
                Ok(line) => handle(&mut self.aggregator, number, line),
                Err(_) => Err(Error::malformed(
                    number,
                    &String::from_utf8_lossy(bytes),
                    "line is not valid UTF-8",
                )),
            };
            match outcome {
                Ok(()) => {}
                Err(Error::MalformedRecord {
                    line,
                    content,
                    reason,
                }) => {
                    tracing::warn!(
                        event = "ingest.malformed",
                        source,
                        line,
                        content = %content,
                        "Skipping malformed line: {reason}"
                    );
                    self.report.malformed.push(MalformedLine {
                        source: source.to_string(),
                        line,
                        content,
                        reason,
                    });
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }
}

/// Ingest the given files in order: the utilization trace first, then the queue trace.
pub fn ingest_files(
    trace: Option<&Path>,
    queue: Option<&Path>,
    queue_deltas: bool,
) -> Result<Ingestion> {
    let mut ingestor = Ingestor::new();
    if let Some(path) = trace {
        ingestor.ingest_trace_file(path)?;
    }
    if let Some(path) = queue {
        ingestor.ingest_queue_file(path, queue_deltas)?;
    }
    Ok(ingestor.finish())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummaryRow {
    pub grouping: EntityGrouping,
    pub entity_key: String,
    pub metric: MetricKind,
    #[serde(flatten)]
    pub summary: SeriesSummary,
}

/// Machine-readable digest written next to the rendered artifacts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub schema: String,
    pub generated_at: String,
    pub time_bounds: Option<(f64, f64)>,
    pub stats: AggregateStats,
    pub report: IngestReport,
    pub series: Vec<SeriesSummaryRow>,
    pub queue: Option<SeriesSummary>,
}

impl Ingestion {
    #[must_use]
    pub fn summary(&self) -> IngestSummary {
        let view = &self.aggregate.view;
        let mut series = Vec::new();
        for grouping in EntityGrouping::ALL {
            for (key, entity) in view.group(grouping).iter() {
                for (metric, points) in entity.iter() {
                    if let Some(summary) = points.summary() {
                        series.push(SeriesSummaryRow {
                            grouping,
                            entity_key: key.to_string(),
                            metric,
                            summary,
                        });
                    }
                }
            }
        }
        IngestSummary {
            schema: INGEST_SUMMARY_SCHEMA.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            time_bounds: view.time_bounds(),
            stats: self.aggregate.stats,
            report: self.report.clone(),
            series,
            queue: self.aggregate.queue.series().summary(),
        }
    }
}
