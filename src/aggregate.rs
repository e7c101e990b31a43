//! Single-pass series aggregation.
//!
//! The [`Aggregator`] is the only writer. It consumes records as the parser
//! produces them, discovers entity keys on first encounter, and hands back an
//! immutable [`Aggregate`] from [`Aggregator::finish`].
//!
//! # Invariants
//!
//! - Entity keys keep first-encounter order inside each grouping.
//! - Points keep arrival order; equal timestamps are kept side by side.
//! - Unclassified keys never reach the view.

use crate::classify::{EntityGrouping, classify_key};
use crate::record::{MetricKind, QueueRecord, UtilizationRecord};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Ordered `(timestamp, value)` pairs for one entity and metric kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series {
    points: Vec<(f64, f64)>,
}

impl Series {
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub(crate) fn push(&mut self, timestamp: f64, value: f64) {
        self.points.push((timestamp, value));
    }

    #[must_use]
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest and largest timestamp, regardless of arrival order.
    #[must_use]
    pub fn time_bounds(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |acc, &(t, _)| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }

    #[must_use]
    pub fn summary(&self) -> Option<SeriesSummary> {
        let (first_timestamp, _) = *self.points.first()?;
        let (last_timestamp, _) = *self.points.last()?;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &(_, value) in &self.points {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / self.points.len() as f64;
        Some(SeriesSummary {
            count: self.points.len(),
            min,
            max,
            mean,
            first_timestamp,
            last_timestamp,
        })
    }
}

/// `first_timestamp` and `last_timestamp` are taken from the first and last
/// points in arrival order, which need not be the extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub first_timestamp: f64,
    pub last_timestamp: f64,
}

/// All series recorded for one entity key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EntitySeries {
    by_kind: BTreeMap<MetricKind, Series>,
}

impl EntitySeries {
    #[must_use]
    pub fn get(&self, kind: MetricKind) -> Option<&Series> {
        self.by_kind.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, &Series)> {
        self.by_kind.iter().map(|(kind, series)| (*kind, series))
    }
}

/// Entity keys of one grouping, in first-encounter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTable {
    index: HashMap<String, usize>,
    entries: Vec<(String, EntitySeries)>,
}

impl EntityTable {
    fn entry(&mut self, key: &str) -> &mut EntitySeries {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.index.insert(key.to_string(), slot);
                self.entries.push((key.to_string(), EntitySeries::default()));
                slot
            }
        };
        &mut self.entries[slot].1
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&EntitySeries> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntitySeries)> {
        self.entries.iter().map(|(key, series)| (key.as_str(), series))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for EntityTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, series) in &self.entries {
            map.serialize_entry(key, series)?;
        }
        map.end()
    }
}

/// Grouping → entity key → metric kind → series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateView {
    tables: [EntityTable; 3],
}

impl AggregateView {
    #[must_use]
    pub fn group(&self, grouping: EntityGrouping) -> &EntityTable {
        &self.tables[grouping.index()]
    }

    #[must_use]
    pub fn series(&self, grouping: EntityGrouping, key: &str, kind: MetricKind) -> Option<&Series> {
        self.group(grouping).get(key)?.get(kind)
    }

    /// Whether any grouping holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.tables.iter().any(|table| table.get(key).is_some())
    }

    /// Metric kinds present anywhere in `grouping`, in [`MetricKind::ALL`] order.
    #[must_use]
    pub fn kinds_in(&self, grouping: EntityGrouping) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|kind| {
                self.group(grouping)
                    .iter()
                    .any(|(_, entity)| entity.get(*kind).is_some())
            })
            .collect()
    }

    /// Shared time axis across every series in the view.
    #[must_use]
    pub fn time_bounds(&self) -> Option<(f64, f64)> {
        self.tables
            .iter()
            .flat_map(EntityTable::iter)
            .flat_map(|(_, entity)| entity.iter())
            .filter_map(|(_, series)| series.time_bounds())
            .reduce(|(lo_a, hi_a), (lo_b, hi_b)| (lo_a.min(lo_b), hi_a.max(hi_b)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(EntityTable::is_empty)
    }

    fn table_mut(&mut self, grouping: EntityGrouping) -> &mut EntityTable {
        &mut self.tables[grouping.index()]
    }
}

impl Serialize for AggregateView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for grouping in EntityGrouping::ALL {
            map.serialize_entry(grouping.prefix(), self.group(grouping))?;
        }
        map.end()
    }
}

/// The single process-wide scheduler queue series.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueueSeries(Series);

impl QueueSeries {
    /// Fold a trace of `(timestamp, delta)` changes into absolute queue sizes.
    ///
    /// The running size never drops below zero.
    pub fn from_deltas(deltas: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut series = Series::new();
        let mut size = 0.0_f64;
        for (timestamp, delta) in deltas {
            size = (size + delta).max(0.0);
            series.push(timestamp, size);
        }
        Self(series)
    }

    #[must_use]
    pub const fn series(&self) -> &Series {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub utilization_records: usize,
    pub queue_records: usize,
    pub unclassified_records: usize,
}

/// Everything one ingestion pass produced. Read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub view: AggregateView,
    pub queue: QueueSeries,
    pub stats: AggregateStats,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    aggregate: Aggregate,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one utilization record. Returns the grouping it landed in, if any.
    pub fn push_utilization(&mut self, record: &UtilizationRecord) -> Option<EntityGrouping> {
        let stats = &mut self.aggregate.stats;
        stats.utilization_records += 1;
        let Some(grouping) = classify_key(&record.entity_key) else {
            stats.unclassified_records += 1;
            tracing::trace!(
                event = "ingest.unclassified",
                entity_key = %record.entity_key,
                "Skipping record with unclassified entity key"
            );
            return None;
        };
        self.aggregate
            .view
            .table_mut(grouping)
            .entry(&record.entity_key)
            .by_kind
            .entry(record.metric_kind)
            .or_default()
            .push(record.timestamp, record.value);
        Some(grouping)
    }

    pub fn push_queue(&mut self, record: QueueRecord) {
        self.aggregate.stats.queue_records += 1;
        self.aggregate.queue.0.push(record.timestamp, record.queue_size);
    }

    #[must_use]
    pub fn finish(self) -> Aggregate {
        self.aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rec(ts: f64, key: &str, kind: MetricKind, value: f64) -> UtilizationRecord {
        UtilizationRecord::new(ts, key, kind, value).expect("record")
    }

    #[test]
    fn appends_into_nested_containers() {
        let mut agg = Aggregator::new();
        agg.push_utilization(&rec(0.0, "host-1", MetricKind::Cpu, 10.5));
        agg.push_utilization(&rec(0.0, "host-1", MetricKind::Memory, 200.0));
        agg.push_utilization(&rec(1.0, "host-1", MetricKind::Cpu, 12.0));
        let aggregate = agg.finish();

        let cpu = aggregate
            .view
            .series(EntityGrouping::Host, "host-1", MetricKind::Cpu)
            .expect("cpu");
        assert_eq!(cpu.points(), &[(0.0, 10.5), (1.0, 12.0)]);
        let mem = aggregate
            .view
            .series(EntityGrouping::Host, "host-1", MetricKind::Memory)
            .expect("mem");
        assert_eq!(mem.points(), &[(0.0, 200.0)]);
        assert_eq!(aggregate.stats.utilization_records, 3);
    }

    #[test]
    fn keys_keep_encounter_order() {
        let mut agg = Aggregator::new();
        for key in ["host-9", "host-2", "host-10", "host-2", "host-1"] {
            agg.push_utilization(&rec(0.0, key, MetricKind::Cpu, 1.0));
        }
        let aggregate = agg.finish();
        let keys: Vec<_> = aggregate.view.group(EntityGrouping::Host).keys().collect();
        assert_eq!(keys, ["host-9", "host-2", "host-10", "host-1"]);
    }

    #[test]
    fn duplicate_and_decreasing_timestamps_are_preserved() {
        let mut agg = Aggregator::new();
        agg.push_utilization(&rec(5.0, "TOTAL", MetricKind::Cpu, 0.1));
        agg.push_utilization(&rec(5.0, "TOTAL", MetricKind::Cpu, 0.2));
        agg.push_utilization(&rec(4.0, "TOTAL", MetricKind::Cpu, 0.3));
        let aggregate = agg.finish();
        let series = aggregate
            .view
            .series(EntityGrouping::Total, "TOTAL", MetricKind::Cpu)
            .expect("series");
        assert_eq!(series.points(), &[(5.0, 0.1), (5.0, 0.2), (4.0, 0.3)]);
        assert_eq!(series.time_bounds(), Some((4.0, 5.0)));
    }

    #[test]
    fn unclassified_keys_are_counted_not_stored() {
        let mut agg = Aggregator::new();
        assert_eq!(
            agg.push_utilization(&rec(0.0, "machine-1", MetricKind::Cpu, 1.0)),
            None
        );
        assert_eq!(
            agg.push_utilization(&rec(0.0, "group-a", MetricKind::Cpu, 1.0)),
            Some(EntityGrouping::Group)
        );
        let aggregate = agg.finish();
        assert!(!aggregate.view.contains_key("machine-1"));
        assert!(aggregate.view.contains_key("group-a"));
        assert_eq!(aggregate.stats.unclassified_records, 1);
    }

    #[test]
    fn queue_records_go_to_flat_series() {
        let mut agg = Aggregator::new();
        for (t, size) in [(0.0, 5.0), (1.0, 7.0), (2.0, 3.0)] {
            agg.push_queue(QueueRecord::new(t, size).expect("queue"));
        }
        let aggregate = agg.finish();
        assert_eq!(
            aggregate.queue.series().points(),
            &[(0.0, 5.0), (1.0, 7.0), (2.0, 3.0)]
        );
        assert!(aggregate.view.is_empty());
    }

    #[test]
    fn queue_deltas_fold_into_sizes() {
        let queue = QueueSeries::from_deltas([(0.0, 1.0), (0.5, 1.0), (1.0, -1.0), (2.0, -3.0)]);
        assert_eq!(
            queue.series().points(),
            &[(0.0, 1.0), (0.5, 2.0), (1.0, 1.0), (2.0, 0.0)]
        );
    }

    #[test]
    fn summary_and_shared_time_axis() {
        let mut agg = Aggregator::new();
        agg.push_utilization(&rec(1.0, "host-1", MetricKind::Cpu, 2.0));
        agg.push_utilization(&rec(3.0, "host-1", MetricKind::Cpu, 4.0));
        agg.push_utilization(&rec(0.5, "group-x", MetricKind::Memory, 9.0));
        let aggregate = agg.finish();
        let summary = aggregate
            .view
            .series(EntityGrouping::Host, "host-1", MetricKind::Cpu)
            .and_then(Series::summary)
            .expect("summary");
        assert_eq!(summary.count, 2);
        assert!((summary.mean - 3.0).abs() < f64::EPSILON);
        assert_eq!(aggregate.view.time_bounds(), Some((0.5, 3.0)));
        assert_eq!(aggregate.view.kinds_in(EntityGrouping::Host), [MetricKind::Cpu]);
        assert_eq!(
            aggregate.view.kinds_in(EntityGrouping::Group),
            [MetricKind::Memory]
        );
        assert!(aggregate.view.kinds_in(EntityGrouping::Total).is_empty());
        assert!(Series::new().summary().is_none());
    }

    #[test]
    fn summary_timestamps_follow_arrival_order() {
        let mut agg = Aggregator::new();
        agg.push_utilization(&rec(5.0, "host-1", MetricKind::Cpu, 1.0));
        agg.push_utilization(&rec(4.0, "host-1", MetricKind::Cpu, 3.0));
        let aggregate = agg.finish();
        let series = aggregate
            .view
            .series(EntityGrouping::Host, "host-1", MetricKind::Cpu)
            .expect("series");
        let summary = series.summary().expect("summary");
        assert_eq!((summary.first_timestamp, summary.last_timestamp), (5.0, 4.0));
        assert_eq!(series.time_bounds(), Some((4.0, 5.0)));
        assert_eq!((summary.min, summary.max), (1.0, 3.0));
    }

    #[test]
    fn serialized_view_follows_encounter_order() {
        let mut agg = Aggregator::new();
        agg.push_utilization(&rec(0.0, "host-b", MetricKind::Cpu, 1.0));
        agg.push_utilization(&rec(0.0, "host-a", MetricKind::Cpu, 2.0));
        let aggregate = agg.finish();
        let json = serde_json::to_string(&aggregate.view).expect("json");
        assert_eq!(
            json,
            r#"{"host":{"host-b":{"cpu":[[0.0,1.0]]},"host-a":{"cpu":[[0.0,2.0]]}},"group":{},"TOTAL":{}}"#
        );
    }
}
