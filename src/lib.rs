//! Parameter sweeps and trace aggregation for distributed simulation runs.
//!
//! Two pipelines share this crate:
//!
//! - **Sweeps** ([`sweep`]): run a benchmark executable once per parameter value
//!   and collect the elapsed time it reports.
//! - **Ingestion** ([`ingest`]): parse per-host load traces and scheduler queue
//!   traces ([`parser`]), bucket entity keys into hosts, groups and totals
//!   ([`classify`]), and build one time series per entity and metric
//!   ([`aggregate`]).
//!
//! [`render`] turns both into plot documents for an external plotting backend.
#![forbid(unsafe_code)]

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod lifetime;
pub mod parser;
pub mod record;
pub mod render;
pub mod sweep;

pub use aggregate::{Aggregate, AggregateView, Aggregator, QueueSeries, Series};
pub use classify::{EntityGrouping, classify_key};
pub use error::{Error, Result};
pub use ingest::{Ingestion, Ingestor, ingest_files};
pub use record::{MetricKind, ParameterPoint, QueueRecord, UtilizationRecord};
pub use sweep::{CommandRunner, ProcessRunner, SweepPlan, SweepRange, SweepRunner, VariantSpec};
