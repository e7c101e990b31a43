//! Plot documents and the renderer seam.
//!
//! The core never draws pixels. It turns the aggregate, the queue series, sweep
//! results and lifetime tables into [`PlotDocument`]s; a [`Renderer`] decides
//! what to do with them. [`JsonPlotWriter`] writes each document as
//! `<file_stem>.json` so an external plotting backend can rasterize it.

use crate::aggregate::{AggregateView, QueueSeries};
use crate::classify::EntityGrouping;
use crate::error::Result;
use crate::lifetime::LifetimeTable;
use crate::record::MetricKind;
use crate::sweep::SweepResults;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const PLOT_SCHEMA: &str = "simtrace.plot.v1";
pub const QUEUE_PLOT_STEM: &str = "queue_size";
pub const SWEEP_PLOT_STEM: &str = "sweep_comparison";
pub const LIFETIME_PLOT_STEM: &str = "machine_lifetimes";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curve {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotDocument {
    pub schema: String,
    pub file_stem: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Shared x range; `None` lets the backend autoscale.
    pub x_range: Option<(f64, f64)>,
    pub curves: Vec<Curve>,
}

impl PlotDocument {
    fn new(file_stem: impl Into<String>, title: impl Into<String>, x: &str, y: &str) -> Self {
        Self {
            schema: PLOT_SCHEMA.to_string(),
            file_stem: file_stem.into(),
            title: title.into(),
            x_label: x.to_string(),
            y_label: y.to_string(),
            x_range: None,
            curves: Vec::new(),
        }
    }
}

/// Consumer of finished plot documents.
pub trait Renderer {
    /// Render one document, returning the artifact path.
    fn render(&mut self, plot: &PlotDocument) -> Result<PathBuf>;

    fn render_all(&mut self, plots: &[PlotDocument]) -> Result<Vec<PathBuf>> {
        plots.iter().map(|plot| self.render(plot)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct JsonPlotWriter {
    out_dir: PathBuf,
}

impl JsonPlotWriter {
    pub fn new(out_dir: &Path) -> Result<Self> {
        fs::create_dir_all(out_dir)?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
        })
    }
}

impl Renderer for JsonPlotWriter {
    fn render(&mut self, plot: &PlotDocument) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("{}.json", plot.file_stem));
        fs::write(&path, serde_json::to_string_pretty(plot)?)?;
        tracing::debug!(event = "render.write", path = %path.display(), curves = plot.curves.len());
        Ok(path)
    }
}

/// File stem for a grouping/metric artifact, e.g. `host_cpu` or `TOTAL_memory`.
#[must_use]
pub fn grouping_plot_stem(grouping: EntityGrouping, kind: MetricKind) -> String {
    format!("{}_{}", grouping.prefix(), kind.as_str())
}

/// One document per (grouping, metric kind) present in the view, one curve per
/// entity key in encounter order. All documents share the view's time axis.
#[must_use]
pub fn grouping_plots(view: &AggregateView) -> Vec<PlotDocument> {
    let x_range = view.time_bounds();
    let mut plots = Vec::new();
    for grouping in EntityGrouping::ALL {
        for kind in view.kinds_in(grouping) {
            let mut plot = PlotDocument::new(
                grouping_plot_stem(grouping, kind),
                format!("{grouping} {kind} load"),
                "Time",
                "Load",
            );
            plot.x_range = x_range;
            plot.curves = view
                .group(grouping)
                .iter()
                .filter_map(|(key, entity)| {
                    entity.get(kind).map(|series| Curve {
                        label: key.to_string(),
                        points: series.points().to_vec(),
                    })
                })
                .collect();
            plots.push(plot);
        }
    }
    plots
}

/// The queue plot is always produced, empty or not.
#[must_use]
pub fn queue_plot(queue: &QueueSeries) -> PlotDocument {
    let mut plot =
        PlotDocument::new(QUEUE_PLOT_STEM, "Scheduler queue size", "Time", "Queue size");
    plot.x_range = queue.series().time_bounds();
    plot.curves.push(Curve {
        label: "queue".to_string(),
        points: queue.series().points().to_vec(),
    });
    plot
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sweep_plot(results: &SweepResults) -> PlotDocument {
    let mut plot = PlotDocument::new(
        SWEEP_PLOT_STEM,
        "Sweep comparison",
        "Iterations count",
        "Elapsed time (s)",
    );
    plot.curves = results
        .variants
        .iter()
        .map(|variant| Curve {
            label: variant.label.clone(),
            points: variant
                .points
                .iter()
                .map(|p| (p.parameter_value as f64, p.metric_value))
                .collect(),
        })
        .collect();
    plot
}

/// One horizontal segment per machine, stacked by start order.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn lifetime_plot(table: &LifetimeTable, horizon: f64) -> PlotDocument {
    let mut plot = PlotDocument::new(LIFETIME_PLOT_STEM, "Machine lifetimes", "Time", "Machine");
    plot.curves = table
        .lifetimes
        .iter()
        .enumerate()
        .map(|(row, machine)| {
            let (start, end) = machine.segment(horizon);
            let y = row as f64 + 0.1;
            Curve {
                label: machine.id.clone(),
                points: vec![(start, y), (end, y)],
            }
        })
        .collect();
    plot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregator;
    use crate::lifetime::MachineLifetime;
    use crate::record::{ParameterPoint, QueueRecord, UtilizationRecord};
    use crate::sweep::{SweepRange, VariantSeries};

    fn view() -> AggregateView {
        let mut agg = Aggregator::new();
        for (ts, key, kind, value) in [
            (0.0, "host-b", MetricKind::Cpu, 1.0),
            (0.0, "host-a", MetricKind::Cpu, 2.0),
            (2.0, "host-a", MetricKind::Memory, 3.0),
            (4.0, "TOTAL", MetricKind::Cpu, 0.5),
        ] {
            agg.push_utilization(&UtilizationRecord::new(ts, key, kind, value).expect("rec"));
        }
        agg.finish().view
    }

    #[test]
    fn one_plot_per_grouping_and_metric_present() {
        let plots = grouping_plots(&view());
        let stems: Vec<_> = plots.iter().map(|p| p.file_stem.as_str()).collect();
        assert_eq!(stems, ["host_cpu", "host_memory", "TOTAL_cpu"]);
        let labels: Vec<_> = plots[0].curves.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["host-b", "host-a"]);
        assert!(plots.iter().all(|p| p.x_range == Some((0.0, 4.0))));
    }

    #[test]
    fn empty_queue_still_renders() {
        let plot = queue_plot(&QueueSeries::default());
        assert_eq!(plot.file_stem, "queue_size");
        assert_eq!(plot.curves.len(), 1);
        assert!(plot.curves[0].points.is_empty());

        let mut agg = Aggregator::new();
        agg.push_queue(QueueRecord::new(1.0, 2.0).expect("queue"));
        let plot = queue_plot(&agg.finish().queue);
        assert_eq!(plot.curves[0].points, vec![(1.0, 2.0)]);
    }

    #[test]
    fn sweep_plot_has_a_curve_per_variant() {
        let mut results = SweepResults::new(SweepRange::default());
        for label in ["async-ping-pong", "ping-pong"] {
            results.variants.push(VariantSeries {
                label: label.to_string(),
                command: "cargo run".to_string(),
                points: vec![ParameterPoint {
                    parameter_value: 100,
                    metric_value: 0.25,
                    variant_label: label.to_string(),
                }],
            });
        }
        let plot = sweep_plot(&results);
        assert_eq!(plot.curves.len(), 2);
        assert_eq!(plot.curves[1].label, "ping-pong");
        assert_eq!(plot.curves[1].points, vec![(100.0, 0.25)]);
    }

    #[test]
    fn lifetime_segments_are_stacked() {
        let table = LifetimeTable {
            lifetimes: vec![
                MachineLifetime {
                    id: "a".to_string(),
                    start: 0.0,
                    end: Some(3.0),
                },
                MachineLifetime {
                    id: "b".to_string(),
                    start: 1.0,
                    end: None,
                },
            ],
            malformed: Vec::new(),
        };
        let plot = lifetime_plot(&table, 10.0);
        assert_eq!(plot.curves[0].points, vec![(0.0, 0.1), (3.0, 0.1)]);
        assert_eq!(plot.curves[1].points, vec![(1.0, 1.1), (10.0, 1.1)]);
    }

    #[test]
    fn json_writer_names_files_after_stems() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer = JsonPlotWriter::new(&dir.path().join("plots")).expect("writer");
        let paths = writer.render_all(&grouping_plots(&view())).expect("render");
        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("plots/host_cpu.json"));
        let text = std::fs::read_to_string(&paths[2]).expect("read");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["schema"], PLOT_SCHEMA);
        assert_eq!(value["curves"][0]["label"], "TOTAL");
    }
}
