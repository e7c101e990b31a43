//! `simtrace` CLI.
//!
//! ```text
//! simtrace sweep --plan plan.json --out results/
//! simtrace ingest --trace load.txt --queue queue.txt --lifetimes machines.txt --out results/
//! simtrace render --sweep-results results/sweep_results.json --out results/
//! ```
#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use simtrace::config::{Config, LOG_FILTER_ENV};
use simtrace::ingest::ingest_files;
use simtrace::lifetime::{load_lifetimes, validate_horizon};
use simtrace::render::{self, JsonPlotWriter, Renderer};
use simtrace::sweep::{CommandRunner, SweepPlan, SweepRange, SweepResults, SweepRunner};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "simtrace")]
#[command(about = "Sweep simulation benchmarks and aggregate resource/queue traces", long_about = None)]
struct Args {
    /// Settings file (defaults to $SIMTRACE_CONFIG_PATH or the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of SIMTRACE_LOG.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every variant of a sweep plan and plot the comparison.
    Sweep {
        /// JSON sweep plan. Without it the built-in ping-pong comparison runs.
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Override the plan's range start.
        #[arg(long, requires_all = ["stop", "step"])]
        start: Option<i64>,

        /// Override the plan's range end (exclusive).
        #[arg(long, requires_all = ["start", "step"])]
        stop: Option<i64>,

        /// Override the plan's range step.
        #[arg(long, requires_all = ["start", "stop"])]
        step: Option<i64>,

        /// Output directory for results and plots.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Aggregate utilization, queue and lifetime traces into plots.
    Ingest {
        /// Utilization trace (long or wide form; queue lines are accepted too).
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Scheduler queue trace: `timestamp queue_size` per line.
        #[arg(long)]
        queue: Option<PathBuf>,

        /// Treat the queue trace as `timestamp delta` changes.
        #[arg(long, requires = "queue")]
        queue_deltas: bool,

        /// Machine lifetime CSV with an `id,start,end` header.
        #[arg(long)]
        lifetimes: Option<PathBuf>,

        /// End time drawn for machines that never stopped.
        #[arg(long)]
        horizon: Option<f64>,

        /// Output directory for plots and summary.json.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Re-plot saved sweep results without re-running the sweep.
    Render {
        #[arg(long)]
        sweep_results: PathBuf,

        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading settings")?;
    init_tracing(&config, args.verbose);

    match args.command {
        Commands::Sweep {
            plan,
            start,
            stop,
            step,
            out,
        } => {
            let out = out.unwrap_or_else(|| config.output_dir());
            run_sweep(&config, plan.as_deref(), start.zip(stop).zip(step), &out)
        }
        Commands::Ingest {
            trace,
            queue,
            queue_deltas,
            lifetimes,
            horizon,
            out,
        } => {
            if trace.is_none() && queue.is_none() && lifetimes.is_none() {
                bail!("nothing to ingest: pass --trace, --queue and/or --lifetimes");
            }
            let out = out.unwrap_or_else(|| config.output_dir());
            let horizon = horizon.unwrap_or_else(|| config.lifetime_horizon());
            validate_horizon(horizon).context("invalid --horizon")?;
            run_ingest(
                trace.as_deref(),
                queue.as_deref(),
                queue_deltas,
                lifetimes.as_deref(),
                horizon,
                &out,
            )
        }
        Commands::Render { sweep_results, out } => {
            let out = out.unwrap_or_else(|| config.output_dir());
            let results = SweepResults::load(&sweep_results)
                .with_context(|| format!("reading sweep results from {}", sweep_results.display()))?;
            let path = JsonPlotWriter::new(&out)?.render(&render::sweep_plot(&results))?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn init_tracing(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(config.log_filter()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_sweep(
    config: &Config,
    plan_path: Option<&Path>,
    range_override: Option<((i64, i64), i64)>,
    out: &Path,
) -> Result<()> {
    let mut plan = match plan_path {
        Some(path) => SweepPlan::load(path)
            .with_context(|| format!("loading sweep plan from {}", path.display()))?,
        None => {
            let mut plan = SweepPlan::ping_pong_default();
            plan.range = config.sweep_range();
            plan
        }
    };
    if let Some(((start, stop), step)) = range_override {
        plan.range = SweepRange::new(start, stop, step)?;
    }

    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let outcome = SweepRunner::new(CommandRunner).run_plan(&plan);

    let results_path = out.join("sweep_results.json");
    outcome
        .results
        .save(&results_path)
        .with_context(|| format!("writing {}", results_path.display()))?;
    let plot_path = JsonPlotWriter::new(out)?.render(&render::sweep_plot(&outcome.results))?;
    println!("{}", results_path.display());
    println!("{}", plot_path.display());

    if let Some(failure) = outcome.failure {
        return Err(failure).context("sweep aborted");
    }
    Ok(())
}

fn run_ingest(
    trace: Option<&Path>,
    queue: Option<&Path>,
    queue_deltas: bool,
    lifetimes: Option<&Path>,
    horizon: f64,
    out: &Path,
) -> Result<()> {
    let ingestion = ingest_files(trace, queue, queue_deltas).with_context(|| {
        let inputs: Vec<String> = trace
            .into_iter()
            .chain(queue)
            .map(|path| path.display().to_string())
            .collect();
        format!("ingesting {}", inputs.join(", "))
    })?;

    let mut summary = ingestion.summary();
    let mut writer = JsonPlotWriter::new(out)?;
    let mut plots = render::grouping_plots(&ingestion.aggregate.view);
    plots.push(render::queue_plot(&ingestion.aggregate.queue));
    if let Some(path) = lifetimes {
        let table = load_lifetimes(path)
            .with_context(|| format!("reading machine lifetimes {}", path.display()))?;
        plots.push(render::lifetime_plot(&table, horizon));
        summary.report.sources.push(path.display().to_string());
        summary.report.malformed.extend(table.malformed);
    }
    for path in writer.render_all(&plots)? {
        println!("{}", path.display());
    }

    let summary_path = out.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;
    println!("{}", summary_path.display());

    let malformed = summary.report.malformed.len();
    if malformed > 0 {
        eprintln!(
            "Skipped {malformed} malformed line(s); see {}",
            summary_path.display()
        );
    }
    Ok(())
}
