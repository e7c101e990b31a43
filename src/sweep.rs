//! Parameter sweeps over an external benchmark executable.
//!
//! Each sweep point spawns the executable once, blocks until it exits, and
//! pulls the elapsed time out of its stdout. Points run strictly one after
//! another with no timeout and no retry. The first failed point aborts the
//! variant; points collected before it are returned untouched inside
//! [`SweepFailure`].

use crate::error::{Error, Result};
use crate::record::ParameterPoint;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

pub const SWEEP_RESULTS_SCHEMA: &str = "simtrace.sweep_results.v1";

/// Half-open integer range `[start, stop)` walked in `step` increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepRange {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl SweepRange {
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self> {
        let range = Self { start, stop, step };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step <= 0 {
            return Err(Error::config(format!(
                "sweep step must be positive, got {}",
                self.step
            )));
        }
        if self.start >= self.stop {
            return Err(Error::config(format!(
                "sweep range is empty: start {} is not below stop {}",
                self.start, self.stop
            )));
        }
        Ok(())
    }

    /// The swept values, strictly increasing.
    pub fn values(&self) -> impl Iterator<Item = i64> + use<> {
        let Self { start, stop, step } = *self;
        std::iter::successors(Some(start), move |v| v.checked_add(step))
            .take_while(move |v| *v < stop)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SweepRange {
    fn default() -> Self {
        Self {
            start: 100,
            stop: 4100,
            step: 100,
        }
    }
}

/// How to launch one variant of the benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Curve label in the comparison plot.
    pub label: String,
    pub program: String,
    /// Leading arguments that identify the executable, e.g. `run --release --`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Flags passed unchanged to every run. An empty value is a bare switch.
    #[serde(default)]
    pub fixed_args: BTreeMap<String, String>,
    pub swept_flag: String,
}

impl VariantSpec {
    /// Arguments for a single run with `value` substituted for the swept flag.
    #[must_use]
    pub fn argv(&self, value: i64) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push(self.swept_flag.clone());
        argv.push(value.to_string());
        for (flag, flag_value) in &self.fixed_args {
            argv.push(flag.clone());
            if !flag_value.is_empty() {
                argv.push(flag_value.clone());
            }
        }
        argv
    }

    /// Executable identity without the per-run arguments.
    #[must_use]
    pub fn identity(&self) -> String {
        join_command(&self.program, &self.args)
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::config("variant label must not be empty"));
        }
        if self.program.trim().is_empty() {
            return Err(Error::config(format!(
                "variant {} has no program",
                self.label
            )));
        }
        if self.swept_flag.trim().is_empty() {
            return Err(Error::config(format!(
                "variant {} has no swept flag",
                self.label
            )));
        }
        if self.fixed_args.contains_key(&self.swept_flag) {
            return Err(Error::config(format!(
                "variant {} sets swept flag {} as a fixed argument",
                self.label, self.swept_flag
            )));
        }
        Ok(())
    }
}

/// Several variants swept over the same range so their curves line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPlan {
    #[serde(default)]
    pub range: SweepRange,
    pub variants: Vec<VariantSpec>,
}

impl SweepPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&text)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        self.range.validate()?;
        if self.variants.is_empty() {
            return Err(Error::config("sweep plan has no variants"));
        }
        let mut seen = std::collections::HashSet::new();
        for variant in &self.variants {
            variant.validate()?;
            if !seen.insert(variant.label.as_str()) {
                return Err(Error::config(format!(
                    "duplicate variant label {}",
                    variant.label
                )));
            }
        }
        Ok(())
    }

    /// The async vs. callback ping-pong comparison the simulator ships with.
    #[must_use]
    pub fn ping_pong_default() -> Self {
        let fixed_args: BTreeMap<String, String> = [
            ("--peer-count", "100"),
            ("--proc-count", "10000"),
            ("--use-network", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let variant = |label: &str, args: &[&str]| VariantSpec {
            label: label.to_string(),
            program: "cargo".to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            fixed_args: fixed_args.clone(),
            swept_flag: "--iterations".to_string(),
        };
        Self {
            range: SweepRange::default(),
            variants: vec![
                variant("async-ping-pong", &["run", "--release", "--"]),
                variant(
                    "ping-pong",
                    &["run", "--package", "ping-pong", "--release", "--"],
                ),
            ],
        }
    }
}

/// Runs a command to completion and returns its stdout.
///
/// Implementations must fail with [`Error::ExternalProcess`] when the process
/// cannot be spawned or exits nonzero.
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl ProcessRunner for CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let command_line = join_command(program, args);
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                Error::external_process(&command_line, None, "", format!("failed to spawn: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            if !stderr.trim().is_empty() {
                let _ = write!(captured, "\nstderr:\n{stderr}");
            }
            return Err(Error::external_process(
                command_line,
                Some(output.status),
                captured,
                "process exited unsuccessfully",
            ));
        }
        String::from_utf8(output.stdout).map_err(|e| {
            let lossy = String::from_utf8_lossy(e.as_bytes()).into_owned();
            Error::external_process(command_line, Some(output.status), lossy, "stdout is not valid UTF-8")
        })
    }
}

static ELAPSED_REGEX: OnceLock<Regex> = OnceLock::new();

fn elapsed_regex() -> &'static Regex {
    ELAPSED_REGEX.get_or_init(|| {
        Regex::new(r"Processed \d+ iterations in (\d+(?:\.\d+)?)s").expect("elapsed regex")
    })
}

/// Pull the elapsed seconds out of a `Processed <n> iterations in <secs>s` line.
#[must_use]
pub fn extract_elapsed_seconds(output: &str) -> Option<f64> {
    elapsed_regex()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One variant's measured curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSeries {
    pub label: String,
    pub command: String,
    pub points: Vec<ParameterPoint>,
}

/// A variant sweep that stopped at its first failing point.
#[derive(Debug, thiserror::Error)]
#[error("sweep of variant {variant_label} aborted after {} points: {error}", .completed.len())]
pub struct SweepFailure {
    pub variant_label: String,
    pub completed: Vec<ParameterPoint>,
    #[source]
    pub error: Error,
}

/// Output of a whole plan. `failure` is set when a variant aborted; every
/// variant that finished before it is still in `results`.
#[derive(Debug)]
pub struct PlanOutcome {
    pub results: SweepResults,
    pub failure: Option<SweepFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    pub schema: String,
    pub generated_at: String,
    pub range: SweepRange,
    pub variants: Vec<VariantSeries>,
}

impl SweepResults {
    #[must_use]
    pub fn new(range: SweepRange) -> Self {
        Self {
            schema: SWEEP_RESULTS_SCHEMA.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            range,
            variants: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let results: Self = serde_json::from_str(&text)?;
        if results.schema != SWEEP_RESULTS_SCHEMA {
            return Err(Error::validation(format!(
                "unsupported sweep results schema {:?} in {}",
                results.schema,
                path.display()
            )));
        }
        Ok(results)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SweepRunner<R> {
    runner: R,
}

impl<R: ProcessRunner> SweepRunner<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run one point: spawn once, extract once.
    pub fn run_point(&self, variant: &VariantSpec, value: i64) -> Result<ParameterPoint> {
        let argv = variant.argv(value);
        let output = self.runner.run(&variant.program, &argv)?;
        let Some(metric_value) = extract_elapsed_seconds(&output) else {
            return Err(Error::external_process(
                join_command(&variant.program, &argv),
                None,
                output,
                "output does not contain `Processed <n> iterations in <secs>s`",
            ));
        };
        Ok(ParameterPoint {
            parameter_value: value,
            metric_value,
            variant_label: variant.label.clone(),
        })
    }

    pub fn run_variant(
        &self,
        variant: &VariantSpec,
        range: SweepRange,
    ) -> std::result::Result<VariantSeries, SweepFailure> {
        let fail = |completed: Vec<ParameterPoint>, error: Error| SweepFailure {
            variant_label: variant.label.clone(),
            completed,
            error,
        };
        if let Err(error) = range.validate().and_then(|()| variant.validate()) {
            return Err(fail(Vec::new(), error));
        }

        tracing::info!(
            event = "sweep.variant.start",
            variant = %variant.label,
            command = %variant.identity(),
            points = range.len(),
            "Starting sweep"
        );
        let mut points = Vec::with_capacity(range.len());
        for value in range.values() {
            match self.run_point(variant, value) {
                Ok(point) => {
                    tracing::info!(
                        event = "sweep.point",
                        variant = %variant.label,
                        parameter = value,
                        elapsed_s = point.metric_value,
                        "Measured sweep point"
                    );
                    points.push(point);
                }
                Err(error) => {
                    tracing::error!(
                        event = "sweep.point.failed",
                        variant = %variant.label,
                        parameter = value,
                        completed = points.len(),
                        "Sweep aborted: {error}"
                    );
                    return Err(fail(points, error));
                }
            }
        }
        Ok(VariantSeries {
            label: variant.label.clone(),
            command: variant.identity(),
            points,
        })
    }

    /// Sweep every variant in order over the plan's shared range.
    ///
    /// Stops at the first failure. Points the failing variant already measured
    /// stay in `results`, so they are saved and plotted with the rest.
    pub fn run_plan(&self, plan: &SweepPlan) -> PlanOutcome {
        let mut results = SweepResults::new(plan.range);
        if let Err(error) = plan.validate() {
            let failure = SweepFailure {
                variant_label: String::new(),
                completed: Vec::new(),
                error,
            };
            return PlanOutcome {
                results,
                failure: Some(failure),
            };
        }
        for variant in &plan.variants {
            match self.run_variant(variant, plan.range) {
                Ok(series) => results.variants.push(series),
                Err(failure) => {
                    if !failure.completed.is_empty() {
                        results.variants.push(VariantSeries {
                            label: variant.label.clone(),
                            command: variant.identity(),
                            points: failure.completed.clone(),
                        });
                    }
                    return PlanOutcome {
                        results,
                        failure: Some(failure),
                    };
                }
            }
        }
        PlanOutcome {
            results,
            failure: None,
        }
    }
}

fn join_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
