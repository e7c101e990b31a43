//! Tool settings.
//!
//! Settings live in a JSON file at `$SIMTRACE_CONFIG_PATH`, or
//! `<config dir>/simtrace/settings.json` when the variable is unset. A missing
//! file means defaults; an unreadable or invalid one is an error. Command-line
//! flags override anything set here.

use crate::error::{Error, Result};
use crate::lifetime::{DEFAULT_HORIZON, validate_horizon};
use crate::sweep::SweepRange;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "SIMTRACE_CONFIG_PATH";
pub const LOG_FILTER_ENV: &str = "SIMTRACE_LOG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Where artifacts go when `--out` is not given.
    pub output_dir: Option<PathBuf>,
    /// Range used by the built-in sweep plan when no plan file is given.
    pub sweep_range: Option<SweepRange>,
    /// Cap for machines still running at the end of a trace.
    pub lifetime_horizon: Option<f64>,
    /// Default `tracing` filter directive, e.g. `info` or `simtrace=debug`.
    pub log_filter: Option<String>,
}

impl Config {
    #[must_use]
    pub fn global_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("simtrace")
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV).map_or_else(
            || Self::global_dir().join("settings.json"),
            PathBuf::from,
        )
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(event = "config.missing", path = %path.display(), "Using default settings");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            Error::config(format!("invalid settings in {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(range) = &self.sweep_range {
            range.validate()?;
        }
        if let Some(horizon) = self.lifetime_horizon {
            validate_horizon(horizon)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("simtrace-out"))
    }

    #[must_use]
    pub fn sweep_range(&self) -> SweepRange {
        self.sweep_range.unwrap_or_default()
    }

    #[must_use]
    pub fn lifetime_horizon(&self) -> f64 {
        self.lifetime_horizon.unwrap_or(DEFAULT_HORIZON)
    }

    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or("info")
    }
}
