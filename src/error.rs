//! Error types for sweeps and trace ingestion.

use std::fmt::Write as _;
use std::process::ExitStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid settings or sweep plan.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value violated a documented constraint.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A trace line that could not be turned into any known record shape.
    #[error("Malformed record at line {line}: {reason} ({content:?})")]
    MalformedRecord {
        line: usize,
        content: String,
        reason: String,
    },

    /// The benchmarked executable failed or printed something unexpected.
    #[error("{}", render_process_failure(command, *status, output, reason))]
    ExternalProcess {
        command: String,
        status: Option<i32>,
        output: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn malformed(line: usize, content: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            content: content.to_string(),
            reason: reason.into(),
        }
    }

    pub fn external_process(
        command: impl Into<String>,
        status: Option<ExitStatus>,
        output: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ExternalProcess {
            command: command.into(),
            status: status.and_then(|s| s.code()),
            output: output.into(),
            reason: reason.into(),
        }
    }

    /// Whether ingestion may skip past this error and keep going.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}

fn render_process_failure(command: &str, status: Option<i32>, output: &str, reason: &str) -> String {
    let mut msg = format!("Command failed: {command}: {reason}");
    if let Some(code) = status {
        let _ = write!(msg, " (exit {code})");
    }
    if !output.trim().is_empty() {
        let _ = write!(msg, "\noutput:\n{output}");
    }
    msg
}
