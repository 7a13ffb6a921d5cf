//! CLI error type.

use std::path::Path;
use thiserror::Error;
use vantage_core::VantageError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Vantage(#[from] VantageError),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid JSON in {path}: {reason}")]
    Json { path: String, reason: String },

    #[error("Failed to write output: {0}")]
    Output(String),

    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
}

impl CliError {
    pub fn io(path: &Path, e: impl ToString) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    pub fn json(path: &Path, e: impl ToString) -> Self {
        Self::Json {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Process exit code: 2 for rejected input, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Vantage(e) if e.is_client_error() => 2,
            CliError::Json { .. } => 2,
            _ => 1,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
