//! Error types for Vantage operations

use crate::FlagSummary;
use thiserror::Error;

/// Most dependents listed by name in a validation message.
pub const MAX_LISTED_FLAGS: usize = 5;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{backend} backend error: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Deserialization failed: {reason}")]
    Deserialization { reason: String },

    #[error("Cache write failed on both backends ({primary}; {secondary})")]
    DualWriteFailed { primary: String, secondary: String },

    #[error("Entity not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },
}

impl StorageError {
    /// Wrap a backend transport error, tagging it with the backend name.
    pub fn backend(backend: impl Into<String>, reason: impl ToString) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }
}

/// Validation errors for state-changing writes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "Cannot disable or delete flag '{flag_key}' because other active flags depend on it: {}",
        format_flag_list(.dependents)
    )]
    ActiveDependents {
        flag_key: String,
        dependents: Vec<FlagSummary>,
    },

    #[error(
        "Cannot enable flag '{flag_key}' because it depends on disabled flags: {}",
        format_flag_list(.dependencies)
    )]
    DisabledDependencies {
        flag_key: String,
        dependencies: Vec<FlagSummary>,
    },

    #[error("Flag '{flag_key}' depends on flag '{reference}', which does not exist in this team")]
    MissingDependency { flag_key: String, reference: String },

    #[error("Circular flag dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Render flags as `"{key} (ID: {id})"`, comma-joined, listing at most
/// [`MAX_LISTED_FLAGS`] and summarising the remainder as `"and N more"`.
pub fn format_flag_list(flags: &[FlagSummary]) -> String {
    let listed = flags
        .iter()
        .take(MAX_LISTED_FLAGS)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let remaining = flags.len().saturating_sub(MAX_LISTED_FLAGS);
    if remaining > 0 {
        format!("{} and {} more", listed, remaining)
    } else {
        listed
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Vantage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VantageError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VantageError {
    /// HTTP status an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            VantageError::Validation(_) => 400,
            VantageError::Storage(StorageError::NotFound { .. }) => 404,
            VantageError::Storage(StorageError::Backend { .. })
            | VantageError::Storage(StorageError::DualWriteFailed { .. }) => 503,
            VantageError::Storage(_) | VantageError::Config(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Result type alias for Vantage operations.
pub type VantageResult<T> = Result<T, VantageError>;

// =============================================================================
// TESTS
// =============================================================================
