//! Error types for yieldkf-io.

use std::path::PathBuf;

use yieldkf_curve::CurveError;
use yieldkf_ssm::SsmError;

/// Error type for all fallible operations in the yieldkf-io crate.
///
/// This enum covers filesystem failures, format-specific errors from
/// Parquet/Arrow and JSON, schema validation problems, and errors from the
/// curve and state-space crates when file contents do not form a valid
/// panel or model.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when a required file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path that could not be found.
        path: PathBuf,
    },

    /// Returned when a file cannot be created, opened or written.
    #[error("i/o error on {}: {reason}", path.display())]
    Filesystem {
        /// Path being accessed.
        path: PathBuf,
        /// Description of the underlying failure.
        reason: String,
    },

    /// Wraps an error originating from the Parquet or Arrow libraries.
    #[error("parquet error: {reason}")]
    Parquet {
        /// Description of the underlying Parquet failure.
        reason: String,
    },

    /// Wraps a JSON serialisation or parsing failure.
    #[error("json error: {reason}")]
    Json {
        /// Description of the underlying JSON failure.
        reason: String,
    },

    /// Returned when one or more validation checks fail.
    #[error("{count} validation error(s): {details}")]
    Validation {
        /// Number of accumulated validation failures.
        count: usize,
        /// Human-readable summary of the failures.
        details: String,
    },

    /// Returned when a stored date cannot be represented.
    #[error("invalid date: {reason}")]
    InvalidDate {
        /// Description of the date issue.
        reason: String,
    },

    /// Curve data-model error.
    #[error(transparent)]
    Curve(#[from] CurveError),

    /// State-space model error.
    #[error(transparent)]
    Ssm(#[from] SsmError),
}

impl IoError {
    pub(crate) fn validation(details: impl Into<String>) -> Self {
        IoError::Validation {
            count: 1,
            details: details.into(),
        }
    }

    pub(crate) fn filesystem(path: &std::path::Path, e: std::io::Error) -> Self {
        IoError::Filesystem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

impl From<parquet::errors::ParquetError> for IoError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        IoError::Parquet {
            reason: e.to_string(),
        }
    }
}

impl From<arrow::error::ArrowError> for IoError {
    fn from(e: arrow::error::ArrowError) -> Self {
        IoError::Parquet {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        IoError::Json {
            reason: e.to_string(),
        }
    }
}
