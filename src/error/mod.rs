//! Error handling for dataset construction.
//!
//! "No matching record" is never an error in this crate: matchers resolve
//! to absent values, zero counts or `false`. Errors are reserved for things
//! that make the whole dataset untrustworthy: unreadable or malformed
//! external files, invalid variable definitions and type errors found while
//! evaluating them.

pub mod util;

use std::io;
use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Specialized error type for dataset construction
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Error opening or reading a file
    #[error("IO error: {message} ({})", .path.display())]
    Io {
        /// What went wrong
        message: String,
        /// The file or directory involved
        path: PathBuf,
        /// Underlying error, if any
        #[source]
        source: Option<io::Error>,
    },

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error parsing a delimited file
    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        /// The file being parsed
        path: PathBuf,
        /// Underlying CSV error
        #[source]
        source: csv::Error,
    },

    /// Error parsing JSON configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A codelist file is structurally invalid
    #[error("Codelist error in {}: {message}", .path.display())]
    Codelist {
        /// The codelist file
        path: PathBuf,
        /// What is wrong with it
        message: String,
    },

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// A table does not have the expected columns or types
    #[error("Schema error in table '{table}': {message}")]
    Schema {
        /// The table being read
        table: String,
        /// What is wrong with it
        message: String,
    },

    /// A variable definition is invalid
    #[error("Invalid dataset definition: {0}")]
    Definition(String),

    /// A type error surfaced while evaluating a variable
    #[error("Evaluation error for patient {patient_id}: {message}")]
    Evaluation {
        /// Patient being evaluated
        patient_id: i64,
        /// What went wrong
        message: String,
    },
}

impl DatasetError {
    /// Create an IO error without an underlying source
    pub fn io(message: impl Into<String>, path: &Path) -> Self {
        Self::Io {
            message: message.into(),
            path: path.to_path_buf(),
            source: None,
        }
    }

    /// Create an IO error wrapping an underlying `io::Error`
    pub fn io_with_source(message: impl Into<String>, path: &Path, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            path: path.to_path_buf(),
            source: Some(source),
        }
    }

    /// Create a schema error for a table
    pub fn schema(table: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Error for a required column holding a null value
    #[must_use]
    pub fn missing_value(table: &str, column: &str, row: usize) -> Self {
        Self::schema(
            table,
            format!("required column '{column}' is null or missing at row {row}"),
        )
    }

    /// Create a definition error
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    /// Create an evaluation error for a patient
    pub fn evaluation(patient_id: i64, message: impl Into<String>) -> Self {
        Self::Evaluation {
            patient_id,
            message: message.into(),
        }
    }
}

/// Result type for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;
