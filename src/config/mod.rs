//! Configuration for dataset construction.
//!
//! Two pieces of configuration exist: the study boundary dates, which are
//! loaded from a small JSON file and threaded explicitly into every matcher
//! call, and the run configuration that controls how tables are read and how
//! the population is evaluated.

use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::util::safe_read_to_string;
use crate::error::{DatasetError, Result};

/// Study boundary dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDates {
    /// Start of the study period; the index date of baseline variables
    #[serde(alias = "index_date", alias = "pandemic_start")]
    pub study_start: NaiveDate,
    /// End of the study period (inclusive)
    #[serde(alias = "studyend_date", alias = "end_date")]
    pub study_end: NaiveDate,
}

impl Default for StudyDates {
    fn default() -> Self {
        // Start of the pandemic in the UK through the end of follow-up
        Self {
            study_start: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap_or_default(),
            study_end: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap_or_default(),
        }
    }
}

impl StudyDates {
    /// Create study dates, rejecting an inverted period
    pub fn new(study_start: NaiveDate, study_end: NaiveDate) -> Result<Self> {
        let dates = Self {
            study_start,
            study_end,
        };
        dates.validate()?;
        Ok(dates)
    }

    /// Load study dates from a JSON file
    ///
    /// Accepts `{"study_start": "2020-02-01", "study_end": "2024-07-01"}` and
    /// the `index_date`/`studyend_date` spellings.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = safe_read_to_string(path, "study dates configuration")?;
        let dates = Self::from_json_str(&content)?;
        log::info!(
            "Loaded study dates from {}: {} to {}",
            path.display(),
            dates.study_start,
            dates.study_end
        );
        Ok(dates)
    }

    /// Parse study dates from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let dates: Self = serde_json::from_str(content)?;
        dates.validate()?;
        Ok(dates)
    }

    /// Check that the study period is not inverted
    pub fn validate(&self) -> Result<()> {
        if self.study_start > self.study_end {
            return Err(DatasetError::Config(format!(
                "study start {} is after study end {}",
                self.study_start, self.study_end
            )));
        }
        Ok(())
    }
}

impl fmt::Display for StudyDates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.study_start, self.study_end)
    }
}

/// Configuration for loading tables and evaluating a dataset
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Number of rows per record batch when reading Parquet
    pub batch_size: usize,
    /// Worker threads used for population evaluation
    pub threads: usize,
    /// Show a progress bar while evaluating the population
    pub show_progress: bool,
    /// Tables that may be absent from the data directory (treated as empty)
    pub optional_tables: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            batch_size: 16384,
            threads: num_cpus::get(),
            show_progress: false,
            optional_tables: Vec::new(),
        }
    }
}

impl DatasetConfig {
    /// Create a new configuration with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Parquet batch size
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of evaluation threads
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Enable or disable the progress bar
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Allow a table to be missing from the data directory
    #[must_use]
    pub fn with_optional_table(mut self, table: &str) -> Self {
        self.optional_tables.push(table.to_string());
        self
    }

    /// Whether a table may be missing
    #[must_use]
    pub fn is_optional(&self, table: &str) -> bool {
        self.optional_tables.iter().any(|t| t == table)
    }
}
