//! Parquet table loading
//!
//! A table is either a single `<table>.parquet` file or a `<table>/`
//! directory of Parquet files under the data directory. Only the columns a
//! record reads are projected. Directory tables are read in parallel with
//! rayon; distinct tables are read concurrently on blocking tokio tasks.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rayon::prelude::*;

use crate::config::DatasetConfig;
use crate::error::util::{safe_open_file, validate_directory};
use crate::error::{DatasetError, Result};
use crate::models::{
    Address, ClinicalEvent, Death, EmergencyAttendance, HospitalEpisode, Medication,
    OutpatientAppointment, Patient, TherapeuticIntervention,
};
use crate::tables::{Table, TableData, TableRecord};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Location of a table under the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLocation {
    /// A single Parquet file
    File(PathBuf),
    /// A directory of Parquet files
    Directory(PathBuf),
}

/// Find a table under `dir`, preferring the single-file layout
#[must_use]
pub fn locate_table(dir: &Path, table_name: &str) -> Option<TableLocation> {
    let file = dir.join(format!("{table_name}.parquet"));
    if file.is_file() {
        return Some(TableLocation::File(file));
    }
    let directory = dir.join(table_name);
    if directory.is_dir() {
        return Some(TableLocation::Directory(directory));
    }
    None
}

/// Read every record of a table
///
/// A missing table is an error unless it is listed as optional in the
/// configuration, in which case it is read as empty.
pub fn read_table<T: TableRecord>(dir: &Path, config: &DatasetConfig) -> Result<Vec<T>> {
    let Some(location) = locate_table(dir, T::TABLE_NAME) else {
        if config.is_optional(T::TABLE_NAME) {
            log::warn!(
                "Optional table {} not found in {}, treating as empty",
                T::TABLE_NAME,
                dir.display()
            );
            return Ok(Vec::new());
        }
        return Err(DatasetError::io(
            format!(
                "Table '{}' not found (expected {}.parquet or a {}/ directory)",
                T::TABLE_NAME,
                T::TABLE_NAME,
                T::TABLE_NAME
            ),
            dir,
        ));
    };

    let start = Instant::now();
    let (path, records) = match location {
        TableLocation::File(path) => {
            let records = read_parquet_file::<T>(&path, config.batch_size)?;
            (path, records)
        }
        TableLocation::Directory(path) => {
            let records = read_parquet_directory::<T>(&path, config.batch_size)?;
            (path, records)
        }
    };
    log_operation_complete("loaded", &path, records.len(), Some(start.elapsed()));
    Ok(records)
}

/// Read one Parquet file into records
pub fn read_parquet_file<T: TableRecord>(path: &Path, batch_size: usize) -> Result<Vec<T>> {
    log_operation_start("Reading table file", path);
    let file = safe_open_file(path, &format!("reading table {}", T::TABLE_NAME))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    // Required columns must be present; optional ones may be missing
    let expected = T::schema();
    let file_schema = Arc::clone(builder.schema());
    let mut projection = Vec::with_capacity(expected.fields().len());
    for field in expected.fields() {
        match file_schema.index_of(field.name()) {
            Ok(idx) => projection.push(idx),
            Err(_) if !field.is_nullable() => {
                return Err(DatasetError::schema(
                    T::TABLE_NAME,
                    format!(
                        "required column '{}' missing from {}",
                        field.name(),
                        path.display()
                    ),
                ));
            }
            Err(_) => log::debug!(
                "Optional column {} not present in {}",
                field.name(),
                path.display()
            ),
        }
    }

    let mask = ProjectionMask::roots(builder.parquet_schema(), projection);
    let reader = builder
        .with_projection(mask)
        .with_batch_size(batch_size)
        .build()?;

    let mut records = Vec::new();
    for batch in reader {
        records.extend(T::from_batch(&batch?)?);
    }
    Ok(records)
}

/// Read every Parquet file of a directory in parallel
///
/// Files are combined in file name order so the record order is stable.
pub fn read_parquet_directory<T: TableRecord>(dir: &Path, batch_size: usize) -> Result<Vec<T>> {
    validate_directory(dir, &format!("reading table {}", T::TABLE_NAME))?;

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| DatasetError::io_with_source("Failed to read directory", dir, e))?
    {
        let path = entry
            .map_err(|e| DatasetError::io_with_source("Failed to read directory entry", dir, e))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        log::warn!("No parquet files found in directory: {}", dir.display());
        return Ok(Vec::new());
    }
    log::info!("Found {} parquet files in {}", files.len(), dir.display());

    let parts: Vec<Vec<T>> = files
        .par_iter()
        .map(|path| read_parquet_file::<T>(path, batch_size))
        .collect::<Result<_>>()?;
    Ok(parts.into_iter().flatten().collect())
}

/// Read a table on a blocking task, or nothing if it is not wanted
async fn spawn_read<T: TableRecord>(
    dir: Arc<PathBuf>,
    config: Arc<DatasetConfig>,
    wanted: bool,
) -> Result<Vec<T>> {
    if !wanted {
        return Ok(Vec::new());
    }
    let task_dir = Arc::clone(&dir);
    tokio::task::spawn_blocking(move || read_table::<T>(&task_dir, &config))
        .await
        .map_err(|e| {
            DatasetError::io(
                format!("Loading task for table '{}' failed: {e}", T::TABLE_NAME),
                &dir,
            )
        })?
}

/// Load the requested tables concurrently
///
/// The patients table is always loaded since it defines the population.
pub async fn load_tables(
    dir: &Path,
    tables: &BTreeSet<Table>,
    config: &DatasetConfig,
) -> Result<TableData> {
    validate_directory(dir, "loading record tables")?;
    log::info!(
        "Loading tables [{}] from {}",
        tables.iter().join(", "),
        dir.display()
    );

    let dir = Arc::new(dir.to_path_buf());
    let config = Arc::new(config.clone());
    let wants = |table: Table| tables.contains(&table);

    let (
        patients,
        addresses,
        clinical_events,
        medications,
        apcs,
        opa_diag,
        emergency_care,
        ons_deaths,
        covid_therapeutics,
    ) = tokio::try_join!(
        spawn_read::<Patient>(Arc::clone(&dir), Arc::clone(&config), true),
        spawn_read::<Address>(Arc::clone(&dir), Arc::clone(&config), wants(Table::Addresses)),
        spawn_read::<ClinicalEvent>(
            Arc::clone(&dir),
            Arc::clone(&config),
            wants(Table::ClinicalEvents)
        ),
        spawn_read::<Medication>(Arc::clone(&dir), Arc::clone(&config), wants(Table::Medications)),
        spawn_read::<HospitalEpisode>(Arc::clone(&dir), Arc::clone(&config), wants(Table::Apcs)),
        spawn_read::<OutpatientAppointment>(
            Arc::clone(&dir),
            Arc::clone(&config),
            wants(Table::OpaDiag)
        ),
        spawn_read::<EmergencyAttendance>(
            Arc::clone(&dir),
            Arc::clone(&config),
            wants(Table::EmergencyCare)
        ),
        spawn_read::<Death>(Arc::clone(&dir), Arc::clone(&config), wants(Table::OnsDeaths)),
        spawn_read::<TherapeuticIntervention>(
            Arc::clone(&dir),
            Arc::clone(&config),
            wants(Table::CovidTherapeutics)
        ),
    )?;

    let data = TableData {
        patients,
        addresses,
        clinical_events,
        medications,
        apcs,
        opa_diag,
        emergency_care,
        ons_deaths,
        covid_therapeutics,
    };
    for table in Table::ALL {
        log::debug!("{table}: {} rows", data.row_count(table));
    }
    Ok(data)
}
