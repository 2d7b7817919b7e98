//! Population evaluation
//!
//! Patients are independent, so they are evaluated in parallel on a rayon
//! pool sized by [`DatasetConfig::threads`]. Within a patient, variables are
//! evaluated in definition order and bound for later references. Output rows
//! keep patient id order.

use std::time::Instant;

use rayon::prelude::*;

use crate::config::DatasetConfig;
use crate::dataset::{Dataset, Variable};
use crate::error::{DatasetError, Result};
use crate::query::{EvalContext, Value, ValueType};
use crate::tables::{PatientRecords, PatientTables};
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};

/// One output column
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub value_type: ValueType,
    pub values: Vec<Value>,
}

/// The evaluated dataset: one row per patient in the population
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputFrame {
    pub patient_ids: Vec<i64>,
    pub columns: Vec<OutputColumn>,
}

impl OutputFrame {
    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.patient_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patient_ids.is_empty()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&OutputColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Value of a column for one patient
    #[must_use]
    pub fn value(&self, patient_id: i64, name: &str) -> Option<&Value> {
        let row = self.patient_ids.binary_search(&patient_id).ok()?;
        self.column(name).map(|column| &column.values[row])
    }
}

/// Evaluate every variable for one patient
///
/// Returns the output values in column order, or `None` when the patient is
/// outside the population.
pub fn evaluate_patient(dataset: &Dataset, records: &PatientRecords) -> Result<Option<Vec<Value>>> {
    let mut context = EvalContext::new(records);
    for variable in dataset.variables() {
        let value = context.evaluate(&variable.expr)?;
        context.bind(&variable.name, value);
    }

    if context.evaluate_bool(dataset.population())? != Some(true) {
        return Ok(None);
    }

    let row = dataset
        .output_columns()
        .map(|variable| context.variable(&variable.name).cloned().unwrap_or_default())
        .collect();
    Ok(Some(row))
}

/// Evaluate the dataset over the whole population
pub fn evaluate_dataset(
    dataset: &Dataset,
    tables: &PatientTables,
    config: &DatasetConfig,
) -> Result<OutputFrame> {
    let start = Instant::now();
    let columns: Vec<&Variable> = dataset.output_columns().collect();
    log::info!(
        "Evaluating {} variables ({} written) for {} patients on {} threads",
        dataset.len(),
        columns.len(),
        tables.len(),
        config.threads
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| DatasetError::Config(format!("Failed to build thread pool: {e}")))?;

    let pb = config.show_progress.then(|| {
        create_main_progress_bar(tables.len() as u64, Some("Evaluating patients"))
    });

    let rows: Vec<(i64, Option<Vec<Value>>)> = pool.install(|| {
        tables
            .patients()
            .par_iter()
            .map(|records| {
                let row = evaluate_patient(dataset, records);
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
                row.map(|row| (records.patient_id(), row))
            })
            .collect::<Result<_>>()
    })?;

    if let Some(pb) = &pb {
        finish_progress_bar(pb, Some("Evaluation complete"));
    }

    let mut frame = OutputFrame {
        patient_ids: Vec::with_capacity(rows.len()),
        columns: columns
            .iter()
            .map(|variable| OutputColumn {
                name: variable.name.clone(),
                value_type: variable.value_type,
                values: Vec::with_capacity(rows.len()),
            })
            .collect(),
    };
    for (patient_id, row) in rows {
        let Some(row) = row else { continue };
        frame.patient_ids.push(patient_id);
        for (column, value) in frame.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
    }

    log::info!(
        "Evaluated {} of {} patients into the population in {:?}",
        frame.len(),
        tables.len(),
        start.elapsed()
    );
    Ok(frame)
}
