//! Writing the output table
//!
//! The frame becomes one Arrow record batch with `patient_id` first and one
//! column per written variable, typed by its tag. It is written as Parquet,
//! or as CSV when the output path ends in `.csv`.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;

use crate::dataset::evaluate::{OutputColumn, OutputFrame};
use crate::error::{DatasetError, Result};
use crate::query::{Value, ValueType};
use crate::tables::extract::days_from_date;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// File format of the output table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Parquet,
    Csv,
}

impl OutputFormat {
    /// Format implied by the file extension; Parquet unless `.csv`
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Parquet,
        }
    }
}

/// Arrow type of an output column
#[must_use]
pub const fn arrow_type(value_type: ValueType) -> DataType {
    match value_type {
        ValueType::Bool => DataType::Boolean,
        ValueType::Int => DataType::Int64,
        ValueType::Float => DataType::Float64,
        ValueType::Date => DataType::Date32,
        ValueType::Str => DataType::Utf8,
    }
}

fn column_array(column: &OutputColumn) -> Result<ArrayRef> {
    let mismatch = |value: &Value| {
        DatasetError::schema(
            "output",
            format!(
                "column '{}' of type {} holds {value}",
                column.name, column.value_type
            ),
        )
    };
    let values = column.values.iter();

    let array: ArrayRef = match column.value_type {
        ValueType::Bool => Arc::new(
            values
                .map(|value| match value {
                    Value::Null => Ok(None),
                    Value::Bool(b) => Ok(Some(*b)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<BooleanArray>>()?,
        ),
        ValueType::Int => Arc::new(
            values
                .map(|value| match value {
                    Value::Null => Ok(None),
                    Value::Int(i) => Ok(Some(*i)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Int64Array>>()?,
        ),
        ValueType::Float => Arc::new(
            values
                .map(|value| match value {
                    Value::Null => Ok(None),
                    other => other.as_float().map(Some).ok_or_else(|| mismatch(other)),
                })
                .collect::<Result<Float64Array>>()?,
        ),
        ValueType::Date => Arc::new(
            values
                .map(|value| match value {
                    Value::Null => Ok(None),
                    Value::Date(date) => Ok(Some(days_from_date(*date))),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Date32Array>>()?,
        ),
        ValueType::Str => Arc::new(
            values
                .map(|value| match value {
                    Value::Null => Ok(None),
                    Value::Str(s) => Ok(Some(s.as_str())),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<StringArray>>()?,
        ),
    };
    Ok(array)
}

/// Convert the frame into a single record batch
pub fn to_record_batch(frame: &OutputFrame) -> Result<RecordBatch> {
    let mut fields = vec![Field::new("patient_id", DataType::Int64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(frame.patient_ids.clone()))];

    for column in &frame.columns {
        fields.push(Field::new(&column.name, arrow_type(column.value_type), true));
        arrays.push(column_array(column)?);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Write the frame to `path`, choosing the format from its extension
pub fn write_output(frame: &OutputFrame, path: &Path) -> Result<()> {
    let start = Instant::now();
    let format = OutputFormat::from_path(path);
    log_operation_start(&format!("Writing {format:?} output to"), path);

    let batch = to_record_batch(frame)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            DatasetError::io_with_source("Failed to create output directory", parent, e)
        })?;
    }
    let file = File::create(path)
        .map_err(|e| DatasetError::io_with_source("Failed to create output file", path, e))?;

    match format {
        OutputFormat::Parquet => {
            let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
            writer.write(&batch)?;
            writer.close()?;
        }
        OutputFormat::Csv => {
            let mut writer = arrow::csv::WriterBuilder::new()
                .with_header(true)
                .build(file);
            writer.write(&batch)?;
        }
    }

    log_operation_complete("wrote", path, frame.len(), Some(start.elapsed()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use arrow::array::Array;
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_integer_values_widen_in_float_columns() {
        let column = OutputColumn {
            name: "cov_num_bmi".to_string(),
            value_type: ValueType::Float,
            values: vec![Value::Int(25), Value::Null, Value::Float(31.5)],
        };
        let array = column_array(&column).unwrap();
        let floats = array.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(floats.value(0), 25.0);
        assert!(floats.is_null(1));
    }

    #[test]
    fn test_batch_layout() {
        let frame = OutputFrame {
            patient_ids: vec![1, 2],
            columns: vec![OutputColumn {
                name: "out_date_death".to_string(),
                value_type: ValueType::Date,
                values: vec![
                    Value::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()),
                    Value::Null,
                ],
            }],
        };
        let batch = to_record_batch(&frame).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).name(), "patient_id");
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Date32);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("out.csv")), OutputFormat::Csv);
        assert_eq!(
            OutputFormat::from_path(Path::new("out.parquet")),
            OutputFormat::Parquet
        );
    }
}
