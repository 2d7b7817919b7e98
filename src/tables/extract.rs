//! Typed value extraction from Arrow record batches
//!
//! [`ColumnValue`] is implemented for every field type a table record may
//! hold. Extraction tolerates the physical encodings found in practice
//! (32- or 64-bit integers, `Date32` or ISO date strings, delimited strings
//! or list columns for code sets) and returns `None` for nulls and for
//! optional columns that are missing from the batch.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
    Int64Type,
};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};

use crate::error::{DatasetError, Result};

/// Days between 0001-01-01 (CE day 1) and the Unix epoch
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Convert Arrow `Date32` days since the epoch into a date
#[must_use]
pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Convert a date into Arrow `Date32` days since the epoch
#[must_use]
pub fn days_from_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Parse a date written as `YYYY-MM-DD` or `YYYYMMDD`
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .ok()
}

/// Split a delimited code string into codes
///
/// Codes may be separated by commas, semicolons, pipes or whitespace.
#[must_use]
pub fn split_codes(value: &str) -> Vec<String> {
    value
        .split(|c: char| matches!(c, ',' | ';' | '|') || c.is_whitespace())
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

/// A value that can be read from one cell of a record batch
pub trait ColumnValue: Sized {
    /// Logical Arrow type of the column
    fn data_type() -> DataType;

    /// Extract the value at `row` of `column`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(value))` - The cell holds a value
    /// * `Ok(None)` - The cell is null, or the column is absent and not required
    /// * `Err` - The column is required but absent, or has an unsupported type
    fn extract(batch: &RecordBatch, row: usize, column: &str, required: bool)
    -> Result<Option<Self>>;
}

/// Look up a non-null cell
fn cell<'b>(
    batch: &'b RecordBatch,
    row: usize,
    column: &str,
    required: bool,
) -> Result<Option<&'b ArrayRef>> {
    let Some(array) = batch.column_by_name(column) else {
        if required {
            return Err(DatasetError::schema(
                "record batch",
                format!("required column '{column}' not found"),
            ));
        }
        return Ok(None);
    };

    if row >= array.len() || array.is_null(row) {
        return Ok(None);
    }
    Ok(Some(array))
}

fn type_mismatch(column: &str, expected: &str, actual: &DataType) -> DatasetError {
    DatasetError::schema(
        "record batch",
        format!("column '{column}' has type {actual}, expected {expected}"),
    )
}

/// Read a string cell without trimming or blank handling
fn raw_string(array: &ArrayRef, row: usize, column: &str) -> Result<String> {
    let value = match array.data_type() {
        DataType::Utf8 => array.as_string_opt::<i32>().map(|a| a.value(row).to_string()),
        DataType::LargeUtf8 => array.as_string_opt::<i64>().map(|a| a.value(row).to_string()),
        DataType::Utf8View => array.as_string_view_opt().map(|a| a.value(row).to_string()),
        DataType::Int64 => array
            .as_primitive_opt::<Int64Type>()
            .map(|a| a.value(row).to_string()),
        DataType::Int32 => array
            .as_primitive_opt::<Int32Type>()
            .map(|a| a.value(row).to_string()),
        _ => None,
    };
    value.ok_or_else(|| type_mismatch(column, "string", array.data_type()))
}

impl ColumnValue for String {
    fn data_type() -> DataType {
        DataType::Utf8
    }

    fn extract(batch: &RecordBatch, row: usize, column: &str, required: bool) -> Result<Option<Self>> {
        let Some(array) = cell(batch, row, column, required)? else {
            return Ok(None);
        };
        let value = raw_string(array, row, column)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(trimmed.to_string()))
    }
}

impl ColumnValue for i64 {
    fn data_type() -> DataType {
        DataType::Int64
    }

    fn extract(batch: &RecordBatch, row: usize, column: &str, required: bool) -> Result<Option<Self>> {
        let Some(array) = cell(batch, row, column, required)? else {
            return Ok(None);
        };
        let value = match array.data_type() {
            DataType::Int64 => array.as_primitive_opt::<Int64Type>().map(|a| a.value(row)),
            DataType::Int32 => array
                .as_primitive_opt::<Int32Type>()
                .map(|a| i64::from(a.value(row))),
            DataType::Int16 => array
                .as_primitive_opt::<Int16Type>()
                .map(|a| i64::from(a.value(row))),
            DataType::Int8 => array
                .as_primitive_opt::<Int8Type>()
                .map(|a| i64::from(a.value(row))),
            _ => None,
        };
        value
            .map(Some)
            .ok_or_else(|| type_mismatch(column, "integer", array.data_type()))
    }
}

impl ColumnValue for f64 {
    fn data_type() -> DataType {
        DataType::Float64
    }

    #[allow(clippy::cast_precision_loss)]
    fn extract(batch: &RecordBatch, row: usize, column: &str, required: bool) -> Result<Option<Self>> {
        let Some(array) = cell(batch, row, column, required)? else {
            return Ok(None);
        };
        let value = match array.data_type() {
            DataType::Float64 => array.as_primitive_opt::<Float64Type>().map(|a| a.value(row)),
            DataType::Float32 => array
                .as_primitive_opt::<Float32Type>()
                .map(|a| f64::from(a.value(row))),
            DataType::Int64 => array
                .as_primitive_opt::<Int64Type>()
                .map(|a| a.value(row) as f64),
            DataType::Int32 => array
                .as_primitive_opt::<Int32Type>()
                .map(|a| f64::from(a.value(row))),
            _ => None,
        };
        value
            .map(|v| (!v.is_nan()).then_some(v))
            .ok_or_else(|| type_mismatch(column, "float", array.data_type()))
    }
}

impl ColumnValue for bool {
    fn data_type() -> DataType {
        DataType::Boolean
    }

    fn extract(batch: &RecordBatch, row: usize, column: &str, required: bool) -> Result<Option<Self>> {
        let Some(array) = cell(batch, row, column, required)? else {
            return Ok(None);
        };
        let value = match array.data_type() {
            DataType::Boolean => array.as_boolean_opt().map(|a| a.value(row)),
            DataType::Int64 => array.as_primitive_opt::<Int64Type>().map(|a| a.value(row) != 0),
            DataType::Int32 => array.as_primitive_opt::<Int32Type>().map(|a| a.value(row) != 0),
            _ => None,
        };
        value
            .map(Some)
            .ok_or_else(|| type_mismatch(column, "boolean", array.data_type()))
    }
}

impl ColumnValue for NaiveDate {
    fn data_type() -> DataType {
        DataType::Date32
    }

    fn extract(batch: &RecordBatch, row: usize, column: &str, required: bool) -> Result<Option<Self>> {
        let Some(array) = cell(batch, row, column, required)? else {
            return Ok(None);
        };
        match array.data_type() {
            DataType::Date32 => Ok(array
                .as_primitive_opt::<Date32Type>()
                .and_then(|a| date_from_days(a.value(row)))),
            DataType::Date64 => Ok(array.as_primitive_opt::<Date64Type>().and_then(|a| {
                i32::try_from(a.value(row).div_euclid(86_400_000))
                    .ok()
                    .and_then(date_from_days)
            })),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                let value = raw_string(array, row, column)?;
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                parse_date(trimmed).map(Some).ok_or_else(|| {
                    DatasetError::schema(
                        "record batch",
                        format!("column '{column}' holds malformed date '{trimmed}' at row {row}"),
                    )
                })
            }
            other => Err(type_mismatch(column, "date", other)),
        }
    }
}

impl ColumnValue for Vec<String> {
    fn data_type() -> DataType {
        DataType::Utf8
    }

    fn extract(batch: &RecordBatch, row: usize, column: &str, required: bool) -> Result<Option<Self>> {
        let Some(array) = cell(batch, row, column, required)? else {
            return Ok(None);
        };
        if let Some(list) = array.as_list_opt::<i32>() {
            let values = list.value(row);
            let strings = values
                .as_string_opt::<i32>()
                .ok_or_else(|| type_mismatch(column, "list of strings", array.data_type()))?;
            let codes = strings
                .iter()
                .flatten()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect();
            return Ok(Some(codes));
        }
        Ok(Some(split_codes(&raw_string(array, row, column)?)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Date32Array, Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    use super::*;

    fn batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("patient_id", DataType::Int32, false),
            Field::new("date", DataType::Date32, true),
            Field::new("iso_date", DataType::Utf8, true),
            Field::new("codes", DataType::Utf8, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(Date32Array::from(vec![Some(18_628), None])),
                Arc::new(StringArray::from(vec![Some("2021-01-01"), Some(" ")])),
                Arc::new(StringArray::from(vec![Some("C61,I10 ||E11"), None])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_date_encodings_agree() {
        let batch = batch();
        let from_date32 = NaiveDate::extract(&batch, 0, "date", true).unwrap();
        let from_string = NaiveDate::extract(&batch, 0, "iso_date", true).unwrap();
        assert_eq!(from_date32, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(from_date32, from_string);
        assert_eq!(NaiveDate::extract(&batch, 1, "iso_date", true).unwrap(), None);
    }

    #[test]
    fn test_int32_widens_to_i64() {
        let batch = batch();
        assert_eq!(i64::extract(&batch, 1, "patient_id", true).unwrap(), Some(2));
    }

    #[test]
    fn test_missing_optional_column_is_none() {
        let batch = batch();
        assert_eq!(String::extract(&batch, 0, "sex", false).unwrap(), None);
        assert!(String::extract(&batch, 0, "sex", true).is_err());
    }

    #[test]
    fn test_delimited_codes() {
        let batch = batch();
        let codes = Vec::<String>::extract(&batch, 0, "codes", false).unwrap().unwrap();
        assert_eq!(codes, vec!["C61", "I10", "E11"]);
    }

    #[test]
    fn test_day_conversions_round_trip_epoch() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(days_from_date(epoch), 0);
        assert_eq!(date_from_days(0), Some(epoch));
    }
}
