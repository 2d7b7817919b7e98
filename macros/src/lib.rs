//! Procedural macros for the jak-cohort crate
//!
//! This crate provides the derive macro that turns a plain record struct into
//! an Arrow-backed EHR table record, removing the per-table column extraction
//! boilerplate from the main crate.

use proc_macro::TokenStream;

mod table_record;
mod utils;

/// Derive macro for EHR table records
///
/// Generates an implementation of `crate::tables::TableRecord` for a struct:
/// the Arrow schema of the table and the conversion of a `RecordBatch` into
/// typed records. Field types must implement `crate::tables::extract::ColumnValue`
/// (directly, wrapped in `Option`, or as a fixed-length array of `Option`).
///
/// # Attributes
///
/// * `#[table(name = "...")]` - Table name used in file lookup and error messages
/// * `#[column(name = "...")]` - Source column name (defaults to the field name)
/// * `#[column(or_default)]` - Missing or null values become `Default::default()`
/// * `#[column(prefix = "...", count = N)]` - Fixed-length slot array read from
///   columns `prefix01`..`prefixNN` (`start` overrides the first index)
///
/// # Example
///
/// ```rust,ignore
/// #[derive(TableRecord)]
/// #[table(name = "ec")]
/// struct EmergencyAttendance {
///     patient_id: i64,
///
///     arrival_date: Option<chrono::NaiveDate>,
///
///     #[column(prefix = "diagnosis_", count = 24)]
///     diagnoses: [Option<String>; 24],
/// }
/// ```
#[proc_macro_derive(TableRecord, attributes(table, column))]
pub fn derive_table_record(input: TokenStream) -> TokenStream {
    table_record::process_derive_table_record(input)
}
