//! Patient-level study variables over EHR record tables.
//!
//! Variables are declared as filters and aggregations over record tables
//! (phase 1, [`query`], [`matcher`], [`study`]) and evaluated separately over
//! every patient's records (phase 2, [`query::eval`], [`dataset`]).

pub mod codelist;
pub mod config;
pub mod dataset;
pub mod dummy;
pub mod error;
pub mod matcher;
pub mod models;
pub mod query;
pub mod study;
pub mod tables;
pub mod utils;

// Core types
pub use codelist::{CodeSystem, Codelist, StudyCodelists};
pub use config::{DatasetConfig, StudyDates};
pub use error::{DatasetError, Result};

// Definition and evaluation
pub use dataset::{Dataset, OutputFrame, evaluate_dataset, write_output};
pub use query::{EventQuery, PatientExpr, RowPredicate, Value};
pub use tables::{PatientTables, Table, TableData, load_tables};

// Arrow types
pub use arrow::record_batch::RecordBatch;
