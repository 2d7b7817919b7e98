//! Dataset query language
//!
//! Variables are described first and evaluated later. [`expr`], [`frame`]
//! and [`predicate`] build side-effect-free descriptions of per-patient
//! values; [`eval`] computes them for one patient's records.

pub mod eval;
pub mod expr;
pub mod frame;
pub mod predicate;
pub mod value;

pub use eval::EvalContext;
pub use expr::{
    AddressField, CompareOp, PatientExpr, PatientField, Scope, VariableInfo, all_of, any_of, case,
    coalesce,
};
pub use frame::{Column, EventQuery, Position, RecordSelection};
pub use predicate::{ResolvedPredicate, RowPredicate};
pub use value::{Value, ValueType};
