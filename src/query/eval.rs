//! Per-patient evaluation of patient expressions
//!
//! An [`EvalContext`] holds one patient's records together with the values
//! of the variables already evaluated for that patient. Expressions are
//! evaluated recursively; event queries resolve their date bounds first and
//! then scan the table rows in load order.

use chrono::{Datelike, NaiveDate, TimeDelta};
use rustc_hash::FxHashMap;

use crate::error::{DatasetError, Result};
use crate::models::{EventRecord, address_on};
use crate::query::expr::{AddressField, PatientExpr, PatientField};
use crate::query::frame::{Column, EventQuery, Position};
use crate::query::value::{Value, kleene_and, kleene_or};
use crate::tables::PatientRecords;

/// Evaluation state for one patient
#[derive(Debug)]
pub struct EvalContext<'a> {
    records: &'a PatientRecords,
    variables: FxHashMap<&'a str, Value>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(records: &'a PatientRecords) -> Self {
        Self {
            records,
            variables: FxHashMap::default(),
        }
    }

    #[must_use]
    pub const fn patient_id(&self) -> i64 {
        self.records.patient_id()
    }

    /// Record the value of a variable for later references
    pub fn bind(&mut self, name: &'a str, value: Value) {
        self.variables.insert(name, value);
    }

    /// Value of an already bound variable
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn error(&self, message: impl Into<String>) -> DatasetError {
        DatasetError::evaluation(self.patient_id(), message)
    }

    /// Evaluate an expression for this patient
    pub fn evaluate(&self, expr: &PatientExpr) -> Result<Value> {
        let value: Value = match expr {
            PatientExpr::Literal(value) => value.clone(),
            PatientExpr::Null(_) => Value::Null,
            PatientExpr::Patient(field) => {
                let patient = &self.records.patient;
                match field {
                    PatientField::DateOfBirth => patient.date_of_birth.into(),
                    PatientField::Sex => patient.sex.clone().into(),
                    PatientField::DateOfDeath => patient.date_of_death.into(),
                }
            }
            PatientExpr::Variable(name) => self
                .variables
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| self.error(format!("variable '{name}' has not been evaluated")))?,
            PatientExpr::Count(query) => {
                let count = self.matching_rows(query)?.len();
                Value::Int(i64::try_from(count).map_err(|e| self.error(e.to_string()))?)
            }
            PatientExpr::Exists(query) => Value::Bool(!self.matching_rows(query)?.is_empty()),
            PatientExpr::Pick {
                query,
                position,
                column,
            } => match self.select(query, *position)? {
                Some(row) => read_column(row, *column),
                None => Value::Null,
            },
            PatientExpr::Category {
                query,
                position,
                field,
                codelist,
            } => self
                .select(query, *position)?
                .and_then(|row| row.category(*field, codelist))
                .into(),
            PatientExpr::Address { on, field } => match self.evaluate_date(on)? {
                Some(date) => address_on(&self.records.addresses, date)
                    .map_or(Value::Null, |address| match field {
                        AddressField::ImdRounded => address.imd_rounded.into(),
                        AddressField::CareHomeIsPotentialMatch => {
                            address.care_home_is_potential_match.into()
                        }
                        AddressField::CareHomeRequiresNursing => {
                            address.care_home_requires_nursing.into()
                        }
                        AddressField::CareHomeDoesNotRequireNursing => {
                            address.care_home_does_not_require_nursing.into()
                        }
                    }),
                None => Value::Null,
            },
            PatientExpr::Not(inner) => self.evaluate_bool(inner)?.map(|value| !value).into(),
            PatientExpr::And(operands) => {
                let mut result = Some(true);
                for operand in operands {
                    result = kleene_and(result, self.evaluate_bool(operand)?);
                    if result == Some(false) {
                        break;
                    }
                }
                result.into()
            }
            PatientExpr::Or(operands) => {
                let mut result = Some(false);
                for operand in operands {
                    result = kleene_or(result, self.evaluate_bool(operand)?);
                    if result == Some(true) {
                        break;
                    }
                }
                result.into()
            }
            PatientExpr::Compare { op, left, right } => {
                let (left, right) = (self.evaluate(left)?, self.evaluate(right)?);
                if left.is_null() || right.is_null() {
                    Value::Null
                } else {
                    let ordering = left
                        .compare(&right)
                        .ok_or_else(|| self.error(format!("cannot compare {left} with {right}")))?;
                    Value::Bool(op.holds(ordering))
                }
            }
            PatientExpr::IsNull(inner) => Value::Bool(self.evaluate(inner)?.is_null()),
            PatientExpr::IsIn { expr, values } => {
                let value = self.evaluate(expr)?;
                if value.is_null() {
                    Value::Null
                } else {
                    Value::Bool(
                        values
                            .iter()
                            .any(|candidate| value.compare(candidate).is_some_and(|o| o.is_eq())),
                    )
                }
            }
            PatientExpr::Case {
                branches,
                otherwise,
            } => {
                for (condition, value) in branches {
                    if self.evaluate_bool(condition)? == Some(true) {
                        return self.evaluate(value);
                    }
                }
                match otherwise {
                    Some(otherwise) => self.evaluate(otherwise)?,
                    None => Value::Null,
                }
            }
            PatientExpr::Coalesce(operands) => {
                for operand in operands {
                    let value = self.evaluate(operand)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Value::Null
            }
            PatientExpr::AddDays { date, days } => match self.evaluate_date(date)? {
                Some(date) => TimeDelta::try_days(*days)
                    .and_then(|delta| date.checked_add_signed(delta))
                    .map(Value::Date)
                    .ok_or_else(|| self.error(format!("{date} plus {days} days is out of range")))?,
                None => Value::Null,
            },
            PatientExpr::Year(date) => self
                .evaluate_date(date)?
                .map(|date| i64::from(date.year()))
                .into(),
            PatientExpr::YearsBetween { from, to } => {
                match (self.evaluate_date(from)?, self.evaluate_date(to)?) {
                    // Null when the end precedes the start
                    (Some(from), Some(to)) => to.years_since(from).map(i64::from).into(),
                    _ => Value::Null,
                }
            }
        };
        Ok(value)
    }

    /// Evaluate a boolean expression; `None` is unknown
    pub fn evaluate_bool(&self, expr: &PatientExpr) -> Result<Option<bool>> {
        match self.evaluate(expr)? {
            Value::Null => Ok(None),
            Value::Bool(value) => Ok(Some(value)),
            other => Err(self.error(format!("expected a boolean, found {other}"))),
        }
    }

    /// Evaluate a date expression; `None` is null
    pub fn evaluate_date(&self, expr: &PatientExpr) -> Result<Option<NaiveDate>> {
        match self.evaluate(expr)? {
            Value::Null => Ok(None),
            Value::Date(value) => Ok(Some(value)),
            other => Err(self.error(format!("expected a date, found {other}"))),
        }
    }

    /// Rows of the query's table kept by its predicate, in load order
    pub fn matching_rows(&self, query: &EventQuery) -> Result<Vec<&'a dyn EventRecord>> {
        let resolved = query
            .predicate
            .resolve(&mut |bound: &PatientExpr| self.evaluate_date(bound))?;
        Ok(self
            .records
            .events(query.table)
            .into_iter()
            .filter(|row| resolved.keeps(*row))
            .collect())
    }

    /// The first or last matching row by date
    ///
    /// Ties keep load order: `min_by_key` returns the first of equal minima
    /// and `max_by_key` the last of equal maxima.
    pub fn select(
        &self,
        query: &EventQuery,
        position: Position,
    ) -> Result<Option<&'a dyn EventRecord>> {
        let rows = self.matching_rows(query)?.into_iter();
        Ok(match position {
            Position::First => rows.min_by_key(|row| row.date()),
            Position::Last => rows.max_by_key(|row| row.date()),
        })
    }
}

fn read_column(row: &dyn EventRecord, column: Column) -> Value {
    match column {
        Column::Date => row.date().into(),
        Column::EndDate => row.end_date().into(),
        Column::Code(field) => row.code(field).into(),
        Column::NumericValue => row.numeric_value().into(),
        Column::Text(field) => row.text(field).into(),
    }
}
