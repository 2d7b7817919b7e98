//! Row predicates over event tables
//!
//! A [`RowPredicate`] is part of a query description: its date bounds are
//! patient-level expressions, so a boundary may be a literal date or a value
//! derived from another variable. Before rows are tested the bounds are
//! evaluated for the current patient, giving a [`ResolvedPredicate`].
//!
//! Row tests use three-valued logic. A row is kept only when its predicate
//! is true; a null code, date or bound makes the test unknown, so the row is
//! dropped, also under negation.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::codelist::Codelist;
use crate::error::{DatasetError, Result};
use crate::models::{CodeField, EventRecord, TextField};
use crate::query::expr::{PatientExpr, Scope};
use crate::query::value::{ValueType, kleene_and, kleene_or};
use crate::tables::Table;

/// A filter on the rows of an event table
#[derive(Debug, Clone, Default)]
pub enum RowPredicate {
    /// Keeps every row
    #[default]
    AlwaysTrue,
    /// Any code of the field is in the codelist
    CodeIn {
        field: CodeField,
        codelist: Arc<Codelist>,
    },
    /// Any code of the field equals the code
    CodeEq { field: CodeField, code: String },
    /// Event date is on or before the bound
    DateOnOrBefore(Box<PatientExpr>),
    /// Event date is on or after the bound
    DateOnOrAfter(Box<PatientExpr>),
    /// Event date lies in the closed interval
    DateBetween(Box<PatientExpr>, Box<PatientExpr>),
    /// Text field is one of the values
    TextIn { field: TextField, values: Vec<String> },
    And(Box<RowPredicate>, Box<RowPredicate>),
    Or(Box<RowPredicate>, Box<RowPredicate>),
    Not(Box<RowPredicate>),
}

impl RowPredicate {
    #[must_use]
    pub const fn always_true() -> Self {
        Self::AlwaysTrue
    }

    #[must_use]
    pub fn code_in(field: CodeField, codelist: &Arc<Codelist>) -> Self {
        Self::CodeIn {
            field,
            codelist: Arc::clone(codelist),
        }
    }

    #[must_use]
    pub fn code_eq(field: CodeField, code: &str) -> Self {
        Self::CodeEq {
            field,
            code: code.to_string(),
        }
    }

    #[must_use]
    pub fn on_or_before(bound: impl Into<PatientExpr>) -> Self {
        Self::DateOnOrBefore(Box::new(bound.into()))
    }

    #[must_use]
    pub fn on_or_after(bound: impl Into<PatientExpr>) -> Self {
        Self::DateOnOrAfter(Box::new(bound.into()))
    }

    #[must_use]
    pub fn between(start: impl Into<PatientExpr>, end: impl Into<PatientExpr>) -> Self {
        Self::DateBetween(Box::new(start.into()), Box::new(end.into()))
    }

    #[must_use]
    pub fn text_in(field: TextField, values: &[&str]) -> Self {
        Self::TextIn {
            field,
            values: values.iter().map(|value| (*value).to_string()).collect(),
        }
    }

    /// Conjunction; `AlwaysTrue` operands are dropped
    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::AlwaysTrue, other) | (other, Self::AlwaysTrue) => other,
            (lhs, rhs) => Self::And(Box::new(lhs), Box::new(rhs)),
        }
    }

    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        Self::Or(Box::new(self), Box::new(rhs))
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Check the predicate against the table it filters
    pub fn validate(&self, table: Table, scope: &Scope) -> Result<()> {
        match self {
            Self::AlwaysTrue => Ok(()),
            Self::CodeIn { field, codelist } => check_codelist(table, *field, codelist),
            Self::CodeEq { field, .. } => table.code_system(*field).map(|_| ()).ok_or_else(|| {
                DatasetError::definition(format!("table '{table}' has no code field {field}"))
            }),
            Self::DateOnOrBefore(bound) | Self::DateOnOrAfter(bound) => check_bound(bound, scope),
            Self::DateBetween(start, end) => {
                check_bound(start, scope)?;
                check_bound(end, scope)
            }
            Self::TextIn { field, .. } => {
                if table.has_text_field(*field) {
                    Ok(())
                } else {
                    Err(DatasetError::definition(format!(
                        "table '{table}' has no text field {field}"
                    )))
                }
            }
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.validate(table, scope)?;
                rhs.validate(table, scope)
            }
            Self::Not(inner) => inner.validate(table, scope),
        }
    }

    /// Visit every date bound
    pub fn for_each_bound(&self, f: &mut dyn FnMut(&PatientExpr)) {
        match self {
            Self::DateOnOrBefore(bound) | Self::DateOnOrAfter(bound) => f(&**bound),
            Self::DateBetween(start, end) => {
                f(&**start);
                f(&**end);
            }
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.for_each_bound(f);
                rhs.for_each_bound(f);
            }
            Self::Not(inner) => inner.for_each_bound(f),
            Self::AlwaysTrue | Self::CodeIn { .. } | Self::CodeEq { .. } | Self::TextIn { .. } => {}
        }
    }

    /// Evaluate the date bounds for one patient
    pub fn resolve<F>(&self, bound: &mut F) -> Result<ResolvedPredicate<'_>>
    where
        F: FnMut(&PatientExpr) -> Result<Option<NaiveDate>>,
    {
        Ok(match self {
            Self::AlwaysTrue => ResolvedPredicate::AlwaysTrue,
            Self::CodeIn { field, codelist } => ResolvedPredicate::CodeIn {
                field: *field,
                codelist,
            },
            Self::CodeEq { field, code } => ResolvedPredicate::CodeEq {
                field: *field,
                code,
            },
            Self::DateOnOrBefore(end) => ResolvedPredicate::DateOnOrBefore(bound(&**end)?),
            Self::DateOnOrAfter(start) => ResolvedPredicate::DateOnOrAfter(bound(&**start)?),
            Self::DateBetween(start, end) => {
                ResolvedPredicate::DateBetween(bound(&**start)?, bound(&**end)?)
            }
            Self::TextIn { field, values } => ResolvedPredicate::TextIn {
                field: *field,
                values,
            },
            Self::And(lhs, rhs) => ResolvedPredicate::And(
                Box::new(lhs.resolve(bound)?),
                Box::new(rhs.resolve(bound)?),
            ),
            Self::Or(lhs, rhs) => ResolvedPredicate::Or(
                Box::new(lhs.resolve(bound)?),
                Box::new(rhs.resolve(bound)?),
            ),
            Self::Not(inner) => ResolvedPredicate::Not(Box::new(inner.resolve(bound)?)),
        })
    }
}

/// A predicate with its date bounds evaluated for one patient
#[derive(Debug, Clone)]
pub enum ResolvedPredicate<'q> {
    AlwaysTrue,
    CodeIn {
        field: CodeField,
        codelist: &'q Codelist,
    },
    CodeEq {
        field: CodeField,
        code: &'q str,
    },
    DateOnOrBefore(Option<NaiveDate>),
    DateOnOrAfter(Option<NaiveDate>),
    DateBetween(Option<NaiveDate>, Option<NaiveDate>),
    TextIn {
        field: TextField,
        values: &'q [String],
    },
    And(Box<ResolvedPredicate<'q>>, Box<ResolvedPredicate<'q>>),
    Or(Box<ResolvedPredicate<'q>>, Box<ResolvedPredicate<'q>>),
    Not(Box<ResolvedPredicate<'q>>),
}

impl ResolvedPredicate<'_> {
    /// Test a row; `None` means unknown
    #[must_use]
    pub fn test(&self, row: &dyn EventRecord) -> Option<bool> {
        match self {
            Self::AlwaysTrue => Some(true),
            Self::CodeIn { field, codelist } => row.matches_codelist(*field, codelist),
            Self::CodeEq { field, code } => {
                let codes = row.codes(*field);
                (!codes.is_empty()).then(|| codes.contains(code))
            }
            Self::DateOnOrBefore(end) => Some(row.date()? <= (*end)?),
            Self::DateOnOrAfter(start) => Some(row.date()? >= (*start)?),
            Self::DateBetween(start, end) => {
                let date = row.date()?;
                Some((*start)? <= date && date <= (*end)?)
            }
            Self::TextIn { field, values } => {
                let text = row.text(*field)?;
                Some(values.iter().any(|value| value == text))
            }
            Self::And(lhs, rhs) => kleene_and(lhs.test(row), rhs.test(row)),
            Self::Or(lhs, rhs) => kleene_or(lhs.test(row), rhs.test(row)),
            Self::Not(inner) => inner.test(row).map(|value| !value),
        }
    }

    /// Whether the row is kept
    #[must_use]
    pub fn keeps(&self, row: &dyn EventRecord) -> bool {
        self.test(row) == Some(true)
    }
}

/// Check that a codelist can be applied to a code field of a table
pub fn check_codelist(table: Table, field: CodeField, codelist: &Codelist) -> Result<()> {
    let Some(system) = table.code_system(field) else {
        return Err(DatasetError::definition(format!(
            "table '{table}' has no code field {field}"
        )));
    };
    if system != codelist.system() {
        return Err(DatasetError::definition(format!(
            "codelist '{}' holds {} codes but {table}.{field} holds {system} codes",
            codelist.name(),
            codelist.system()
        )));
    }
    Ok(())
}

fn check_bound(bound: &PatientExpr, scope: &Scope) -> Result<()> {
    match bound.check(scope)? {
        ValueType::Date => Ok(()),
        other => Err(DatasetError::definition(format!(
            "date bound must be a date expression, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codelist::CodeSystem;
    use crate::models::ClinicalEvent;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_null_bound_never_matches() {
        let row = ClinicalEvent::ctv3(1, date(2021, 1, 1), "X");
        let resolved = ResolvedPredicate::DateOnOrBefore(None);
        assert!(!resolved.keeps(&row));
        assert!(!ResolvedPredicate::Not(Box::new(resolved)).keeps(&row));
    }

    #[test]
    fn test_inverted_interval_is_empty() {
        let row = ClinicalEvent::ctv3(1, date(2021, 1, 1), "X");
        let resolved =
            ResolvedPredicate::DateBetween(Some(date(2022, 1, 1)), Some(date(2020, 1, 1)));
        assert_eq!(resolved.test(&row), Some(false));
    }

    #[test]
    fn test_codelist_system_mismatch_rejected() {
        let icd10 = Codelist::from_codes("icd", CodeSystem::Icd10, ["C61"]);
        assert!(check_codelist(Table::ClinicalEvents, CodeField::SnomedCt, &icd10).is_err());
        assert!(check_codelist(Table::Apcs, CodeField::AnyDiagnosis, &icd10).is_ok());
        assert!(check_codelist(Table::Medications, CodeField::AnyDiagnosis, &icd10).is_err());
    }

    #[test]
    fn test_and_drops_always_true() {
        let predicate = RowPredicate::always_true().and(RowPredicate::code_eq(CodeField::Ctv3, "X"));
        assert!(matches!(predicate, RowPredicate::CodeEq { .. }));
    }
}
