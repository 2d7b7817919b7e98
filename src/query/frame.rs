//! Event queries and record selections
//!
//! An [`EventQuery`] describes the rows of one event table that satisfy a
//! predicate. It is reduced to a patient-level value by counting, testing for
//! existence, or picking the first or last row by date and reading a column
//! of the picked record.

use std::sync::Arc;

use crate::codelist::Codelist;
use crate::error::{DatasetError, Result};
use crate::models::{CodeField, TextField};
use crate::query::expr::{PatientExpr, Scope};
use crate::query::predicate::{RowPredicate, check_codelist};
use crate::query::value::ValueType;
use crate::tables::Table;

/// Which record to pick from the date-ordered matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Earliest date; the earliest loaded among equal dates
    First,
    /// Latest date; the latest loaded among equal dates
    Last,
}

/// A column readable from a picked record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// The ordering date of the table
    Date,
    /// The end date (discharge date of a hospital episode)
    EndDate,
    /// The first code of a code field
    Code(CodeField),
    NumericValue,
    Text(TextField),
}

impl Column {
    #[must_use]
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::Date | Self::EndDate => ValueType::Date,
            Self::Code(_) | Self::Text(_) => ValueType::Str,
            Self::NumericValue => ValueType::Float,
        }
    }

    /// Check that the column exists on `table`
    pub fn validate_on(self, table: Table) -> Result<()> {
        let present = match self {
            Self::Date => table.is_event_table(),
            Self::EndDate => table.has_end_date(),
            Self::Code(field) => table.code_system(field).is_some(),
            Self::NumericValue => table.has_numeric_value(),
            Self::Text(field) => table.has_text_field(field),
        };
        if present {
            Ok(())
        } else {
            Err(DatasetError::definition(format!(
                "table '{table}' has no column {self:?}"
            )))
        }
    }
}

/// The rows of an event table that satisfy a predicate
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub table: Table,
    pub predicate: RowPredicate,
}

impl EventQuery {
    /// All rows of `table`
    #[must_use]
    pub const fn new(table: Table) -> Self {
        Self {
            table,
            predicate: RowPredicate::AlwaysTrue,
        }
    }

    /// Narrow the query with a further predicate
    #[must_use]
    pub fn filter(mut self, predicate: RowPredicate) -> Self {
        self.predicate = self.predicate.and(predicate);
        self
    }

    /// Number of matching rows; 0 when nothing matches
    #[must_use]
    pub fn count(self) -> PatientExpr {
        PatientExpr::Count(self)
    }

    /// Whether any row matches
    #[must_use]
    pub fn exists(self) -> PatientExpr {
        PatientExpr::Exists(self)
    }

    /// The earliest matching row
    #[must_use]
    pub fn first(self) -> RecordSelection {
        RecordSelection {
            query: self,
            position: Position::First,
        }
    }

    /// The latest matching row
    #[must_use]
    pub fn last(self) -> RecordSelection {
        RecordSelection {
            query: self,
            position: Position::Last,
        }
    }

    /// Check the query against its table
    pub fn validate(&self, scope: &Scope) -> Result<()> {
        if !self.table.is_event_table() {
            return Err(DatasetError::definition(format!(
                "table '{}' is not an event table",
                self.table
            )));
        }
        self.predicate.validate(self.table, scope)
    }
}

/// One record picked from an event query, possibly absent
///
/// Every accessor yields null when no record matched.
#[derive(Debug, Clone)]
pub struct RecordSelection {
    pub query: EventQuery,
    pub position: Position,
}

impl RecordSelection {
    /// Read a column of the picked record
    #[must_use]
    pub fn column(&self, column: Column) -> PatientExpr {
        PatientExpr::Pick {
            query: self.query.clone(),
            position: self.position,
            column,
        }
    }

    #[must_use]
    pub fn date(&self) -> PatientExpr {
        self.column(Column::Date)
    }

    #[must_use]
    pub fn end_date(&self) -> PatientExpr {
        self.column(Column::EndDate)
    }

    #[must_use]
    pub fn code(&self, field: CodeField) -> PatientExpr {
        self.column(Column::Code(field))
    }

    #[must_use]
    pub fn numeric_value(&self) -> PatientExpr {
        self.column(Column::NumericValue)
    }

    #[must_use]
    pub fn text(&self, field: TextField) -> PatientExpr {
        self.column(Column::Text(field))
    }

    /// Whether a record was picked
    #[must_use]
    pub fn exists(&self) -> PatientExpr {
        self.query.clone().exists()
    }

    /// Category of the picked record's code in a categorised codelist
    #[must_use]
    pub fn category(&self, field: CodeField, codelist: &Arc<Codelist>) -> PatientExpr {
        PatientExpr::Category {
            query: self.query.clone(),
            position: self.position,
            field,
            codelist: Arc::clone(codelist),
        }
    }

    /// Check the selection and a code field used with `codelist`
    pub(crate) fn validate_category(
        query: &EventQuery,
        field: CodeField,
        codelist: &Codelist,
        scope: &Scope,
    ) -> Result<()> {
        query.validate(scope)?;
        check_codelist(query.table, field, codelist)
    }
}
