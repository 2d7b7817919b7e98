//! Temporal record matcher
//!
//! Parametrised query builders over the event tables. A [`Source`] names a
//! table and the code field to match; each helper filters the source by a
//! codelist and a date window, narrows it by an extra row predicate, and
//! reduces it to a count, an existence flag or a picked record.
//!
//! Every helper returns a query description; nothing is evaluated here. Date
//! parameters are patient-level expressions, so a window can be anchored on
//! a literal date or on another variable.
//!
//! # Contract
//!
//! - An empty codelist matches nothing.
//! - A window whose start is after its end matches nothing.
//! - A null boundary date matches nothing.

pub mod derived;

use std::sync::Arc;

use crate::codelist::Codelist;
use crate::models::{CodeField, TextField};
use crate::query::{EventQuery, PatientExpr, RecordSelection, RowPredicate};
use crate::tables::Table;

/// A table together with the code field matched against a codelist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    pub table: Table,
    pub field: CodeField,
}

impl Source {
    /// Primary care events coded in CTV3
    pub const CLINICAL_CTV3: Self = Self::new(Table::ClinicalEvents, CodeField::Ctv3);
    /// Primary care events coded in SNOMED CT
    pub const CLINICAL_SNOMED: Self = Self::new(Table::ClinicalEvents, CodeField::SnomedCt);
    /// Prescriptions coded in dm+d
    pub const MEDICATION_DMD: Self = Self::new(Table::Medications, CodeField::Dmd);
    /// Hospital episodes, primary or any secondary diagnosis
    pub const APCS: Self = Self::new(Table::Apcs, CodeField::AnyDiagnosis);
    /// Outpatient appointments, primary or first secondary diagnosis
    pub const OPA: Self = Self::new(Table::OpaDiag, CodeField::AnyDiagnosis);
    /// Emergency care attendances, any of the diagnosis slots
    pub const EMERGENCY_CARE: Self = Self::new(Table::EmergencyCare, CodeField::AnyDiagnosis);
    /// Death registrations, underlying or any recorded cause
    pub const DEATHS: Self = Self::new(Table::OnsDeaths, CodeField::AnyCause);

    #[must_use]
    pub const fn new(table: Table, field: CodeField) -> Self {
        Self { table, field }
    }
}

/// The dates an event may fall on
#[derive(Debug, Clone)]
pub enum DateWindow {
    /// No date restriction
    Ever,
    /// On or before the date
    OnOrBefore(PatientExpr),
    /// Within the closed interval
    Between(PatientExpr, PatientExpr),
}

impl DateWindow {
    #[must_use]
    pub fn on_or_before(date: impl Into<PatientExpr>) -> Self {
        Self::OnOrBefore(date.into())
    }

    #[must_use]
    pub fn between(start: impl Into<PatientExpr>, end: impl Into<PatientExpr>) -> Self {
        Self::Between(start.into(), end.into())
    }

    fn predicate(self) -> RowPredicate {
        match self {
            Self::Ever => RowPredicate::always_true(),
            Self::OnOrBefore(date) => RowPredicate::on_or_before(date),
            Self::Between(start, end) => RowPredicate::between(start, end),
        }
    }

    /// Rows of `source` with a code in `codelist`, dated within the window
    /// and satisfying `extra`
    #[must_use]
    pub fn matching_query(
        self,
        source: Source,
        codelist: &Arc<Codelist>,
        extra: RowPredicate,
    ) -> EventQuery {
        EventQuery::new(source.table)
            .filter(extra)
            .filter(RowPredicate::code_in(source.field, codelist))
            .filter(self.predicate())
    }
}

/// Number of matching records on or before `as_of`; 0 when none match
#[must_use]
pub fn count_matching(
    source: Source,
    codelist: &Arc<Codelist>,
    as_of: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> PatientExpr {
    DateWindow::on_or_before(as_of)
        .matching_query(source, codelist, extra)
        .count()
}

/// Number of matching records within `[start, end]`
#[must_use]
pub fn count_matching_between(
    source: Source,
    codelist: &Arc<Codelist>,
    start: impl Into<PatientExpr>,
    end: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> PatientExpr {
    DateWindow::between(start, end)
        .matching_query(source, codelist, extra)
        .count()
}

/// Whether any record matches on or before `as_of`
#[must_use]
pub fn exists_matching_before(
    source: Source,
    codelist: &Arc<Codelist>,
    as_of: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> PatientExpr {
    DateWindow::on_or_before(as_of)
        .matching_query(source, codelist, extra)
        .exists()
}

/// Earliest matching record on or before `as_of`
#[must_use]
pub fn first_matching_before(
    source: Source,
    codelist: &Arc<Codelist>,
    as_of: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> RecordSelection {
    DateWindow::on_or_before(as_of)
        .matching_query(source, codelist, extra)
        .first()
}

/// Latest matching record on or before `as_of`
#[must_use]
pub fn last_matching_before(
    source: Source,
    codelist: &Arc<Codelist>,
    as_of: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> RecordSelection {
    DateWindow::on_or_before(as_of)
        .matching_query(source, codelist, extra)
        .last()
}

/// Earliest matching record within `[start, end]`
#[must_use]
pub fn first_matching_between(
    source: Source,
    codelist: &Arc<Codelist>,
    start: impl Into<PatientExpr>,
    end: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> RecordSelection {
    DateWindow::between(start, end)
        .matching_query(source, codelist, extra)
        .first()
}

/// Latest matching record within `[start, end]`
#[must_use]
pub fn last_matching_between(
    source: Source,
    codelist: &Arc<Codelist>,
    start: impl Into<PatientExpr>,
    end: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> RecordSelection {
    DateWindow::between(start, end)
        .matching_query(source, codelist, extra)
        .last()
}

/// Earliest matching record over the whole history
#[must_use]
pub fn first_matching(
    source: Source,
    codelist: &Arc<Codelist>,
    extra: RowPredicate,
) -> RecordSelection {
    DateWindow::Ever.matching_query(source, codelist, extra).first()
}

/// Latest matching record over the whole history
#[must_use]
pub fn last_matching(
    source: Source,
    codelist: &Arc<Codelist>,
    extra: RowPredicate,
) -> RecordSelection {
    DateWindow::Ever.matching_query(source, codelist, extra).last()
}

/// Treatments with `intervention` given in an indication `setting`, started
/// within `[start, end]`
///
/// # Arguments
/// * `intervention` - Intervention name, e.g. [`BARICITINIB`](crate::models::BARICITINIB)
/// * `setting` - One of [`setting`](crate::models::setting)
#[must_use]
pub fn therapeutic_query(
    intervention: &str,
    setting: &str,
    start: impl Into<PatientExpr>,
    end: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> EventQuery {
    EventQuery::new(Table::CovidTherapeutics)
        .filter(extra)
        .filter(RowPredicate::text_in(TextField::Intervention, &[intervention]))
        .filter(RowPredicate::text_in(TextField::CovidIndication, &[setting]))
        .filter(RowPredicate::between(start, end))
}

/// First treatment with `intervention` in `setting` within `[start, end]`
#[must_use]
pub fn first_matching_therapeutic_between(
    intervention: &str,
    setting: &str,
    start: impl Into<PatientExpr>,
    end: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> RecordSelection {
    therapeutic_query(intervention, setting, start, end, extra).first()
}

/// Last treatment with `intervention` in `setting` within `[start, end]`
#[must_use]
pub fn last_matching_therapeutic_between(
    intervention: &str,
    setting: &str,
    start: impl Into<PatientExpr>,
    end: impl Into<PatientExpr>,
    extra: RowPredicate,
) -> RecordSelection {
    therapeutic_query(intervention, setting, start, end, extra).last()
}

/// Whether a death registration within `[start, end]` lists a cause in
/// `codelist`
#[must_use]
pub fn matching_death_between(
    codelist: &Arc<Codelist>,
    start: impl Into<PatientExpr>,
    end: impl Into<PatientExpr>,
) -> PatientExpr {
    DateWindow::between(start, end)
        .matching_query(Source::DEATHS, codelist, RowPredicate::always_true())
        .exists()
}

/// Whether any death registration lists a cause in `codelist`
#[must_use]
pub fn cause_of_death_matches(codelist: &Arc<Codelist>) -> PatientExpr {
    DateWindow::Ever
        .matching_query(Source::DEATHS, codelist, RowPredicate::always_true())
        .exists()
}

/// CTV3 code of a recorded body mass index observation
pub const BMI_CTV3: &str = "22K..";

/// Latest recorded BMI taken at or after a minimum age
///
/// The age threshold is `date_of_birth + floor(365.25 * minimum_age)` days.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn most_recent_bmi(minimum_age_at_measurement: f64, extra: RowPredicate) -> RecordSelection {
    let threshold_days = (365.25 * minimum_age_at_measurement).floor() as i64;
    EventQuery::new(Table::ClinicalEvents)
        .filter(extra)
        .filter(RowPredicate::code_eq(CodeField::Ctv3, BMI_CTV3))
        .filter(RowPredicate::on_or_after(
            PatientExpr::date_of_birth().add_days(threshold_days),
        ))
        .last()
}
