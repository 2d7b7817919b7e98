//! Common view over event records
//!
//! Every event table exposes the same small surface to the query layer: one
//! ordering date, code fields, text fields and a numeric value. Tables with
//! several code slots report the union of their slots, so matching never
//! depends on column names at evaluation time.

use std::fmt;

use chrono::NaiveDate;
use smallvec::SmallVec;

use crate::codelist::Codelist;

/// Codes held by one code field of a record
pub type Codes<'a> = SmallVec<[&'a str; 4]>;

/// A code-bearing field of an event table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeField {
    /// Primary care CTV3 (Read v3) code
    Ctv3,
    /// Primary care SNOMED CT code
    SnomedCt,
    /// Medication dm+d code
    Dmd,
    /// Primary diagnosis of a hospital episode or outpatient appointment
    PrimaryDiagnosis,
    /// Secondary diagnoses of a hospital episode, or the first secondary
    /// diagnosis of an outpatient appointment
    SecondaryDiagnosis,
    /// Primary and secondary diagnoses together, or all emergency care
    /// diagnosis slots
    AnyDiagnosis,
    /// Underlying cause of death
    UnderlyingCause,
    /// Underlying cause and all recorded causes of death
    AnyCause,
}

impl fmt::Display for CodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ctv3 => "ctv3_code",
            Self::SnomedCt => "snomedct_code",
            Self::Dmd => "dmd_code",
            Self::PrimaryDiagnosis => "primary_diagnosis",
            Self::SecondaryDiagnosis => "secondary_diagnosis",
            Self::AnyDiagnosis => "any_diagnosis",
            Self::UnderlyingCause => "underlying_cause_of_death",
            Self::AnyCause => "any_cause_of_death",
        };
        f.write_str(name)
    }
}

/// A free-text field of an event table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    /// Name of the therapeutic intervention
    Intervention,
    /// Indication setting of a COVID-19 treatment
    CovidIndication,
    /// Current status of a COVID-19 treatment
    CurrentStatus,
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Intervention => "intervention",
            Self::CovidIndication => "covid_indication",
            Self::CurrentStatus => "current_status",
        };
        f.write_str(name)
    }
}

/// One row of an event table, as seen by the query layer
pub trait EventRecord: Send + Sync {
    /// Patient the record belongs to
    fn patient_id(&self) -> i64;

    /// Date used to order records and for date predicates
    fn date(&self) -> Option<NaiveDate>;

    /// Secondary date of the record (discharge date of a hospital episode)
    fn end_date(&self) -> Option<NaiveDate> {
        None
    }

    /// Codes of a code field; empty when the field is absent or null
    fn codes(&self, _field: CodeField) -> Codes<'_> {
        Codes::new()
    }

    /// Value of a text field
    fn text(&self, _field: TextField) -> Option<&str> {
        None
    }

    /// Numeric value recorded with the event
    fn numeric_value(&self) -> Option<f64> {
        None
    }

    /// First code of a field, which for diagnosis fields is the primary one
    fn code(&self, field: CodeField) -> Option<&str> {
        self.codes(field).first().copied()
    }

    /// Whether any code of `field` is in `codelist`
    ///
    /// `None` when the field holds no code at all.
    fn matches_codelist(&self, field: CodeField, codelist: &Codelist) -> Option<bool> {
        let codes = self.codes(field);
        if codes.is_empty() {
            return None;
        }
        Some(codes.iter().any(|code| codelist.contains(code)))
    }

    /// Category of the first code of `field` that is in `codelist`
    fn category<'c>(&self, field: CodeField, codelist: &'c Codelist) -> Option<&'c str> {
        self.codes(field)
            .iter()
            .find_map(|code| codelist.category(code))
    }
}

/// Collect the present values of code slots
pub(crate) fn present_codes<'a, I>(slots: I) -> Codes<'a>
where
    I: IntoIterator<Item = &'a Option<String>>,
{
    slots.into_iter().flatten().map(String::as_str).collect()
}
