//! Primary care records: coded clinical events and medications

use chrono::NaiveDate;
use jak_cohort_macros::TableRecord;

use crate::models::record::{CodeField, Codes, EventRecord};

/// A coded event in the primary care record
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "clinical_events")]
pub struct ClinicalEvent {
    pub patient_id: i64,
    pub date: Option<NaiveDate>,
    pub ctv3_code: Option<String>,
    pub snomedct_code: Option<String>,
    /// Value recorded with the code (e.g. a BMI measurement)
    pub numeric_value: Option<f64>,
}

impl ClinicalEvent {
    /// Event coded with CTV3
    #[must_use]
    pub fn ctv3(patient_id: i64, date: NaiveDate, code: &str) -> Self {
        Self {
            patient_id,
            date: Some(date),
            ctv3_code: Some(code.to_string()),
            ..Self::default()
        }
    }

    /// Event coded with SNOMED CT
    #[must_use]
    pub fn snomed(patient_id: i64, date: NaiveDate, code: &str) -> Self {
        Self {
            patient_id,
            date: Some(date),
            snomedct_code: Some(code.to_string()),
            ..Self::default()
        }
    }

    /// Attach a numeric value
    #[must_use]
    pub const fn with_numeric_value(mut self, value: f64) -> Self {
        self.numeric_value = Some(value);
        self
    }
}

impl EventRecord for ClinicalEvent {
    fn patient_id(&self) -> i64 {
        self.patient_id
    }

    fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn codes(&self, field: CodeField) -> Codes<'_> {
        let code = match field {
            CodeField::Ctv3 => self.ctv3_code.as_deref(),
            CodeField::SnomedCt => self.snomedct_code.as_deref(),
            _ => None,
        };
        code.into_iter().collect()
    }

    fn numeric_value(&self) -> Option<f64> {
        self.numeric_value
    }
}

/// A primary care prescription
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "medications")]
pub struct Medication {
    pub patient_id: i64,
    pub date: Option<NaiveDate>,
    pub dmd_code: Option<String>,
}

impl Medication {
    #[must_use]
    pub fn new(patient_id: i64, date: NaiveDate, dmd_code: &str) -> Self {
        Self {
            patient_id,
            date: Some(date),
            dmd_code: Some(dmd_code.to_string()),
        }
    }
}

impl EventRecord for Medication {
    fn patient_id(&self) -> i64 {
        self.patient_id
    }

    fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn codes(&self, field: CodeField) -> Codes<'_> {
        match field {
            CodeField::Dmd => self.dmd_code.as_deref().into_iter().collect(),
            _ => Codes::new(),
        }
    }
}
