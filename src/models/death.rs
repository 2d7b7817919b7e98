//! Registered deaths

use chrono::NaiveDate;
use jak_cohort_macros::TableRecord;

use crate::models::record::{CodeField, Codes, EventRecord, present_codes};

/// Number of contributing cause slots besides the underlying cause
pub const CAUSE_OF_DEATH_SLOTS: usize = 15;

/// A death registration with ICD-10 coded causes
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "ons_deaths")]
pub struct Death {
    pub patient_id: i64,
    pub date: Option<NaiveDate>,
    pub underlying_cause_of_death: Option<String>,
    /// `cause_of_death_01` .. `cause_of_death_15`
    #[column(prefix = "cause_of_death_", count = 15)]
    pub causes: [Option<String>; CAUSE_OF_DEATH_SLOTS],
}

impl Death {
    /// Death with an underlying cause and further contributing causes
    #[must_use]
    pub fn new(patient_id: i64, date: NaiveDate, underlying: &str, causes: &[&str]) -> Self {
        let mut slots: [Option<String>; CAUSE_OF_DEATH_SLOTS] = Default::default();
        for (slot, code) in slots.iter_mut().zip(causes) {
            *slot = Some((*code).to_string());
        }
        Self {
            patient_id,
            date: Some(date),
            underlying_cause_of_death: Some(underlying.to_string()),
            causes: slots,
        }
    }
}

impl EventRecord for Death {
    fn patient_id(&self) -> i64 {
        self.patient_id
    }

    fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn codes(&self, field: CodeField) -> Codes<'_> {
        match field {
            CodeField::UnderlyingCause => self.underlying_cause_of_death.as_deref().into_iter().collect(),
            CodeField::AnyCause => present_codes(
                std::iter::once(&self.underlying_cause_of_death).chain(&self.causes),
            ),
            _ => Codes::new(),
        }
    }
}
