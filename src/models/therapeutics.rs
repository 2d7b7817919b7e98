//! COVID-19 therapeutic interventions

use chrono::NaiveDate;
use jak_cohort_macros::TableRecord;

use crate::models::record::{EventRecord, TextField};

/// Intervention name of baricitinib in the therapeutics table
pub const BARICITINIB: &str = "Baricitinib";

/// Indication settings recorded with a treatment
pub mod setting {
    /// Treated after admission with COVID-19
    pub const HOSPITALISED_WITH: &str = "hospitalised_with";
    /// COVID-19 acquired in hospital
    pub const HOSPITAL_ONSET: &str = "hospital_onset";
    /// Treated in the community
    pub const NON_HOSPITALISED: &str = "non_hospitalised";

    /// All settings
    pub const ALL: [&str; 3] = [HOSPITALISED_WITH, HOSPITAL_ONSET, NON_HOSPITALISED];
}

/// A treatment episode with a COVID-19 therapeutic
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "covid_therapeutics")]
pub struct TherapeuticIntervention {
    pub patient_id: i64,
    pub intervention: Option<String>,
    pub covid_indication: Option<String>,
    pub treatment_start_date: Option<NaiveDate>,
    pub current_status: Option<String>,
}

impl TherapeuticIntervention {
    #[must_use]
    pub fn new(patient_id: i64, intervention: &str, indication: &str, start: NaiveDate) -> Self {
        Self {
            patient_id,
            intervention: Some(intervention.to_string()),
            covid_indication: Some(indication.to_string()),
            treatment_start_date: Some(start),
            current_status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: &str) -> Self {
        self.current_status = Some(status.to_string());
        self
    }
}

impl EventRecord for TherapeuticIntervention {
    fn patient_id(&self) -> i64 {
        self.patient_id
    }

    fn date(&self) -> Option<NaiveDate> {
        self.treatment_start_date
    }

    fn text(&self, field: TextField) -> Option<&str> {
        match field {
            TextField::Intervention => self.intervention.as_deref(),
            TextField::CovidIndication => self.covid_indication.as_deref(),
            TextField::CurrentStatus => self.current_status.as_deref(),
        }
    }
}
