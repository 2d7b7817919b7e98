//! Secondary care records: hospital episodes, outpatient appointments and
//! emergency care attendances
//!
//! All diagnoses in hospital and outpatient records are ICD-10 codes;
//! emergency care diagnoses are SNOMED CT codes held in 24 fixed slots.

use chrono::NaiveDate;
use jak_cohort_macros::TableRecord;

use crate::models::record::{CodeField, Codes, EventRecord, present_codes};

/// Number of diagnosis slots of an emergency care attendance
pub const EMERGENCY_DIAGNOSIS_SLOTS: usize = 24;

/// An admitted patient care spell
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "apcs")]
pub struct HospitalEpisode {
    pub patient_id: i64,
    pub admission_date: Option<NaiveDate>,
    pub discharge_date: Option<NaiveDate>,
    pub primary_diagnosis: Option<String>,
    /// Secondary diagnoses, read from a delimited string or a list column
    #[column(name = "secondary_diagnosis", or_default)]
    pub secondary_diagnoses: Vec<String>,
}

impl HospitalEpisode {
    #[must_use]
    pub fn new(patient_id: i64, admission_date: NaiveDate, primary_diagnosis: &str) -> Self {
        Self {
            patient_id,
            admission_date: Some(admission_date),
            primary_diagnosis: Some(primary_diagnosis.to_string()),
            ..Self::default()
        }
    }

    /// Add a secondary diagnosis
    #[must_use]
    pub fn with_secondary(mut self, code: &str) -> Self {
        self.secondary_diagnoses.push(code.to_string());
        self
    }

    /// Set the discharge date
    #[must_use]
    pub const fn with_discharge_date(mut self, discharge_date: NaiveDate) -> Self {
        self.discharge_date = Some(discharge_date);
        self
    }
}

impl EventRecord for HospitalEpisode {
    fn patient_id(&self) -> i64 {
        self.patient_id
    }

    fn date(&self) -> Option<NaiveDate> {
        self.admission_date
    }

    fn end_date(&self) -> Option<NaiveDate> {
        self.discharge_date
    }

    fn codes(&self, field: CodeField) -> Codes<'_> {
        let primary = self.primary_diagnosis.as_deref();
        let secondary = self.secondary_diagnoses.iter().map(String::as_str);
        match field {
            CodeField::PrimaryDiagnosis => primary.into_iter().collect(),
            CodeField::SecondaryDiagnosis => secondary.collect(),
            CodeField::AnyDiagnosis => primary.into_iter().chain(secondary).collect(),
            _ => Codes::new(),
        }
    }
}

/// An outpatient appointment with coded diagnoses
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "opa_diag")]
pub struct OutpatientAppointment {
    pub patient_id: i64,
    pub appointment_date: Option<NaiveDate>,
    pub primary_diagnosis_code: Option<String>,
    pub secondary_diagnosis_code_1: Option<String>,
}

impl OutpatientAppointment {
    #[must_use]
    pub fn new(patient_id: i64, appointment_date: NaiveDate, primary_diagnosis_code: &str) -> Self {
        Self {
            patient_id,
            appointment_date: Some(appointment_date),
            primary_diagnosis_code: Some(primary_diagnosis_code.to_string()),
            secondary_diagnosis_code_1: None,
        }
    }
}

impl EventRecord for OutpatientAppointment {
    fn patient_id(&self) -> i64 {
        self.patient_id
    }

    fn date(&self) -> Option<NaiveDate> {
        self.appointment_date
    }

    fn codes(&self, field: CodeField) -> Codes<'_> {
        let primary = self.primary_diagnosis_code.as_deref();
        let secondary = self.secondary_diagnosis_code_1.as_deref();
        match field {
            CodeField::PrimaryDiagnosis => primary.into_iter().collect(),
            CodeField::SecondaryDiagnosis => secondary.into_iter().collect(),
            CodeField::AnyDiagnosis => primary.into_iter().chain(secondary).collect(),
            _ => Codes::new(),
        }
    }
}

/// An emergency care attendance
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "ec")]
pub struct EmergencyAttendance {
    pub patient_id: i64,
    pub arrival_date: Option<NaiveDate>,
    /// `diagnosis_01` .. `diagnosis_24`
    #[column(prefix = "diagnosis_", count = 24)]
    pub diagnoses: [Option<String>; EMERGENCY_DIAGNOSIS_SLOTS],
}

impl EmergencyAttendance {
    /// Attendance with the given diagnoses filling the first slots
    ///
    /// Codes beyond the last slot are ignored.
    #[must_use]
    pub fn new(patient_id: i64, arrival_date: NaiveDate, codes: &[&str]) -> Self {
        let mut diagnoses: [Option<String>; EMERGENCY_DIAGNOSIS_SLOTS] = Default::default();
        for (slot, code) in diagnoses.iter_mut().zip(codes) {
            *slot = Some((*code).to_string());
        }
        Self {
            patient_id,
            arrival_date: Some(arrival_date),
            diagnoses,
        }
    }
}

impl EventRecord for EmergencyAttendance {
    fn patient_id(&self) -> i64 {
        self.patient_id
    }

    fn date(&self) -> Option<NaiveDate> {
        self.arrival_date
    }

    fn codes(&self, field: CodeField) -> Codes<'_> {
        match field {
            CodeField::PrimaryDiagnosis => present_codes(&self.diagnoses[..1]),
            CodeField::AnyDiagnosis => present_codes(&self.diagnoses),
            _ => Codes::new(),
        }
    }
}
