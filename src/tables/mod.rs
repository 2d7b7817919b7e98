//! Record tables and per-patient grouping
//!
//! Tables are loaded whole (see [`loader`]) into [`TableData`] and then
//! grouped by patient into [`PatientTables`], the population the dataset is
//! evaluated over. Each patient's records keep table load order, which is
//! the tie-break order for records sharing a date.

pub mod extract;
pub mod loader;

use std::fmt;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;

use crate::codelist::CodeSystem;
use crate::error::{DatasetError, Result};
use crate::models::{
    Address, ClinicalEvent, CodeField, Death, EmergencyAttendance, EventRecord, HospitalEpisode,
    Medication, OutpatientAppointment, Patient, TextField, TherapeuticIntervention,
};

pub use loader::{load_tables, read_table};

/// A struct that can be read from the rows of a table
///
/// Implemented through `#[derive(TableRecord)]`.
pub trait TableRecord: Sized + Send + 'static {
    /// Table name, also the file or directory name under the data directory
    const TABLE_NAME: &'static str;

    /// Arrow schema of the columns the record reads
    fn schema() -> SchemaRef;

    /// Convert every row of a batch into a record
    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;
}

/// The tables a dataset definition can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Patients,
    Addresses,
    ClinicalEvents,
    Medications,
    Apcs,
    OpaDiag,
    EmergencyCare,
    OnsDeaths,
    CovidTherapeutics,
}

impl Table {
    /// Every table, in load order
    pub const ALL: [Self; 9] = [
        Self::Patients,
        Self::Addresses,
        Self::ClinicalEvents,
        Self::Medications,
        Self::Apcs,
        Self::OpaDiag,
        Self::EmergencyCare,
        Self::OnsDeaths,
        Self::CovidTherapeutics,
    ];

    /// Name of the table in the data directory
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Patients => Patient::TABLE_NAME,
            Self::Addresses => Address::TABLE_NAME,
            Self::ClinicalEvents => ClinicalEvent::TABLE_NAME,
            Self::Medications => Medication::TABLE_NAME,
            Self::Apcs => HospitalEpisode::TABLE_NAME,
            Self::OpaDiag => OutpatientAppointment::TABLE_NAME,
            Self::EmergencyCare => EmergencyAttendance::TABLE_NAME,
            Self::OnsDeaths => Death::TABLE_NAME,
            Self::CovidTherapeutics => TherapeuticIntervention::TABLE_NAME,
        }
    }

    /// Whether rows of the table can be filtered and picked as events
    #[must_use]
    pub const fn is_event_table(self) -> bool {
        !matches!(self, Self::Patients | Self::Addresses)
    }

    /// Coding system of a code field of this table, `None` if the table has
    /// no such field
    #[must_use]
    pub const fn code_system(self, field: CodeField) -> Option<CodeSystem> {
        use CodeField as F;
        match (self, field) {
            (Self::ClinicalEvents, F::Ctv3) => Some(CodeSystem::Ctv3),
            (Self::ClinicalEvents, F::SnomedCt) => Some(CodeSystem::SnomedCt),
            (Self::Medications, F::Dmd) => Some(CodeSystem::Dmd),
            (
                Self::Apcs | Self::OpaDiag,
                F::PrimaryDiagnosis | F::SecondaryDiagnosis | F::AnyDiagnosis,
            ) => Some(CodeSystem::Icd10),
            (Self::EmergencyCare, F::PrimaryDiagnosis | F::AnyDiagnosis) => {
                Some(CodeSystem::SnomedCt)
            }
            (Self::OnsDeaths, F::UnderlyingCause | F::AnyCause) => Some(CodeSystem::Icd10),
            _ => None,
        }
    }

    /// Whether the table has a text field
    #[must_use]
    pub const fn has_text_field(self, _field: TextField) -> bool {
        matches!(self, Self::CovidTherapeutics)
    }

    /// Whether the table records a numeric value
    #[must_use]
    pub const fn has_numeric_value(self) -> bool {
        matches!(self, Self::ClinicalEvents)
    }

    /// Whether the table records an end date
    #[must_use]
    pub const fn has_end_date(self) -> bool {
        matches!(self, Self::Apcs)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Loaded tables, not yet grouped by patient
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub patients: Vec<Patient>,
    pub addresses: Vec<Address>,
    pub clinical_events: Vec<ClinicalEvent>,
    pub medications: Vec<Medication>,
    pub apcs: Vec<HospitalEpisode>,
    pub opa_diag: Vec<OutpatientAppointment>,
    pub emergency_care: Vec<EmergencyAttendance>,
    pub ons_deaths: Vec<Death>,
    pub covid_therapeutics: Vec<TherapeuticIntervention>,
}

impl TableData {
    /// Number of rows in a table
    #[must_use]
    pub fn row_count(&self, table: Table) -> usize {
        match table {
            Table::Patients => self.patients.len(),
            Table::Addresses => self.addresses.len(),
            Table::ClinicalEvents => self.clinical_events.len(),
            Table::Medications => self.medications.len(),
            Table::Apcs => self.apcs.len(),
            Table::OpaDiag => self.opa_diag.len(),
            Table::EmergencyCare => self.emergency_care.len(),
            Table::OnsDeaths => self.ons_deaths.len(),
            Table::CovidTherapeutics => self.covid_therapeutics.len(),
        }
    }
}

/// All records of one patient
#[derive(Debug, Clone, Default)]
pub struct PatientRecords {
    pub patient: Patient,
    pub addresses: Vec<Address>,
    pub clinical_events: Vec<ClinicalEvent>,
    pub medications: Vec<Medication>,
    pub apcs: Vec<HospitalEpisode>,
    pub opa_diag: Vec<OutpatientAppointment>,
    pub emergency_care: Vec<EmergencyAttendance>,
    /// At most one registration is expected, but duplicates are kept
    pub ons_deaths: Vec<Death>,
    pub covid_therapeutics: Vec<TherapeuticIntervention>,
}

impl PatientRecords {
    /// Records of a patient with no events
    #[must_use]
    pub fn new(patient: Patient) -> Self {
        Self {
            patient,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn patient_id(&self) -> i64 {
        self.patient.patient_id
    }

    /// Rows of an event table in load order
    #[must_use]
    pub fn events(&self, table: Table) -> Vec<&dyn EventRecord> {
        fn view<T: EventRecord>(rows: &[T]) -> Vec<&dyn EventRecord> {
            rows.iter().map(|row| row as &dyn EventRecord).collect()
        }

        match table {
            Table::Patients | Table::Addresses => Vec::new(),
            Table::ClinicalEvents => view(&self.clinical_events),
            Table::Medications => view(&self.medications),
            Table::Apcs => view(&self.apcs),
            Table::OpaDiag => view(&self.opa_diag),
            Table::EmergencyCare => view(&self.emergency_care),
            Table::OnsDeaths => view(&self.ons_deaths),
            Table::CovidTherapeutics => view(&self.covid_therapeutics),
        }
    }
}

/// The population: every patient with their records, ordered by patient id
#[derive(Debug, Clone, Default)]
pub struct PatientTables {
    patients: Vec<PatientRecords>,
}

impl PatientTables {
    /// Build the population from per-patient records
    ///
    /// Patients are sorted by id; duplicate ids are rejected.
    pub fn from_records(mut patients: Vec<PatientRecords>) -> Result<Self> {
        patients.sort_by_key(PatientRecords::patient_id);
        if let Some(pair) = patients
            .windows(2)
            .find(|pair| pair[0].patient_id() == pair[1].patient_id())
        {
            return Err(DatasetError::schema(
                Patient::TABLE_NAME,
                format!("duplicate patient_id {}", pair[0].patient_id()),
            ));
        }
        Ok(Self { patients })
    }

    /// Group loaded tables by patient
    ///
    /// Rows of patients missing from the patients table are dropped, since
    /// the population is defined by that table.
    pub fn group(data: TableData) -> Result<Self> {
        let TableData {
            patients,
            addresses,
            clinical_events,
            medications,
            apcs,
            opa_diag,
            emergency_care,
            ons_deaths,
            covid_therapeutics,
        } = data;

        let mut records: Vec<PatientRecords> =
            patients.into_iter().map(PatientRecords::new).collect();
        records.sort_by_key(PatientRecords::patient_id);

        let mut index: FxHashMap<i64, usize> =
            FxHashMap::with_capacity_and_hasher(records.len(), Default::default());
        for (position, record) in records.iter().enumerate() {
            if index.insert(record.patient_id(), position).is_some() {
                return Err(DatasetError::schema(
                    Patient::TABLE_NAME,
                    format!("duplicate patient_id {}", record.patient_id()),
                ));
            }
        }

        let mut orphans = 0usize;
        macro_rules! distribute {
            ($rows:expr, $field:ident) => {
                for row in $rows {
                    match index.get(&row.patient_id) {
                        Some(&position) => records[position].$field.push(row),
                        None => orphans += 1,
                    }
                }
            };
        }

        distribute!(addresses, addresses);
        distribute!(clinical_events, clinical_events);
        distribute!(medications, medications);
        distribute!(apcs, apcs);
        distribute!(opa_diag, opa_diag);
        distribute!(emergency_care, emergency_care);
        distribute!(ons_deaths, ons_deaths);
        distribute!(covid_therapeutics, covid_therapeutics);

        if orphans > 0 {
            log::warn!("Dropped {orphans} records of patients not in the patients table");
        }
        log::debug!("Grouped records for {} patients", records.len());

        Ok(Self { patients: records })
    }

    /// Number of patients
    #[must_use]
    pub fn len(&self) -> usize {
        self.patients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Patients in id order
    #[must_use]
    pub fn patients(&self) -> &[PatientRecords] {
        &self.patients
    }

    /// Records of one patient
    #[must_use]
    pub fn get(&self, patient_id: i64) -> Option<&PatientRecords> {
        self.patients
            .binary_search_by_key(&patient_id, PatientRecords::patient_id)
            .ok()
            .map(|position| &self.patients[position])
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_group_keeps_load_order_and_drops_orphans() {
        let day = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let data = TableData {
            patients: vec![Patient::new(2), Patient::new(1)],
            clinical_events: vec![
                ClinicalEvent::ctv3(1, day, "first"),
                ClinicalEvent::ctv3(3, day, "orphan"),
                ClinicalEvent::ctv3(1, day, "second"),
            ],
            ..TableData::default()
        };

        let tables = PatientTables::group(data).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables.patients()[0].patient_id(), 1);

        let events = &tables.get(1).unwrap().clinical_events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ctv3_code.as_deref(), Some("first"));
        assert!(tables.get(3).is_none());
    }

    #[test]
    fn test_duplicate_patients_rejected() {
        let data = TableData {
            patients: vec![Patient::new(1), Patient::new(1)],
            ..TableData::default()
        };
        assert!(PatientTables::group(data).is_err());
    }

    #[test]
    fn test_code_systems_by_table() {
        assert_eq!(
            Table::Apcs.code_system(CodeField::SecondaryDiagnosis),
            Some(CodeSystem::Icd10)
        );
        assert_eq!(
            Table::EmergencyCare.code_system(CodeField::AnyDiagnosis),
            Some(CodeSystem::SnomedCt)
        );
        assert_eq!(Table::Medications.code_system(CodeField::Ctv3), None);
    }
}
