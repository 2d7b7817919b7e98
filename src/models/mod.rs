//! Typed record shapes for the EHR tables
//!
//! Each struct describes one row of an externally supplied table and derives
//! [`TableRecord`](crate::tables::TableRecord) for loading. Event tables also
//! implement [`EventRecord`], the uniform view used by the query layer.

pub mod death;
pub mod events;
pub mod patient;
pub mod record;
pub mod secondary_care;
pub mod therapeutics;

pub use death::Death;
pub use events::{ClinicalEvent, Medication};
pub use patient::{Address, Patient, address_on};
pub use record::{CodeField, Codes, EventRecord, TextField};
pub use secondary_care::{EmergencyAttendance, HospitalEpisode, OutpatientAppointment};
pub use therapeutics::{BARICITINIB, TherapeuticIntervention, setting};
