//! Synthetic population generator
//!
//! Produces a plausible [`TableData`] for running the study definition
//! without access to real records. Codes are drawn from the study codelists
//! so that every variable has matches, and dates are spread around the study
//! period. Generation is deterministic for a given seed.

use chrono::{Datelike, NaiveDate, TimeDelta};
use rand::prelude::*;

use crate::codelist::{Codelist, StudyCodelists};
use crate::config::StudyDates;
use crate::matcher::BMI_CTV3;
use crate::matcher::derived::IMD_MAX_RANK;
use crate::models::{
    Address, BARICITINIB, ClinicalEvent, Death, EmergencyAttendance, HospitalEpisode, Medication,
    OutpatientAppointment, Patient, TherapeuticIntervention, setting,
};
use crate::tables::TableData;

/// Default number of generated patients
pub const DEFAULT_POPULATION_SIZE: usize = 10_000;

/// Default generator seed
pub const DEFAULT_SEED: u64 = 209_109;

/// Generator of synthetic patient records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyDataGenerator {
    population_size: usize,
    seed: u64,
}

impl Default for DummyDataGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_POPULATION_SIZE)
    }
}

/// Codes of a codelist in a stable order
struct CodePool<'a> {
    codes: Vec<&'a str>,
}

impl<'a> CodePool<'a> {
    fn new(codelist: &'a Codelist) -> Self {
        Self {
            codes: codelist.sorted_codes(),
        }
    }

    fn pick(&self, rng: &mut StdRng) -> Option<&'a str> {
        self.codes.choose(rng).copied()
    }
}

fn random_date(rng: &mut StdRng, from: NaiveDate, to: NaiveDate) -> NaiveDate {
    let span = (to - from).num_days().max(0);
    from + TimeDelta::days(rng.random_range(0..=span))
}

impl DummyDataGenerator {
    #[must_use]
    pub const fn new(population_size: usize) -> Self {
        Self {
            population_size,
            seed: DEFAULT_SEED,
        }
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub const fn population_size(&self) -> usize {
        self.population_size
    }

    /// Generate the tables of the whole population
    #[must_use]
    pub fn generate(&self, codelists: &StudyCodelists, dates: &StudyDates) -> TableData {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut data = TableData::default();
        let pools = Pools::new(codelists);

        for patient_id in 1..=self.population_size as i64 {
            Self::generate_patient(&mut rng, &pools, dates, patient_id, &mut data);
        }

        log::info!(
            "Generated dummy data for {} patients ({} clinical events, {} treatments)",
            data.patients.len(),
            data.clinical_events.len(),
            data.covid_therapeutics.len()
        );
        data
    }

    #[allow(clippy::too_many_lines)]
    fn generate_patient(
        rng: &mut StdRng,
        pools: &Pools<'_>,
        dates: &StudyDates,
        patient_id: i64,
        data: &mut TableData,
    ) {
        let (start, end) = (dates.study_start, dates.study_end);
        let earliest = NaiveDate::from_ymd_opt(1930, 1, 1).unwrap_or(start);
        let latest_birth = NaiveDate::from_ymd_opt(2005, 12, 1).unwrap_or(start);

        // Birth dates are rounded to the first of the month
        let birth = random_date(rng, earliest, latest_birth);
        let birth = birth.with_day(1).unwrap_or(birth);
        let history_start = birth.max(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(birth));
        let sex = match rng.random_range(0..100) {
            0..49 => "female",
            49..98 => "male",
            98 => "intersex",
            _ => "unknown",
        };

        let mut patient = Patient::new(patient_id)
            .with_date_of_birth(birth)
            .with_sex(sex);
        let died = rng.random_bool(0.05);
        let death_date = random_date(rng, start, end);
        if died && rng.random_bool(0.8) {
            patient = patient.with_date_of_death(death_date);
        }
        data.patients.push(patient);

        // Addresses: an older one may end before a current one starts
        let moved = rng.random_bool(0.3);
        let first_start = random_date(rng, history_start, start);
        let move_date = random_date(rng, first_start, end);
        for (address_start, address_end) in if moved {
            vec![(first_start, Some(move_date)), (move_date, None)]
        } else {
            vec![(first_start, None)]
        } {
            let care_home = rng.random_bool(0.02);
            data.addresses.push(Address {
                patient_id,
                start_date: Some(address_start),
                end_date: address_end,
                imd_rounded: rng
                    .random_bool(0.95)
                    .then(|| rng.random_range(0..=IMD_MAX_RANK / 100) * 100),
                care_home_is_potential_match: Some(care_home),
                care_home_requires_nursing: Some(care_home && rng.random_bool(0.5)),
                care_home_does_not_require_nursing: Some(care_home && rng.random_bool(0.5)),
            });
        }

        let before_start = |rng: &mut StdRng| random_date(rng, history_start, start);
        let during = |rng: &mut StdRng| random_date(rng, start, end);

        let mut clinical = |rng: &mut StdRng, pool: &CodePool<'_>, p: f64, snomed: bool| {
            if rng.random_bool(p) {
                if let Some(code) = pool.pick(rng) {
                    let date = before_start(rng);
                    data.clinical_events.push(if snomed {
                        ClinicalEvent::snomed(patient_id, date, code)
                    } else {
                        ClinicalEvent::ctv3(patient_id, date, code)
                    });
                }
            }
        };
        clinical(rng, &pools.ethnicity, 0.8, false);
        clinical(rng, &pools.smoking_clear, 0.7, false);
        clinical(rng, &pools.smoking_clear, 0.2, false);
        clinical(rng, &pools.smoking_unclear, 0.3, false);
        clinical(rng, &pools.carehome, 0.02, true);
        clinical(rng, &pools.cancer_snomed, 0.05, true);
        clinical(rng, &pools.pregnancy, 0.03, true);
        if sex == "male" {
            clinical(rng, &pools.prostate_snomed, 0.03, true);
        }

        if rng.random_bool(0.6) {
            let date = before_start(rng);
            let bmi = f64::from(rng.random_range(160..400_i32)) / 10.0;
            data.clinical_events
                .push(ClinicalEvent::ctv3(patient_id, date, BMI_CTV3).with_numeric_value(bmi));
        }

        if sex == "female" && rng.random_bool(0.08) {
            let pool = if rng.random_bool(0.5) {
                &pools.cocp
            } else {
                &pools.hrt
            };
            if let Some(code) = pool.pick(rng) {
                let date = before_start(rng);
                data.medications.push(Medication::new(patient_id, date, code));
            }
        }

        if rng.random_bool(0.03) {
            if let Some(code) = pools.cancer_icd10.pick(rng) {
                let date = before_start(rng);
                data.apcs.push(HospitalEpisode::new(patient_id, date, code));
            }
        }

        let covid_admission = rng.random_bool(0.08);
        if covid_admission {
            if let Some(code) = pools.covid_icd10.pick(rng) {
                let admitted = during(rng);
                let stay = TimeDelta::days(rng.random_range(0..30));
                // Half of the admissions record COVID-19 as a secondary diagnosis
                let episode = if rng.random_bool(0.5) {
                    HospitalEpisode::new(patient_id, admitted, "J18.9").with_secondary(code)
                } else {
                    HospitalEpisode::new(patient_id, admitted, code)
                };
                data.apcs.push(episode.with_discharge_date(admitted + stay));

                if rng.random_bool(0.4) {
                    let treated = admitted + TimeDelta::days(rng.random_range(0..5));
                    let indication = if rng.random_bool(0.8) {
                        setting::HOSPITALISED_WITH
                    } else {
                        setting::HOSPITAL_ONSET
                    };
                    data.covid_therapeutics.push(
                        TherapeuticIntervention::new(patient_id, BARICITINIB, indication, treated)
                            .with_status("Approved"),
                    );
                }
            }
        }

        if rng.random_bool(0.01) {
            let treated = during(rng);
            data.covid_therapeutics.push(TherapeuticIntervention::new(
                patient_id,
                BARICITINIB,
                setting::NON_HOSPITALISED,
                treated,
            ));
        }
        if rng.random_bool(0.02) {
            let indication = setting::ALL.choose(rng).copied().unwrap_or(setting::NON_HOSPITALISED);
            let treated = during(rng);
            data.covid_therapeutics.push(TherapeuticIntervention::new(
                patient_id,
                "Tocilizumab",
                indication,
                treated,
            ));
        }

        if rng.random_bool(0.03) {
            if let Some(code) = pools.covid_icd10.pick(rng) {
                let date = during(rng);
                data.opa_diag
                    .push(OutpatientAppointment::new(patient_id, date, code));
            }
        }
        if rng.random_bool(0.05) {
            if let Some(code) = pools.covid_ec.pick(rng) {
                let date = during(rng);
                data.emergency_care
                    .push(EmergencyAttendance::new(patient_id, date, &[code]));
            }
        }

        if died {
            let cause_pool = if covid_admission || rng.random_bool(0.2) {
                &pools.covid_icd10
            } else {
                &pools.cancer_icd10
            };
            let underlying = cause_pool.pick(rng).unwrap_or("R99");
            data.ons_deaths
                .push(Death::new(patient_id, death_date, underlying, &[]));
        }
    }
}

/// Code pools for every codelist the generator draws from
struct Pools<'a> {
    ethnicity: CodePool<'a>,
    smoking_clear: CodePool<'a>,
    smoking_unclear: CodePool<'a>,
    carehome: CodePool<'a>,
    cancer_snomed: CodePool<'a>,
    cancer_icd10: CodePool<'a>,
    pregnancy: CodePool<'a>,
    prostate_snomed: CodePool<'a>,
    cocp: CodePool<'a>,
    hrt: CodePool<'a>,
    covid_icd10: CodePool<'a>,
    covid_ec: CodePool<'a>,
}

impl<'a> Pools<'a> {
    fn new(codelists: &'a StudyCodelists) -> Self {
        Self {
            ethnicity: CodePool::new(&codelists.ethnicity_ctv3),
            smoking_clear: CodePool::new(&codelists.smoking_clear_ctv3),
            smoking_unclear: CodePool::new(&codelists.smoking_unclear_ctv3),
            carehome: CodePool::new(&codelists.carehome_snomed),
            cancer_snomed: CodePool::new(&codelists.cancer_snomed),
            cancer_icd10: CodePool::new(&codelists.cancer_icd10),
            pregnancy: CodePool::new(&codelists.pregnancy_snomed),
            prostate_snomed: CodePool::new(&codelists.prostate_cancer_snomed),
            cocp: CodePool::new(&codelists.cocp_dmd),
            hrt: CodePool::new(&codelists.hrt_dmd),
            covid_icd10: CodePool::new(&codelists.covid_icd10),
            covid_ec: CodePool::new(&codelists.covid_ec_snomed),
        }
    }
}
