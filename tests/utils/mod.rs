#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use jak_cohort::models::Patient;
use jak_cohort::query::EvalContext;
use jak_cohort::tables::PatientRecords;
use jak_cohort::{CodeSystem, Codelist, PatientExpr, StudyCodelists, StudyDates, Value};

/// Shorthand for a calendar date
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// The study period used throughout the tests
#[must_use]
pub fn study_dates() -> StudyDates {
    StudyDates::new(date(2020, 2, 1), date(2024, 7, 1)).unwrap()
}

/// Records of a patient born on 1960-06-01 with no events
#[must_use]
pub fn patient(patient_id: i64) -> PatientRecords {
    PatientRecords::new(
        Patient::new(patient_id)
            .with_date_of_birth(date(1960, 6, 1))
            .with_sex("male"),
    )
}

fn codes(name: &str, system: CodeSystem, codes: &[&str]) -> Arc<Codelist> {
    Arc::new(Codelist::from_codes(name, system, codes.iter().copied()))
}

fn categorised(name: &str, system: CodeSystem, codes: &[(&str, &str)]) -> Arc<Codelist> {
    Arc::new(Codelist::from_categorised(
        name,
        system,
        codes.iter().copied(),
    ))
}

/// Small in-memory versions of every study codelist
#[must_use]
pub fn study_codelists() -> StudyCodelists {
    StudyCodelists {
        prostate_cancer_icd10: codes("prostate_cancer_icd10", CodeSystem::Icd10, &["C61"]),
        prostate_cancer_snomed: codes(
            "prostate_cancer_snomed",
            CodeSystem::SnomedCt,
            &["399068003", "254900004"],
        ),
        pregnancy_snomed: codes("pregnancy_snomed", CodeSystem::SnomedCt, &["77386006"]),
        cocp_dmd: codes("cocp_dmd", CodeSystem::Dmd, &["3290911000001109"]),
        hrt_dmd: codes("hrt_dmd", CodeSystem::Dmd, &["4178811000001107"]),
        ethnicity_ctv3: categorised(
            "ethnicity_ctv3",
            CodeSystem::Ctv3,
            &[
                ("9i0..", "1"),
                ("9i1..", "2"),
                ("9i2..", "3"),
                ("9i3..", "4"),
                ("9i4..", "5"),
                ("9i5..", "6"),
            ],
        ),
        smoking_clear_ctv3: categorised(
            "smoking_clear_ctv3",
            CodeSystem::Ctv3,
            &[
                ("137R.", "S"),
                ("137S.", "E"),
                ("1371.", "N"),
                ("137Z.", "M"),
            ],
        ),
        smoking_unclear_ctv3: categorised(
            "smoking_unclear_ctv3",
            CodeSystem::Ctv3,
            &[
                ("137P.", "S"),
                ("137K.", "E"),
                ("137L.", "N"),
                ("137..", "M"),
            ],
        ),
        carehome_snomed: codes("carehome_snomed", CodeSystem::SnomedCt, &["160734000"]),
        cancer_snomed: codes("cancer_snomed", CodeSystem::SnomedCt, &["363346000"]),
        cancer_icd10: codes("cancer_icd10", CodeSystem::Icd10, &["C50", "C34"]),
        covid_icd10: codes("covid_icd10", CodeSystem::Icd10, &["U07.1", "U07.2"]),
        covid_ec_snomed: codes("covid_ec_snomed", CodeSystem::SnomedCt, &["1240751000000100"]),
    }
}

/// Evaluate one expression for a patient with no other variables bound
pub fn evaluate(records: &PatientRecords, expr: &PatientExpr) -> Value {
    EvalContext::new(records).evaluate(expr).unwrap()
}

/// Evaluate a sequence of named expressions, binding each for the next
pub fn evaluate_all(records: &PatientRecords, exprs: &[(&str, PatientExpr)]) -> Vec<Value> {
    let mut context = EvalContext::new(records);
    let mut values = Vec::with_capacity(exprs.len());
    for (name, expr) in exprs {
        let value = context.evaluate(expr).unwrap();
        context.bind(name, value.clone());
        values.push(value);
    }
    values
}
