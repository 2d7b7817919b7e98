mod utils;

use std::sync::Arc;

use jak_cohort::matcher::derived::diagnosis_ever;
use jak_cohort::matcher::{
    BMI_CTV3, Source, count_matching, count_matching_between, exists_matching_before,
    first_matching_before, first_matching_between, first_matching_therapeutic_between,
    last_matching, last_matching_between, last_matching_therapeutic_between,
    matching_death_between, most_recent_bmi,
};
use jak_cohort::models::{
    BARICITINIB, ClinicalEvent, CodeField, Death, EmergencyAttendance, HospitalEpisode,
    OutpatientAppointment, TherapeuticIntervention, setting,
};
use jak_cohort::{CodeSystem, Codelist, PatientExpr, RowPredicate, Table, Value};
use utils::{date, evaluate, patient, study_codelists};

#[test]
fn test_prostate_cancer_from_primary_care_only() {
    let codelists = study_codelists();
    let mut records = patient(1);
    records
        .clinical_events
        .push(ClinicalEvent::snomed(1, date(2021, 6, 1), "399068003"));
    records
        .clinical_events
        .push(ClinicalEvent::snomed(1, date(2021, 1, 1), "254900004"));

    let flag = diagnosis_ever(
        &codelists.prostate_cancer_snomed,
        &codelists.prostate_cancer_icd10,
    );
    assert_eq!(evaluate(&records, &flag), Value::Bool(true));

    let first = first_matching_before(
        Source::CLINICAL_SNOMED,
        &codelists.prostate_cancer_snomed,
        date(2021, 6, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(
        evaluate(&records, &first.date()),
        Value::Date(date(2021, 1, 1))
    );
    assert_eq!(
        evaluate(&records, &first.code(CodeField::SnomedCt)),
        Value::from("254900004")
    );
}

#[test]
fn test_secondary_diagnosis_counts_towards_combined_flag() {
    let codelists = study_codelists();
    let mut records = patient(2);
    records
        .apcs
        .push(HospitalEpisode::new(2, date(2019, 3, 4), "I21.0").with_secondary("C50"));

    let flag = diagnosis_ever(&codelists.cancer_snomed, &codelists.cancer_icd10);
    assert_eq!(evaluate(&records, &flag), Value::Bool(true));

    let primary_only = exists_matching_before(
        Source::new(Table::Apcs, CodeField::PrimaryDiagnosis),
        &codelists.cancer_icd10,
        date(2030, 1, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &primary_only), Value::Bool(false));
}

#[test]
fn test_death_cause_counts_towards_combined_flag() {
    let codelists = study_codelists();
    let mut records = patient(3);
    records
        .ons_deaths
        .push(Death::new(3, date(2022, 2, 2), "I64", &["J18.9", "C61"]));

    let flag = diagnosis_ever(
        &codelists.prostate_cancer_snomed,
        &codelists.prostate_cancer_icd10,
    );
    assert_eq!(evaluate(&records, &flag), Value::Bool(true));
}

#[test]
fn test_no_records_gives_false_and_zero() {
    let codelists = study_codelists();
    let records = patient(4);

    let flag = diagnosis_ever(&codelists.cancer_snomed, &codelists.cancer_icd10);
    assert_eq!(evaluate(&records, &flag), Value::Bool(false));

    let count = count_matching(
        Source::APCS,
        &codelists.cancer_icd10,
        date(2020, 2, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &count), Value::Int(0));
}

#[test]
fn test_inverted_window_is_absent() {
    let codelists = study_codelists();
    let mut records = patient(5);
    records
        .apcs
        .push(HospitalEpisode::new(5, date(2021, 5, 1), "U07.1"));

    let first = first_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        date(2022, 1, 1),
        date(2021, 1, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &first.date()), Value::Null);

    let last = last_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        date(2022, 1, 1),
        date(2021, 1, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &last.date()), Value::Null);

    let count = count_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        date(2022, 1, 1),
        date(2021, 1, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &count), Value::Int(0));
}

#[test]
fn test_window_bounds_are_inclusive() {
    let codelists = study_codelists();
    let mut records = patient(6);
    records
        .apcs
        .push(HospitalEpisode::new(6, date(2021, 1, 1), "U07.1"));
    records
        .apcs
        .push(HospitalEpisode::new(6, date(2021, 12, 31), "U07.2"));

    let count = count_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        date(2021, 1, 1),
        date(2021, 12, 31),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &count), Value::Int(2));

    let last = last_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        date(2021, 1, 1),
        date(2021, 12, 31),
        RowPredicate::always_true(),
    );
    assert_eq!(
        evaluate(&records, &last.date()),
        Value::Date(date(2021, 12, 31))
    );
}

#[test]
fn test_empty_codelist_matches_nothing() {
    let empty = Arc::new(Codelist::empty("nothing", CodeSystem::Icd10));
    let mut records = patient(7);
    records
        .apcs
        .push(HospitalEpisode::new(7, date(2019, 1, 1), "C50"));

    let count = count_matching(
        Source::APCS,
        &empty,
        date(2020, 2, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &count), Value::Int(0));

    let first = first_matching_before(
        Source::APCS,
        &empty,
        date(2020, 2, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &first.date()), Value::Null);
}

#[test]
fn test_same_date_ties_keep_load_order() {
    let codelists = study_codelists();
    let mut records = patient(8);
    for code in ["9i0..", "9i1..", "9i2.."] {
        records
            .clinical_events
            .push(ClinicalEvent::ctv3(8, date(2018, 7, 7), code));
    }

    let first = first_matching_before(
        Source::CLINICAL_CTV3,
        &codelists.ethnicity_ctv3,
        date(2020, 2, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(
        evaluate(&records, &first.code(CodeField::Ctv3)),
        Value::from("9i0..")
    );

    let last = last_matching(
        Source::CLINICAL_CTV3,
        &codelists.ethnicity_ctv3,
        RowPredicate::always_true(),
    );
    assert_eq!(
        evaluate(&records, &last.code(CodeField::Ctv3)),
        Value::from("9i2..")
    );
    assert_eq!(
        evaluate(
            &records,
            &last.category(CodeField::Ctv3, &codelists.ethnicity_ctv3)
        ),
        Value::from("3")
    );
}

#[test]
fn test_extra_predicate_narrows_matches() {
    let codelists = study_codelists();
    let mut records = patient(9);
    records
        .apcs
        .push(HospitalEpisode::new(9, date(2021, 3, 1), "U07.1"));
    records
        .apcs
        .push(HospitalEpisode::new(9, date(2021, 4, 1), "J18.9").with_secondary("U07.1"));

    let primary = RowPredicate::code_in(CodeField::PrimaryDiagnosis, &codelists.covid_icd10);
    let count = count_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        date(2021, 1, 1),
        date(2021, 12, 31),
        primary,
    );
    assert_eq!(evaluate(&records, &count), Value::Int(1));
}

#[test]
fn test_window_anchored_on_another_expression() {
    let codelists = study_codelists();
    let mut records = patient(10);
    records
        .apcs
        .push(HospitalEpisode::new(10, date(2021, 3, 1), "U07.1"));

    // One year from the 60th birthday on 2020-06-01
    let start = PatientExpr::date_of_birth().add_days(365 * 60 + 15);
    let end = start.clone().add_days(365);
    let first = first_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        start,
        end,
        RowPredicate::always_true(),
    );
    assert_eq!(
        evaluate(&records, &first.date()),
        Value::Date(date(2021, 3, 1))
    );
}

#[test]
fn test_window_anchored_on_a_nested_query() {
    let codelists = study_codelists();
    let mut records = patient(12);
    for (day, code) in [
        (date(2020, 11, 1), "C50"),
        (date(2021, 3, 1), "U07.1"),
        (date(2021, 4, 1), "C50"),
        (date(2021, 9, 1), "C34"),
    ] {
        records.apcs.push(HospitalEpisode::new(12, day, code));
    }

    // Cancer admissions from the first COVID admission onwards
    let admitted = first_matching_before(
        Source::APCS,
        &codelists.covid_icd10,
        date(2024, 7, 1),
        RowPredicate::always_true(),
    )
    .date();
    let count = count_matching_between(
        Source::APCS,
        &codelists.cancer_icd10,
        admitted.clone(),
        date(2024, 7, 1),
        RowPredicate::on_or_after(admitted),
    );
    assert_eq!(evaluate(&records, &count), Value::Int(2));
}

#[test]
fn test_null_bound_matches_nothing() {
    let codelists = study_codelists();
    let mut records = patient(11);
    records
        .apcs
        .push(HospitalEpisode::new(11, date(2021, 3, 1), "U07.1"));

    let count = count_matching(
        Source::APCS,
        &codelists.covid_icd10,
        PatientExpr::date_of_death(),
        RowPredicate::always_true(),
    );
    assert_eq!(evaluate(&records, &count), Value::Int(0));
}

#[test]
fn test_outpatient_and_emergency_sources() {
    let codelists = study_codelists();
    let mut records = patient(12);
    records
        .opa_diag
        .push(OutpatientAppointment::new(12, date(2021, 2, 2), "U07.2"));
    records.emergency_care.push(EmergencyAttendance::new(
        12,
        date(2021, 8, 9),
        &["22298006", "1240751000000100"],
    ));

    let opa = first_matching_between(
        Source::OPA,
        &codelists.covid_icd10,
        date(2020, 2, 1),
        date(2024, 7, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(
        evaluate(&records, &opa.date()),
        Value::Date(date(2021, 2, 2))
    );

    let ec = first_matching_between(
        Source::EMERGENCY_CARE,
        &codelists.covid_ec_snomed,
        date(2020, 2, 1),
        date(2024, 7, 1),
        RowPredicate::always_true(),
    );
    assert_eq!(
        evaluate(&records, &ec.date()),
        Value::Date(date(2021, 8, 9))
    );
}

#[test]
fn test_therapeutics_by_setting() {
    let mut records = patient(13);
    records.covid_therapeutics.push(TherapeuticIntervention::new(
        13,
        BARICITINIB,
        setting::HOSPITALISED_WITH,
        date(2021, 1, 10),
    ));
    records.covid_therapeutics.push(TherapeuticIntervention::new(
        13,
        BARICITINIB,
        setting::HOSPITALISED_WITH,
        date(2021, 9, 1),
    ));
    records.covid_therapeutics.push(TherapeuticIntervention::new(
        13,
        "Tocilizumab",
        setting::NON_HOSPITALISED,
        date(2021, 2, 1),
    ));

    let (start, end) = (date(2020, 2, 1), date(2024, 7, 1));
    let first = first_matching_therapeutic_between(
        BARICITINIB,
        setting::HOSPITALISED_WITH,
        start,
        end,
        RowPredicate::always_true(),
    );
    let last = last_matching_therapeutic_between(
        BARICITINIB,
        setting::HOSPITALISED_WITH,
        start,
        end,
        RowPredicate::always_true(),
    );
    let outpatient = first_matching_therapeutic_between(
        BARICITINIB,
        setting::NON_HOSPITALISED,
        start,
        end,
        RowPredicate::always_true(),
    );

    assert_eq!(
        evaluate(&records, &first.date()),
        Value::Date(date(2021, 1, 10))
    );
    assert_eq!(
        evaluate(&records, &last.date()),
        Value::Date(date(2021, 9, 1))
    );
    assert_eq!(evaluate(&records, &outpatient.date()), Value::Null);
}

#[test]
fn test_death_with_matching_cause_in_window() {
    let codelists = study_codelists();
    let mut records = patient(14);
    records
        .ons_deaths
        .push(Death::new(14, date(2021, 1, 20), "J18.9", &["U07.1"]));

    let in_window = matching_death_between(&codelists.covid_icd10, date(2020, 2, 1), date(2024, 7, 1));
    let before = matching_death_between(&codelists.covid_icd10, date(2022, 1, 1), date(2024, 7, 1));
    assert_eq!(evaluate(&records, &in_window), Value::Bool(true));
    assert_eq!(evaluate(&records, &before), Value::Bool(false));
}

#[test]
fn test_most_recent_bmi_respects_minimum_age() {
    let mut records = patient(15);
    // Born 1960-06-01: 16th birthday falls in 1976
    records
        .clinical_events
        .push(ClinicalEvent::ctv3(15, date(1975, 1, 1), BMI_CTV3).with_numeric_value(19.0));
    records
        .clinical_events
        .push(ClinicalEvent::ctv3(15, date(2015, 5, 5), BMI_CTV3).with_numeric_value(27.4));
    records
        .clinical_events
        .push(ClinicalEvent::ctv3(15, date(2022, 5, 5), BMI_CTV3).with_numeric_value(31.0));

    let bmi = most_recent_bmi(16.0, RowPredicate::on_or_before(date(2020, 2, 1)));
    assert_eq!(evaluate(&records, &bmi.numeric_value()), Value::Float(27.4));
    assert_eq!(
        evaluate(&records, &bmi.date()),
        Value::Date(date(2015, 5, 5))
    );

    let only_child = most_recent_bmi(16.0, RowPredicate::on_or_before(date(1980, 1, 1)));
    assert_eq!(evaluate(&records, &only_child.numeric_value()), Value::Null);
}
