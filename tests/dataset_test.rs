mod utils;

use std::fs::File;

use jak_cohort::dataset::{Kind, Role, evaluate_patient};
use jak_cohort::dummy::DummyDataGenerator;
use jak_cohort::matcher::derived::categorise;
use jak_cohort::models::{CodeField, HospitalEpisode};
use jak_cohort::query::{ValueType, coalesce};
use jak_cohort::study::build_dataset;
use jak_cohort::{
    CodeSystem, Codelist, Dataset, DatasetConfig, DatasetError, EventQuery, PatientExpr,
    PatientTables, RowPredicate, Table, Value, evaluate_dataset, write_output,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use utils::{date, patient, study_codelists, study_dates};

fn definition_message(result: jak_cohort::Result<()>) -> String {
    match result {
        Err(DatasetError::Definition(message)) => message,
        other => panic!("expected a definition error, got {other:?}"),
    }
}

#[test]
fn test_rejects_malformed_names() {
    let mut dataset = Dataset::new();
    for name in ["age", "cov_age", "cov_int_age", "xyz_num_age", "cov_num_Age"] {
        let message = definition_message(dataset.add(name, PatientExpr::literal(1i64)));
        assert!(message.contains("invalid variable name"), "{message}");
    }
}

#[test]
fn test_rejects_reference_to_undefined_variable() {
    let mut dataset = Dataset::new();
    let message = definition_message(dataset.add(
        "cov_bin_after_admission",
        PatientExpr::variable("tmp_date_admission").is_not_null(),
    ));
    assert!(message.contains("cov_bin_after_admission"), "{message}");
    assert!(message.contains("tmp_date_admission"), "{message}");
}

#[test]
fn test_references_follow_definition_order() {
    let codelists = study_codelists();
    let mut dataset = Dataset::new();
    dataset
        .add(
            "tmp_date_admission",
            EventQuery::new(Table::Apcs)
                .filter(RowPredicate::code_in(
                    CodeField::AnyDiagnosis,
                    &codelists.covid_icd10,
                ))
                .first()
                .date(),
        )
        .unwrap();
    dataset
        .add(
            "out_bin_admitted",
            PatientExpr::variable("tmp_date_admission").is_not_null(),
        )
        .unwrap();

    let dependencies = dataset.dependencies("out_bin_admitted").unwrap();
    assert!(dependencies.contains("tmp_date_admission"));
    assert_eq!(dataset.get("tmp_date_admission").unwrap().role, Role::Temporary);
    assert_eq!(dataset.get("out_bin_admitted").unwrap().kind, Kind::Binary);

    // A helper is evaluated but never written
    let written: Vec<&str> = dataset.output_columns().map(|v| v.name.as_str()).collect();
    assert_eq!(written, ["out_bin_admitted"]);
    assert!(dataset.required_tables().contains(&Table::Apcs));
    assert!(dataset.required_tables().contains(&Table::Patients));
}

#[test]
fn test_rejects_codelist_of_wrong_system() {
    let codelists = study_codelists();
    let mut dataset = Dataset::new();
    let message = definition_message(dataset.add(
        "cov_bin_cancer_primary_care",
        EventQuery::new(Table::ClinicalEvents)
            .filter(RowPredicate::code_in(
                CodeField::SnomedCt,
                &codelists.cancer_icd10,
            ))
            .exists(),
    ));
    assert!(message.contains("cancer_icd10"), "{message}");
}

#[test]
fn test_rejects_code_field_missing_from_table() {
    let codelists = study_codelists();
    let mut dataset = Dataset::new();
    let result = dataset.add(
        "cov_bin_prescribed",
        EventQuery::new(Table::Medications)
            .filter(RowPredicate::code_in(CodeField::Ctv3, &codelists.cocp_dmd))
            .exists(),
    );
    assert!(result.is_err());
}

#[test]
fn test_written_categories_need_a_fallback() {
    let codelists = study_codelists();
    let ethnicity = EventQuery::new(Table::ClinicalEvents)
        .filter(RowPredicate::code_in(
            CodeField::Ctv3,
            &codelists.ethnicity_ctv3,
        ))
        .last()
        .category(CodeField::Ctv3, &codelists.ethnicity_ctv3);

    let mut dataset = Dataset::new();
    let message = definition_message(dataset.add("cov_cat_ethnicity", ethnicity.clone()));
    assert!(message.contains("fallback"), "{message}");

    // Helpers may be null
    dataset.add("tmp_cat_ethnicity", ethnicity).unwrap();
    dataset
        .add(
            "cov_cat_ethnicity",
            coalesce([
                PatientExpr::variable("tmp_cat_ethnicity"),
                "Unknown".into(),
            ]),
        )
        .unwrap();

    let vocabulary = dataset.vocabulary("cov_cat_ethnicity").unwrap();
    assert!(vocabulary.contains("Unknown"));
    assert!(vocabulary.contains("6"));
    assert_eq!(vocabulary.len(), 7);
}

#[test]
fn test_written_categories_need_a_closed_vocabulary() {
    let mut dataset = Dataset::new();
    let message = definition_message(dataset.add(
        "cov_cat_first_code",
        coalesce([
            EventQuery::new(Table::Apcs)
                .first()
                .code(CodeField::PrimaryDiagnosis),
            "none".into(),
        ]),
    ));
    assert!(message.contains("open set"), "{message}");
}

#[test]
fn test_population_filter_excludes_patients() {
    let codelists = study_codelists();
    let mut dataset = Dataset::new();
    dataset
        .add(
            "out_num_covid_admissions",
            EventQuery::new(Table::Apcs)
                .filter(RowPredicate::code_in(
                    CodeField::AnyDiagnosis,
                    &codelists.covid_icd10,
                ))
                .count(),
        )
        .unwrap();
    dataset
        .define_population(PatientExpr::variable("out_num_covid_admissions").gt(0i64))
        .unwrap();
    assert!(dataset
        .define_population(PatientExpr::variable("out_num_covid_admissions"))
        .is_err());

    let mut admitted = patient(1);
    admitted
        .apcs
        .push(HospitalEpisode::new(1, date(2021, 1, 1), "U07.1"));
    let never = patient(2);

    assert_eq!(
        evaluate_patient(&dataset, &admitted).unwrap(),
        Some(vec![Value::Int(1)])
    );
    assert_eq!(evaluate_patient(&dataset, &never).unwrap(), None);
}

#[test]
fn test_study_definition_builds() {
    let dataset = build_dataset(&study_codelists(), &study_dates()).unwrap();

    for variable in dataset.variables() {
        assert!(
            variable.kind.accepts(variable.value_type),
            "{} is {}",
            variable.name,
            variable.value_type
        );
    }
    assert_eq!(
        dataset.get("cov_cat_smoking_status").unwrap().value_type,
        ValueType::Str
    );
    assert!(dataset.get("tmp_bin_ever_smoked").is_some());
    assert!(dataset.output_columns().all(|v| !v.name.starts_with("tmp_")));
    assert!(
        dataset
            .dependencies("exp_bin_bari_any")
            .unwrap()
            .contains("exp_date_bari_hosp_first")
    );
    assert_eq!(
        dataset.required_tables().len(),
        Table::ALL.len(),
        "the study reads every table"
    );
}

#[test]
fn test_mixed_codelist_union_is_rejected() {
    let icd10 = Codelist::from_codes("a", CodeSystem::Icd10, ["C50"]);
    let snomed = Codelist::from_codes("b", CodeSystem::SnomedCt, ["363346000"]);
    assert!(Codelist::union("ab", &[&icd10, &snomed]).is_err());

    let more = Codelist::from_codes("c", CodeSystem::Icd10, ["C34"]);
    let union = Codelist::union("ac", &[&icd10, &more]).unwrap();
    assert_eq!(union.sorted_codes(), ["C34", "C50"]);
}

#[test]
fn test_categorise_in_a_dataset_is_total() {
    let codelists = study_codelists();
    let admitted = EventQuery::new(Table::Apcs)
        .filter(RowPredicate::code_in(
            CodeField::AnyDiagnosis,
            &codelists.covid_icd10,
        ))
        .exists();
    let mut dataset = Dataset::new();
    dataset
        .add("out_cat_admitted", categorise([(admitted, "yes")], "no"))
        .unwrap();
    let expected: Vec<&str> = dataset
        .vocabulary("out_cat_admitted")
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(expected, ["no", "yes"]);
}

#[test]
fn test_end_to_end_on_dummy_population() {
    let codelists = study_codelists();
    let dates = study_dates();
    let dataset = build_dataset(&codelists, &dates).unwrap();

    let data = DummyDataGenerator::new(200)
        .with_seed(42)
        .generate(&codelists, &dates);
    let tables = PatientTables::group(data).unwrap();
    let config = DatasetConfig::new().with_threads(2);
    let frame = evaluate_dataset(&dataset, &tables, &config).unwrap();

    assert_eq!(frame.len(), 200);
    assert!(frame.patient_ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(frame.columns.len(), dataset.output_columns().count());

    for variable in dataset.output_columns() {
        let column = frame.column(&variable.name).unwrap();
        assert_eq!(column.values.len(), frame.len());
        if variable.kind == Kind::Categorical {
            let vocabulary = dataset.vocabulary(&variable.name).unwrap();
            for value in &column.values {
                let label = value.as_str().unwrap_or_else(|| {
                    panic!("{} holds a non-label value {value}", variable.name)
                });
                assert!(vocabulary.contains(label), "{}: {label}", variable.name);
            }
        }
        if variable.kind == Kind::Binary {
            assert!(column.values.iter().all(|value| !value.is_null()));
        }
    }

    for value in &frame.column("out_num_covid_hosp_count").unwrap().values {
        assert!(value.as_int().is_some_and(|count| count >= 0));
    }
    // Discharge is never before the matching admission
    let admissions = &frame.column("out_date_covid_hosp").unwrap().values;
    let discharges = &frame.column("out_date_covid_hosp_discharge").unwrap().values;
    for (admission, discharge) in admissions.iter().zip(discharges) {
        if let (Some(admission), Some(discharge)) = (admission.as_date(), discharge.as_date()) {
            assert!(admission <= discharge);
        }
    }
    // Every first treatment falls within the study period
    for value in &frame.column("exp_date_bari_hosp_first").unwrap().values {
        if let Some(treated) = value.as_date() {
            assert!(dates.study_start <= treated && treated <= dates.study_end);
        }
    }

    let again = evaluate_dataset(
        &dataset,
        &PatientTables::group(
            DummyDataGenerator::new(200)
                .with_seed(42)
                .generate(&codelists, &dates),
        )
        .unwrap(),
        &DatasetConfig::new().with_threads(1),
    )
    .unwrap();
    assert_eq!(frame, again);
}

#[test]
fn test_output_files() {
    let codelists = study_codelists();
    let dates = study_dates();
    let dataset = build_dataset(&codelists, &dates).unwrap();
    let tables = PatientTables::group(DummyDataGenerator::new(50).generate(&codelists, &dates))
        .unwrap();
    let frame = evaluate_dataset(&dataset, &tables, &DatasetConfig::new()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let parquet_path = dir.path().join("output").join("dataset.parquet");
    write_output(&frame, &parquet_path).unwrap();

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&parquet_path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let mut rows = 0;
    for batch in reader {
        let batch = batch.unwrap();
        assert_eq!(batch.schema().field(0).name(), "patient_id");
        assert_eq!(batch.num_columns(), frame.columns.len() + 1);
        rows += batch.num_rows();
    }
    assert_eq!(rows, 50);

    let csv_path = dir.path().join("dataset.csv");
    write_output(&frame, &csv_path).unwrap();
    let content = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("patient_id,qa_num_birth_year"));
    assert_eq!(lines.count(), 50);
}
