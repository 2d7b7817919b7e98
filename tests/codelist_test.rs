use std::fs;
use std::path::Path;

use jak_cohort::{CodeSystem, Codelist, DatasetError, StudyCodelists, StudyDates};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_plain_codelist() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "covid.csv",
        "icd10_code,description\nU07.1,confirmed\n U07.2 ,suspected\n,blank row\nU07.1,duplicate\n",
    );

    let codelist = Codelist::from_csv(&path, CodeSystem::Icd10, "icd10_code", None).unwrap();
    assert_eq!(codelist.name(), "covid");
    assert_eq!(codelist.system(), CodeSystem::Icd10);
    assert_eq!(codelist.sorted_codes(), ["U07.1", "U07.2"]);
    assert!(codelist.contains("U07.2"));
    assert!(!codelist.contains("U07"));
    assert_eq!(codelist.category("U07.1"), None);
}

#[test]
fn test_load_categorised_codelist() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "smoking.csv",
        "CTV3Code,Category,Description\n137R.,S,Current smoker\n137S.,E,Ex-smoker\n1371.,N,Never smoked\n137Z.,,No category\n",
    );

    let codelist =
        Codelist::from_csv(&path, CodeSystem::Ctv3, "CTV3Code", Some("Category")).unwrap();
    assert_eq!(codelist.len(), 4);
    assert_eq!(codelist.category("137R."), Some("S"));
    assert_eq!(codelist.category("137Z."), None);
    assert_eq!(
        codelist.categories().into_iter().collect::<Vec<_>>(),
        ["E", "N", "S"]
    );

    let smokers = codelist.restrict_to_categories("smokers", &["S", "E"]);
    assert_eq!(smokers.sorted_codes(), ["137R.", "137S."]);
}

#[test]
fn test_missing_column_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "codes.csv", "snomed,term\n123,abc\n");

    match Codelist::from_csv(&path, CodeSystem::SnomedCt, "code", None) {
        Err(DatasetError::Codelist { message, .. }) => {
            assert!(message.contains("'code'"), "{message}");
            assert!(message.contains("snomed"), "{message}");
        }
        other => panic!("expected a codelist error, got {other:?}"),
    }

    let result = Codelist::from_csv(&path, CodeSystem::SnomedCt, "snomed", Some("group"));
    assert!(matches!(result, Err(DatasetError::Codelist { .. })));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = Codelist::from_csv(
        &dir.path().join("absent.csv"),
        CodeSystem::Icd10,
        "code",
        None,
    );
    assert!(matches!(result, Err(DatasetError::Io { .. })));
}

#[test]
fn test_empty_codelist_loads() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "empty.csv", "code\n");
    let codelist = Codelist::from_csv(&path, CodeSystem::Icd10, "code", None).unwrap();
    assert!(codelist.is_empty());
}

#[test]
fn test_load_study_codelists() {
    let dir = TempDir::new().unwrap();
    for source in StudyCodelists::sources() {
        let content = match source.category_column {
            Some(category) => format!("{},{category}\nX1,S\nX2,E\n", source.column),
            None => format!("{}\nX1\nX2\n", source.column),
        };
        write(dir.path(), source.file, &content);
    }

    let codelists = StudyCodelists::load(dir.path()).unwrap();
    assert_eq!(codelists.covid_icd10.system(), CodeSystem::Icd10);
    assert_eq!(codelists.cocp_dmd.system(), CodeSystem::Dmd);
    assert_eq!(codelists.smoking_clear_ctv3.category("X2"), Some("E"));
    assert_eq!(codelists.ethnicity_ctv3.len(), 2);

    let [first, ..] = StudyCodelists::sources();
    fs::remove_file(dir.path().join(first.file)).unwrap();
    assert!(StudyCodelists::load(dir.path()).is_err());
}

#[test]
fn test_study_dates_from_json() {
    let dates =
        StudyDates::from_json_str(r#"{"index_date": "2020-02-01", "studyend_date": "2024-07-01"}"#)
            .unwrap();
    assert_eq!(dates, StudyDates::default());

    let inverted =
        StudyDates::from_json_str(r#"{"study_start": "2024-07-01", "study_end": "2020-02-01"}"#);
    assert!(matches!(inverted, Err(DatasetError::Config(_))));

    let malformed = StudyDates::from_json_str(r#"{"study_start": "01/02/2020", "study_end": "2024-07-01"}"#);
    assert!(matches!(malformed, Err(DatasetError::Json(_))));

    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "study-dates.json",
        r#"{"study_start": "2020-03-01", "study_end": "2023-12-31"}"#,
    );
    let dates = StudyDates::from_json_file(&path).unwrap();
    assert_eq!(dates.study_start.to_string(), "2020-03-01");
}
