//! Variable definitions of the baricitinib exposure study
//!
//! Quality-assurance flags, baseline covariates at the study start,
//! baricitinib exposures by treatment setting and COVID-19 outcomes over the
//! study period. Every boundary date comes from [`StudyDates`].

use std::sync::Arc;

use crate::codelist::{Codelist, StudyCodelists};
use crate::config::StudyDates;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::matcher::derived::{
    care_home_status, categorise, diagnosis_ever, diagnosis_on_or_before, ever_smoked,
    imd_quintile, most_recent_smoking_code, smoking_status_from,
};
use crate::matcher::{
    Source, count_matching, count_matching_between, first_matching_between,
    first_matching_therapeutic_between, last_matching, last_matching_therapeutic_between,
    matching_death_between, most_recent_bmi,
};
use crate::models::{BARICITINIB, CodeField, TextField, setting};
use crate::query::{
    AddressField, EventQuery, PatientExpr, RowPredicate, any_of, coalesce,
};
use crate::tables::Table;

/// Minimum age of a BMI measurement used as a covariate
pub const BMI_MINIMUM_AGE: f64 = 16.0;

/// Label of a missing ethnicity
pub const ETHNICITY_UNKNOWN: &str = "Unknown";

/// Label of a patient never treated with baricitinib in the study period
pub const NO_TREATMENT: &str = "none";

/// Build the study dataset
pub fn build_dataset(codelists: &StudyCodelists, dates: &StudyDates) -> Result<Dataset> {
    dates.validate()?;
    let mut dataset = Dataset::new();

    add_quality_assurance(&mut dataset, codelists)?;
    add_covariates(&mut dataset, codelists, dates)?;
    add_exposures(&mut dataset, dates)?;
    add_outcomes(&mut dataset, codelists, dates)?;

    log::info!(
        "Defined {} study variables ({} written) over tables {:?}",
        dataset.len(),
        dataset.output_columns().count(),
        dataset.required_tables()
    );
    Ok(dataset)
}

fn death_registration() -> EventQuery {
    EventQuery::new(Table::OnsDeaths)
}

fn add_quality_assurance(dataset: &mut Dataset, codelists: &StudyCodelists) -> Result<()> {
    dataset.add("qa_num_birth_year", PatientExpr::date_of_birth().year())?;
    dataset.add(
        "qa_date_death",
        coalesce([
            death_registration().first().date(),
            PatientExpr::date_of_death(),
        ]),
    )?;
    dataset.add(
        "qa_bin_prostate_cancer",
        diagnosis_ever(
            &codelists.prostate_cancer_snomed,
            &codelists.prostate_cancer_icd10,
        ),
    )?;
    dataset.add(
        "qa_bin_pregnancy",
        EventQuery::new(Table::ClinicalEvents)
            .filter(RowPredicate::code_in(
                CodeField::SnomedCt,
                &codelists.pregnancy_snomed,
            ))
            .exists(),
    )?;
    let hormones = Codelist::union("hrt_cocp_dmd", &[&codelists.cocp_dmd, &codelists.hrt_dmd])?;
    dataset.add(
        "qa_bin_hrtcocp",
        EventQuery::new(Table::Medications)
            .filter(RowPredicate::code_in(CodeField::Dmd, &Arc::new(hormones)))
            .exists(),
    )?;
    dataset.add(
        "qa_bin_is_female_or_male",
        coalesce([PatientExpr::sex().is_in(["female", "male"]), false.into()]),
    )?;
    Ok(())
}

fn add_covariates(
    dataset: &mut Dataset,
    codelists: &StudyCodelists,
    dates: &StudyDates,
) -> Result<()> {
    let index = dates.study_start;

    dataset.add(
        "qa_bin_known_imd",
        PatientExpr::address(index, AddressField::ImdRounded).is_not_null(),
    )?;
    dataset.add(
        "cov_num_age",
        PatientExpr::date_of_birth().years_until(index),
    )?;
    let sex = PatientExpr::sex();
    dataset.add(
        "cov_cat_sex",
        categorise(
            [
                (sex.clone().eq("female"), "female"),
                (sex.clone().eq("male"), "male"),
                (sex.eq("intersex"), "intersex"),
            ],
            "unknown",
        ),
    )?;
    dataset.add(
        "cov_cat_ethnicity",
        coalesce([
            last_matching(
                Source::CLINICAL_CTV3,
                &codelists.ethnicity_ctv3,
                RowPredicate::always_true(),
            )
            .category(CodeField::Ctv3, &codelists.ethnicity_ctv3),
            ETHNICITY_UNKNOWN.into(),
        ]),
    )?;
    dataset.add("cov_cat_deprivation", imd_quintile(index))?;

    dataset.add(
        "tmp_cat_smoking_most_recent",
        most_recent_smoking_code(&codelists.smoking_clear_ctv3, index),
    )?;
    dataset.add(
        "tmp_bin_ever_smoked",
        ever_smoked(&codelists.smoking_unclear_ctv3, index),
    )?;
    dataset.add(
        "cov_cat_smoking_status",
        smoking_status_from(
            PatientExpr::variable("tmp_cat_smoking_most_recent"),
            PatientExpr::variable("tmp_bin_ever_smoked"),
        ),
    )?;

    dataset.add(
        "cov_bin_carehome_status",
        care_home_status(&codelists.carehome_snomed, index),
    )?;

    let bmi = most_recent_bmi(BMI_MINIMUM_AGE, RowPredicate::on_or_before(index));
    dataset.add("cov_num_bmi", bmi.numeric_value())?;
    dataset.add("cov_date_bmi", bmi.date())?;

    dataset.add(
        "cov_bin_cancer",
        diagnosis_on_or_before(&codelists.cancer_snomed, &codelists.cancer_icd10, index),
    )?;
    dataset.add(
        "cov_num_cancer_admissions",
        count_matching(
            Source::APCS,
            &codelists.cancer_icd10,
            index,
            RowPredicate::always_true(),
        ),
    )?;
    Ok(())
}

fn add_exposures(dataset: &mut Dataset, dates: &StudyDates) -> Result<()> {
    let (start, end) = (dates.study_start, dates.study_end);
    let first_in = |indication: &str| {
        first_matching_therapeutic_between(
            BARICITINIB,
            indication,
            start,
            end,
            RowPredicate::always_true(),
        )
    };

    dataset.add(
        "exp_date_bari_hosp_first",
        first_in(setting::HOSPITALISED_WITH).date(),
    )?;
    dataset.add(
        "exp_date_bari_hosp_onset_first",
        first_in(setting::HOSPITAL_ONSET).date(),
    )?;
    dataset.add(
        "exp_date_bari_outpatient_first",
        first_in(setting::NON_HOSPITALISED).date(),
    )?;
    dataset.add(
        "exp_date_bari_hosp_last",
        last_matching_therapeutic_between(
            BARICITINIB,
            setting::HOSPITALISED_WITH,
            start,
            end,
            RowPredicate::always_true(),
        )
        .date(),
    )?;
    dataset.add(
        "exp_bin_bari_any",
        any_of([
            PatientExpr::variable("exp_date_bari_hosp_first").is_not_null(),
            PatientExpr::variable("exp_date_bari_hosp_onset_first").is_not_null(),
            PatientExpr::variable("exp_date_bari_outpatient_first").is_not_null(),
        ]),
    )?;

    let first_setting = EventQuery::new(Table::CovidTherapeutics)
        .filter(RowPredicate::text_in(TextField::Intervention, &[BARICITINIB]))
        .filter(RowPredicate::text_in(
            TextField::CovidIndication,
            &setting::ALL,
        ))
        .filter(RowPredicate::between(start, end))
        .first()
        .text(TextField::CovidIndication);
    dataset.add(
        "exp_cat_bari_first_setting",
        categorise(
            setting::ALL
                .map(|indication| (first_setting.clone().eq(indication), indication)),
            NO_TREATMENT,
        ),
    )?;
    Ok(())
}

fn add_outcomes(
    dataset: &mut Dataset,
    codelists: &StudyCodelists,
    dates: &StudyDates,
) -> Result<()> {
    let (start, end) = (dates.study_start, dates.study_end);
    let covid_admission = first_matching_between(
        Source::APCS,
        &codelists.covid_icd10,
        start,
        end,
        RowPredicate::always_true(),
    );

    dataset.add("out_date_covid_hosp", covid_admission.date())?;
    dataset.add("out_date_covid_hosp_discharge", covid_admission.end_date())?;
    dataset.add(
        "out_num_covid_hosp_count",
        count_matching_between(
            Source::APCS,
            &codelists.covid_icd10,
            start,
            end,
            RowPredicate::always_true(),
        ),
    )?;
    dataset.add(
        "out_date_covid_ec",
        first_matching_between(
            Source::EMERGENCY_CARE,
            &codelists.covid_ec_snomed,
            start,
            end,
            RowPredicate::always_true(),
        )
        .date(),
    )?;
    dataset.add(
        "out_date_covid_opa",
        first_matching_between(
            Source::OPA,
            &codelists.covid_icd10,
            start,
            end,
            RowPredicate::always_true(),
        )
        .date(),
    )?;
    dataset.add(
        "out_bin_covid_death",
        matching_death_between(&codelists.covid_icd10, start, end),
    )?;
    dataset.add(
        "out_date_death",
        death_registration()
            .filter(RowPredicate::between(start, end))
            .first()
            .date(),
    )?;
    Ok(())
}
