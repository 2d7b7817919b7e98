//! The codelists used by the baricitinib study definition

use std::path::Path;
use std::sync::Arc;

use crate::codelist::{CodeSystem, Codelist};
use crate::error::Result;
use crate::error::util::validate_directory;

/// Where a codelist lives inside the codelist directory and how to read it
#[derive(Debug, Clone, Copy)]
pub struct CodelistSource {
    /// File name relative to the codelist directory
    pub file: &'static str,
    /// Coding system of the codes
    pub system: CodeSystem,
    /// Code column header
    pub column: &'static str,
    /// Category column header for categorised codelists
    pub category_column: Option<&'static str>,
}

impl CodelistSource {
    const fn new(file: &'static str, system: CodeSystem, column: &'static str) -> Self {
        Self {
            file,
            system,
            column,
            category_column: None,
        }
    }

    const fn categorised(
        file: &'static str,
        system: CodeSystem,
        column: &'static str,
        category_column: &'static str,
    ) -> Self {
        Self {
            file,
            system,
            column,
            category_column: Some(category_column),
        }
    }

    /// Load this codelist from `dir`
    pub fn load(&self, dir: &Path) -> Result<Arc<Codelist>> {
        Codelist::from_csv(
            &dir.join(self.file),
            self.system,
            self.column,
            self.category_column,
        )
        .map(Arc::new)
    }
}

pub const PROSTATE_CANCER_ICD10: CodelistSource = CodelistSource::new(
    "user-RochelleKnight-prostate_cancer_icd10.csv",
    CodeSystem::Icd10,
    "code",
);
pub const PROSTATE_CANCER_SNOMED: CodelistSource = CodelistSource::new(
    "user-RochelleKnight-prostate_cancer_snomed.csv",
    CodeSystem::SnomedCt,
    "code",
);
pub const PREGNANCY_SNOMED: CodelistSource = CodelistSource::new(
    "user-RochelleKnight-pregnancy_and_birth_snomed.csv",
    CodeSystem::SnomedCt,
    "code",
);
pub const COCP_DMD: CodelistSource =
    CodelistSource::new("user-elsie_horne-cocp_dmd.csv", CodeSystem::Dmd, "dmd_id");
pub const HRT_DMD: CodelistSource =
    CodelistSource::new("user-elsie_horne-hrt_dmd.csv", CodeSystem::Dmd, "dmd_id");
pub const ETHNICITY_CTV3: CodelistSource = CodelistSource::categorised(
    "opensafely-ethnicity.csv",
    CodeSystem::Ctv3,
    "Code",
    "Grouping_6",
);
pub const SMOKING_CLEAR_CTV3: CodelistSource = CodelistSource::categorised(
    "opensafely-smoking-clear.csv",
    CodeSystem::Ctv3,
    "CTV3Code",
    "Category",
);
pub const SMOKING_UNCLEAR_CTV3: CodelistSource = CodelistSource::categorised(
    "opensafely-smoking-unclear.csv",
    CodeSystem::Ctv3,
    "CTV3Code",
    "Category",
);
pub const CAREHOME_SNOMED: CodelistSource = CodelistSource::new(
    "primis-covid19-vacc-uptake-longres.csv",
    CodeSystem::SnomedCt,
    "code",
);
pub const CANCER_SNOMED: CodelistSource = CodelistSource::new(
    "user-elsie_horne-cancer_snomed.csv",
    CodeSystem::SnomedCt,
    "code",
);
pub const CANCER_ICD10: CodelistSource = CodelistSource::new(
    "user-elsie_horne-cancer_icd10.csv",
    CodeSystem::Icd10,
    "code",
);
pub const COVID_ICD10: CodelistSource = CodelistSource::new(
    "opensafely-covid-identification.csv",
    CodeSystem::Icd10,
    "icd10_code",
);
pub const COVID_EC_SNOMED: CodelistSource = CodelistSource::new(
    "opensafely-covid-19-ec-diagnosis.csv",
    CodeSystem::SnomedCt,
    "code",
);

/// All codelists referenced by the study variables
#[derive(Debug, Clone)]
pub struct StudyCodelists {
    pub prostate_cancer_icd10: Arc<Codelist>,
    pub prostate_cancer_snomed: Arc<Codelist>,
    pub pregnancy_snomed: Arc<Codelist>,
    pub cocp_dmd: Arc<Codelist>,
    pub hrt_dmd: Arc<Codelist>,
    /// Ethnicity in 6 groups (`Grouping_6`)
    pub ethnicity_ctv3: Arc<Codelist>,
    /// Smoking status with categories S, E, N, M
    pub smoking_clear_ctv3: Arc<Codelist>,
    /// Broader smoking codes used for the ever-smoked lookup
    pub smoking_unclear_ctv3: Arc<Codelist>,
    pub carehome_snomed: Arc<Codelist>,
    pub cancer_snomed: Arc<Codelist>,
    pub cancer_icd10: Arc<Codelist>,
    pub covid_icd10: Arc<Codelist>,
    pub covid_ec_snomed: Arc<Codelist>,
}

impl StudyCodelists {
    /// Load every study codelist from `dir`
    ///
    /// Any missing or malformed file aborts loading.
    pub fn load(dir: &Path) -> Result<Self> {
        validate_directory(dir, "loading study codelists")?;
        log::info!("Loading study codelists from {}", dir.display());

        let codelists = Self {
            prostate_cancer_icd10: PROSTATE_CANCER_ICD10.load(dir)?,
            prostate_cancer_snomed: PROSTATE_CANCER_SNOMED.load(dir)?,
            pregnancy_snomed: PREGNANCY_SNOMED.load(dir)?,
            cocp_dmd: COCP_DMD.load(dir)?,
            hrt_dmd: HRT_DMD.load(dir)?,
            ethnicity_ctv3: ETHNICITY_CTV3.load(dir)?,
            smoking_clear_ctv3: SMOKING_CLEAR_CTV3.load(dir)?,
            smoking_unclear_ctv3: SMOKING_UNCLEAR_CTV3.load(dir)?,
            carehome_snomed: CAREHOME_SNOMED.load(dir)?,
            cancer_snomed: CANCER_SNOMED.load(dir)?,
            cancer_icd10: CANCER_ICD10.load(dir)?,
            covid_icd10: COVID_ICD10.load(dir)?,
            covid_ec_snomed: COVID_EC_SNOMED.load(dir)?,
        };

        log::debug!("Loaded {} study codelists", Self::sources().len());
        Ok(codelists)
    }

    /// The sources of every study codelist, in load order
    #[must_use]
    pub const fn sources() -> [CodelistSource; 13] {
        [
            PROSTATE_CANCER_ICD10,
            PROSTATE_CANCER_SNOMED,
            PREGNANCY_SNOMED,
            COCP_DMD,
            HRT_DMD,
            ETHNICITY_CTV3,
            SMOKING_CLEAR_CTV3,
            SMOKING_UNCLEAR_CTV3,
            CAREHOME_SNOMED,
            CANCER_SNOMED,
            CANCER_ICD10,
            COVID_ICD10,
            COVID_EC_SNOMED,
        ]
    }
}
