//! Derived clinical flags
//!
//! Compositions of the matcher helpers: combined diagnosis flags over
//! primary care, hospital and death records, ordered categorisation with a
//! fallback, smoking status, care-home residence and deprivation quintile.

use std::sync::Arc;

use crate::codelist::Codelist;
use crate::matcher::{
    DateWindow, Source, cause_of_death_matches, exists_matching_before, last_matching_before,
};
use crate::models::CodeField;
use crate::query::{AddressField, PatientExpr, RowPredicate, any_of, case, coalesce};

/// Whether a diagnosis is recorded anywhere in the patient's history
///
/// True when a primary care event carries a code of `snomed`, a hospital
/// episode has a primary or secondary diagnosis in `icd10`, or a death
/// registration lists a cause in `icd10`.
#[must_use]
pub fn diagnosis_ever(snomed: &Arc<Codelist>, icd10: &Arc<Codelist>) -> PatientExpr {
    any_of([
        DateWindow::Ever
            .matching_query(Source::CLINICAL_SNOMED, snomed, RowPredicate::always_true())
            .exists(),
        DateWindow::Ever
            .matching_query(Source::APCS, icd10, RowPredicate::always_true())
            .exists(),
        cause_of_death_matches(icd10),
    ])
}

/// [`diagnosis_ever`] restricted to records dated on or before `as_of`
#[must_use]
pub fn diagnosis_on_or_before(
    snomed: &Arc<Codelist>,
    icd10: &Arc<Codelist>,
    as_of: impl Into<PatientExpr>,
) -> PatientExpr {
    let as_of = as_of.into();
    any_of([
        exists_matching_before(
            Source::CLINICAL_SNOMED,
            snomed,
            as_of.clone(),
            RowPredicate::always_true(),
        ),
        exists_matching_before(Source::APCS, icd10, as_of.clone(), RowPredicate::always_true()),
        exists_matching_before(Source::DEATHS, icd10, as_of, RowPredicate::always_true()),
    ])
}

/// Ordered (condition, label) pairs with a mandatory fallback
///
/// The first condition that is true wins; null conditions count as false.
/// The result is never null.
#[must_use]
pub fn categorise<'a>(
    branches: impl IntoIterator<Item = (PatientExpr, &'a str)>,
    fallback: &str,
) -> PatientExpr {
    case(
        branches
            .into_iter()
            .map(|(condition, label)| (condition, PatientExpr::from(label))),
        Some(fallback.into()),
    )
}

/// Smoking category codes of the clear smoking codelist
pub mod smoking {
    pub const CURRENT: &str = "S";
    pub const EX: &str = "E";
    pub const NEVER: &str = "N";
    /// Recorded as smoker earlier but history incomplete
    pub const MISSING: &str = "M";
}

/// Category of the most recent clear smoking code on or before `as_of`
#[must_use]
pub fn most_recent_smoking_code(
    clear: &Arc<Codelist>,
    as_of: impl Into<PatientExpr>,
) -> PatientExpr {
    last_matching_before(
        Source::CLINICAL_CTV3,
        clear,
        as_of,
        RowPredicate::always_true(),
    )
    .category(CodeField::Ctv3, clear)
}

/// Whether a current or ex-smoker code of the unclear smoking codelist is
/// recorded on or before `as_of`
#[must_use]
pub fn ever_smoked(unclear: &Codelist, as_of: impl Into<PatientExpr>) -> PatientExpr {
    let smoker_codes = unclear.restrict_to_categories(
        &format!("{} (S, E)", unclear.name()),
        &[smoking::CURRENT, smoking::EX],
    );
    exists_matching_before(
        Source::CLINICAL_CTV3,
        &Arc::new(smoker_codes),
        as_of,
        RowPredicate::always_true(),
    )
}

/// Smoking status from the most recent code and the ever-smoked flag
///
/// Precedence: S gives "S"; E gives "E"; N or M with an ever-smoked record
/// gives "E"; N gives "N"; anything else is "M".
#[must_use]
pub fn smoking_status_from(most_recent: PatientExpr, ever_smoked: PatientExpr) -> PatientExpr {
    use smoking::{CURRENT, EX, MISSING, NEVER};

    categorise(
        [
            (most_recent.clone().eq(CURRENT), CURRENT),
            (most_recent.clone().eq(EX), EX),
            (
                most_recent.clone().is_in([NEVER, MISSING]).and(ever_smoked),
                EX,
            ),
            (most_recent.eq(NEVER), NEVER),
        ],
        MISSING,
    )
}

/// Smoking status on `as_of` from the clear and unclear smoking codelists
#[must_use]
pub fn smoking_status(
    clear: &Arc<Codelist>,
    unclear: &Codelist,
    as_of: impl Into<PatientExpr>,
) -> PatientExpr {
    let as_of = as_of.into();
    smoking_status_from(
        most_recent_smoking_code(clear, as_of.clone()),
        ever_smoked(unclear, as_of),
    )
}

/// Whether the patient lives in a care home on `as_of`
///
/// True when a care-home code is recorded on or before `as_of`, or the
/// address in use on `as_of` is flagged as a care home by any of its three
/// residence fields. Never null.
#[must_use]
pub fn care_home_status(carehome: &Arc<Codelist>, as_of: impl Into<PatientExpr>) -> PatientExpr {
    let as_of = as_of.into();
    coalesce([
        any_of([
            exists_matching_before(
                Source::CLINICAL_SNOMED,
                carehome,
                as_of.clone(),
                RowPredicate::always_true(),
            ),
            PatientExpr::address(as_of.clone(), AddressField::CareHomeIsPotentialMatch),
            PatientExpr::address(as_of.clone(), AddressField::CareHomeRequiresNursing),
            PatientExpr::address(as_of, AddressField::CareHomeDoesNotRequireNursing),
        ]),
        false.into(),
    ])
}

/// Highest rounded IMD rank
pub const IMD_MAX_RANK: i64 = 32_844;

/// Quintile labels from most to least deprived
pub const IMD_QUINTILES: [&str; 5] = ["1 (most deprived)", "2", "3", "4", "5 (least deprived)"];

/// Label of an unknown deprivation quintile
pub const IMD_UNKNOWN: &str = "unknown";

/// Deprivation quintile of the address in use on `as_of`
#[must_use]
pub fn imd_quintile(as_of: impl Into<PatientExpr>) -> PatientExpr {
    let imd = PatientExpr::address(as_of, AddressField::ImdRounded);
    let bound = |fifths: i64| IMD_MAX_RANK * fifths / 5;
    let ranked = imd.clone().ge(0i64).and(imd.clone().le(IMD_MAX_RANK));
    let below = |fifths: i64| ranked.clone().and(imd.clone().lt(bound(fifths)));
    categorise(
        [
            (below(1), IMD_QUINTILES[0]),
            (below(2), IMD_QUINTILES[1]),
            (below(3), IMD_QUINTILES[2]),
            (below(4), IMD_QUINTILES[3]),
            (ranked.clone(), IMD_QUINTILES[4]),
        ],
        IMD_UNKNOWN,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::query::Scope;

    #[test]
    fn test_smoking_vocabulary_is_closed() {
        let status = smoking_status_from(
            PatientExpr::variable("tmp_cat_smoking"),
            PatientExpr::variable("tmp_bin_ever_smoked"),
        );
        let scope = Scope::default();
        assert!(status.is_total(&scope));
        let expected: BTreeSet<String> = ["E", "M", "N", "S"].map(String::from).into();
        assert_eq!(status.vocabulary(&scope), Some(expected));
    }

    #[test]
    fn test_imd_quintile_bounds() {
        let scope = Scope::default();
        let quintile = imd_quintile(PatientExpr::variable("index"));
        assert!(quintile.is_total(&scope));
        assert_eq!(quintile.vocabulary(&scope).map(|v| v.len()), Some(6));
    }
}
