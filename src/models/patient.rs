//! Patient demographics and address history

use chrono::NaiveDate;
use jak_cohort_macros::TableRecord;

/// Root entity of the study: one row per registered patient
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "patients")]
pub struct Patient {
    /// Pseudonymised patient identifier
    pub patient_id: i64,
    /// Date of birth (rounded to the first of the month in the source data)
    pub date_of_birth: Option<NaiveDate>,
    /// Recorded sex: `female`, `male`, `intersex` or `unknown`
    pub sex: Option<String>,
    /// Date of death as recorded by the practice
    pub date_of_death: Option<NaiveDate>,
}

impl Patient {
    /// Create a patient with the given identifier and no demographics
    #[must_use]
    pub fn new(patient_id: i64) -> Self {
        Self {
            patient_id,
            ..Self::default()
        }
    }

    /// Set the date of birth
    #[must_use]
    pub const fn with_date_of_birth(mut self, date_of_birth: NaiveDate) -> Self {
        self.date_of_birth = Some(date_of_birth);
        self
    }

    /// Set the recorded sex
    #[must_use]
    pub fn with_sex(mut self, sex: &str) -> Self {
        self.sex = Some(sex.to_string());
        self
    }

    /// Set the practice-recorded date of death
    #[must_use]
    pub const fn with_date_of_death(mut self, date_of_death: NaiveDate) -> Self {
        self.date_of_death = Some(date_of_death);
        self
    }
}

/// A period of residence at an address
#[derive(Debug, Clone, Default, PartialEq, TableRecord)]
#[table(name = "addresses")]
pub struct Address {
    pub patient_id: i64,
    pub start_date: Option<NaiveDate>,
    /// Exclusive end of the period; open when absent
    pub end_date: Option<NaiveDate>,
    /// Index of Multiple Deprivation rank, rounded to the nearest 100
    pub imd_rounded: Option<i64>,
    pub care_home_is_potential_match: Option<bool>,
    pub care_home_requires_nursing: Option<bool>,
    pub care_home_does_not_require_nursing: Option<bool>,
}

impl Address {
    /// Whether the address was in use on `date`
    ///
    /// A missing start date is treated as "since before records began".
    #[must_use]
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| start <= date)
            && self.end_date.is_none_or(|end| end > date)
    }
}

/// The address in use on `date`
///
/// When several addresses overlap the one with the latest start date wins;
/// among equal start dates the one loaded last wins.
#[must_use]
pub fn address_on(addresses: &[Address], date: NaiveDate) -> Option<&Address> {
    addresses
        .iter()
        .filter(|address| address.is_active_on(date))
        .max_by_key(|address| address.start_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn address(start: NaiveDate, end: Option<NaiveDate>, imd: i64) -> Address {
        Address {
            patient_id: 1,
            start_date: Some(start),
            end_date: end,
            imd_rounded: Some(imd),
            ..Address::default()
        }
    }

    #[test]
    fn test_end_date_is_exclusive() {
        let moved_out = address(date(2015, 1, 1), Some(date(2020, 2, 1)), 100);
        assert!(moved_out.is_active_on(date(2020, 1, 31)));
        assert!(!moved_out.is_active_on(date(2020, 2, 1)));
    }

    #[test]
    fn test_latest_start_wins() {
        let addresses = vec![
            address(date(2010, 1, 1), None, 100),
            address(date(2018, 6, 1), None, 200),
            address(date(2021, 1, 1), None, 300),
        ];
        let current = address_on(&addresses, date(2020, 2, 1)).unwrap();
        assert_eq!(current.imd_rounded, Some(200));
    }

    #[test]
    fn test_no_address_before_first_move_in() {
        let addresses = vec![address(date(2021, 1, 1), None, 300)];
        assert!(address_on(&addresses, date(2020, 2, 1)).is_none());
    }
}
