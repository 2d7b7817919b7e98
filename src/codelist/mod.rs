//! Codelists: immutable sets of clinical codes
//!
//! A codelist is loaded once from a delimited file and afterwards only used as
//! a membership filter, optionally mapping each code to a category label
//! (ethnicity group, smoking status). Every codelist carries its coding
//! system so that it cannot be applied to a field holding another system.

pub mod study;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::error::util::safe_open_file;
use crate::error::{DatasetError, Result};

pub use study::StudyCodelists;

/// Coding system of a codelist or a code-bearing field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeSystem {
    /// Clinical Terms Version 3 (Read v3)
    Ctv3,
    /// SNOMED CT concept identifiers
    SnomedCt,
    /// ICD-10 diagnosis codes
    Icd10,
    /// Dictionary of medicines and devices
    Dmd,
}

impl CodeSystem {
    /// Short display name for this system
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Ctv3 => "CTV3",
            Self::SnomedCt => "SNOMED CT",
            Self::Icd10 => "ICD-10",
            Self::Dmd => "dm+d",
        }
    }
}

impl fmt::Display for CodeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A named, immutable set of codes with optional categories
#[derive(Clone, PartialEq, Eq)]
pub struct Codelist {
    name: String,
    system: CodeSystem,
    codes: FxHashMap<String, Option<String>>,
}

impl Codelist {
    /// Create an empty codelist
    #[must_use]
    pub fn empty(name: &str, system: CodeSystem) -> Self {
        Self {
            name: name.to_string(),
            system,
            codes: FxHashMap::default(),
        }
    }

    /// Create a codelist from uncategorised codes
    pub fn from_codes<I, S>(name: &str, system: CodeSystem, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            system,
            codes: codes.into_iter().map(|code| (code.into(), None)).collect(),
        }
    }

    /// Create a codelist from `(code, category)` pairs
    pub fn from_categorised<I, C, K>(name: &str, system: CodeSystem, codes: I) -> Self
    where
        I: IntoIterator<Item = (C, K)>,
        C: Into<String>,
        K: Into<String>,
    {
        Self {
            name: name.to_string(),
            system,
            codes: codes
                .into_iter()
                .map(|(code, category)| (code.into(), Some(category.into())))
                .collect(),
        }
    }

    /// Load a codelist from a CSV file with a header row
    ///
    /// # Arguments
    /// * `path` - The CSV file
    /// * `system` - Coding system of the codes in the file
    /// * `column` - Header of the code column
    /// * `category_column` - Header of the category column, if the codelist is categorised
    ///
    /// # Errors
    /// Fails if the file is missing, a named column is absent, or a row cannot
    /// be parsed. Blank codes are skipped.
    pub fn from_csv(
        path: &Path,
        system: CodeSystem,
        column: &str,
        category_column: Option<&str>,
    ) -> Result<Self> {
        let file = safe_open_file(path, "loading codelist")?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let csv_error = |source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let headers = reader.headers().map_err(csv_error)?.clone();
        let find_column = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| DatasetError::Codelist {
                    path: path.to_path_buf(),
                    message: format!(
                        "column '{name}' not found (available: {})",
                        headers.iter().join(", ")
                    ),
                })
        };
        let code_idx = find_column(column)?;
        let category_idx = category_column.map(find_column).transpose()?;

        let name = path
            .file_stem()
            .map_or_else(|| column.to_string(), |stem| stem.to_string_lossy().into_owned());
        let mut codelist = Self::empty(&name, system);

        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let code = record.get(code_idx).unwrap_or_default();
            if code.is_empty() {
                continue;
            }

            let category = category_idx
                .and_then(|idx| record.get(idx))
                .filter(|category| !category.is_empty())
                .map(str::to_string);

            if let Some(existing) = codelist.codes.get(code) {
                if *existing != category {
                    log::warn!(
                        "Codelist {name}: code {code} listed with conflicting categories, keeping {existing:?}"
                    );
                }
                continue;
            }
            codelist.codes.insert(code.to_string(), category);
        }

        if codelist.is_empty() {
            log::warn!("Codelist {} loaded from {} is empty", name, path.display());
        } else {
            log::info!(
                "Loaded codelist {} ({} codes, {}) from {}",
                name,
                codelist.len(),
                system,
                path.display()
            );
        }

        Ok(codelist)
    }

    /// Codelist name (the file stem for codelists loaded from disk)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coding system of the codes
    #[must_use]
    pub const fn system(&self) -> CodeSystem {
        self.system
    }

    /// Number of codes
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the codelist has no codes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Membership test
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }

    /// Category label of a code, if the code is present and categorised
    #[must_use]
    pub fn category(&self, code: &str) -> Option<&str> {
        self.codes.get(code).and_then(|category| category.as_deref())
    }

    /// All distinct category labels
    #[must_use]
    pub fn categories(&self) -> BTreeSet<&str> {
        self.codes.values().flatten().map(String::as_str).collect()
    }

    /// Codes in sorted order
    #[must_use]
    pub fn sorted_codes(&self) -> Vec<&str> {
        self.codes.keys().map(String::as_str).sorted().collect()
    }

    /// A new codelist containing only codes whose category is in `categories`
    #[must_use]
    pub fn restrict_to_categories(&self, name: &str, categories: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            system: self.system,
            codes: self
                .codes
                .iter()
                .filter(|(_, category)| {
                    category
                        .as_deref()
                        .is_some_and(|category| categories.contains(&category))
                })
                .map(|(code, category)| (code.clone(), category.clone()))
                .collect(),
        }
    }

    /// Union of several codelists of the same coding system
    pub fn union(name: &str, codelists: &[&Self]) -> Result<Self> {
        let Some(first) = codelists.first() else {
            return Err(DatasetError::definition(format!(
                "codelist union '{name}' needs at least one codelist"
            )));
        };

        let mut union = Self::empty(name, first.system);
        for codelist in codelists {
            if codelist.system != first.system {
                return Err(DatasetError::definition(format!(
                    "cannot combine {} codelist '{}' with {} codelist '{}'",
                    codelist.system, codelist.name, first.system, first.name
                )));
            }
            for (code, category) in &codelist.codes {
                union
                    .codes
                    .entry(code.clone())
                    .or_insert_with(|| category.clone());
            }
        }
        Ok(union)
    }
}

impl fmt::Debug for Codelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codelist")
            .field("name", &self.name)
            .field("system", &self.system)
            .field("codes", &self.codes.len())
            .finish()
    }
}
