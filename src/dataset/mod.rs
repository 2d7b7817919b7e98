//! Dataset definitions
//!
//! A [`Dataset`] is an ordered list of named variables plus a population
//! filter. Variable names follow the study convention
//! `<prefix>_<tag>_<description>`:
//!
//! | prefix | role |
//! |--------|------|
//! | `qa`   | quality-assurance flag |
//! | `cov`  | covariate |
//! | `exp`  | exposure |
//! | `out`  | outcome |
//! | `tmp`  | helper, evaluated but not written |
//!
//! and the tag fixes the column type: `bin` boolean, `num` integer or float,
//! `cat` category string, `date` date.
//!
//! Every check happens in [`Dataset::add`], before any data is read: the
//! name, the expression type against the tag, references to variables (which
//! must already be defined, so the dependency graph is acyclic), codelist
//! coding systems, and totality of written categorical columns.

pub mod evaluate;
pub mod output;

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{DatasetError, Result};
use crate::query::{PatientExpr, Scope, ValueType, VariableInfo};
use crate::tables::Table;

pub use evaluate::{OutputColumn, OutputFrame, evaluate_dataset, evaluate_patient};
pub use output::{OutputFormat, to_record_batch, write_output};

/// Role of a variable, from its name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    QualityAssurance,
    Covariate,
    Exposure,
    Outcome,
    Temporary,
}

impl Role {
    pub const ALL: [Self; 5] = [
        Self::QualityAssurance,
        Self::Covariate,
        Self::Exposure,
        Self::Outcome,
        Self::Temporary,
    ];

    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::QualityAssurance => "qa",
            Self::Covariate => "cov",
            Self::Exposure => "exp",
            Self::Outcome => "out",
            Self::Temporary => "tmp",
        }
    }

    /// Whether variables of this role are written to the output
    #[must_use]
    pub const fn is_output(self) -> bool {
        !matches!(self, Self::Temporary)
    }
}

/// Column kind, from the type tag of a variable name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Binary,
    Numeric,
    Categorical,
    Date,
}

impl Kind {
    pub const ALL: [Self; 4] = [Self::Binary, Self::Numeric, Self::Categorical, Self::Date];

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::Numeric => "num",
            Self::Categorical => "cat",
            Self::Date => "date",
        }
    }

    /// Whether an expression of `value_type` may be stored under this tag
    #[must_use]
    pub const fn accepts(self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (Self::Binary, ValueType::Bool)
                | (Self::Numeric, ValueType::Int | ValueType::Float)
                | (Self::Categorical, ValueType::Str)
                | (Self::Date, ValueType::Date)
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Split a variable name into its role and kind
///
/// # Errors
/// Returns a definition error when the name is not
/// `<prefix>_<tag>_<description>` with a known prefix and tag and a
/// lowercase alphanumeric description.
pub fn parse_name(name: &str) -> Result<(Role, Kind)> {
    let invalid = |reason: &str| {
        DatasetError::definition(format!(
            "invalid variable name '{name}': {reason} (expected <prefix>_<tag>_<description>)"
        ))
    };

    let mut parts = name.splitn(3, '_');
    let (Some(prefix), Some(tag), Some(description)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("missing prefix or tag"));
    };

    let role = Role::ALL
        .into_iter()
        .find(|role| role.prefix() == prefix)
        .ok_or_else(|| invalid("unknown prefix"))?;
    let kind = Kind::ALL
        .into_iter()
        .find(|kind| kind.tag() == tag)
        .ok_or_else(|| invalid("unknown type tag"))?;

    let valid_description = !description.is_empty()
        && description
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_description {
        return Err(invalid("description must be lowercase letters, digits and '_'"));
    }
    Ok((role, kind))
}

/// A named, type-checked variable
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub expr: PatientExpr,
    pub role: Role,
    pub kind: Kind,
    pub value_type: ValueType,
    /// Every label a categorical variable can take
    pub vocabulary: Option<BTreeSet<String>>,
    /// Variables referenced by the expression
    pub dependencies: BTreeSet<String>,
}

impl Variable {
    #[must_use]
    pub const fn is_output(&self) -> bool {
        self.role.is_output()
    }
}

/// An ordered set of variables with a population filter
#[derive(Debug, Clone)]
pub struct Dataset {
    population: PatientExpr,
    variables: Vec<Variable>,
    scope: Scope,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    /// A dataset whose population is every patient in the patients table
    #[must_use]
    pub fn new() -> Self {
        Self {
            population: PatientExpr::literal(true),
            variables: Vec::new(),
            scope: Scope::default(),
        }
    }

    /// Restrict the output to patients for whom `population` is true
    ///
    /// The filter may reference variables defined so far; it is evaluated
    /// after the variables, and patients with a null result are excluded.
    pub fn define_population(&mut self, population: PatientExpr) -> Result<()> {
        let value_type = population.check(&self.scope)?;
        if value_type != ValueType::Bool {
            return Err(DatasetError::definition(format!(
                "population must be a boolean expression, found {value_type}"
            )));
        }
        self.population = population;
        Ok(())
    }

    /// Add a variable after validating it against the dataset so far
    pub fn add(&mut self, name: &str, expr: PatientExpr) -> Result<()> {
        let (role, kind) = parse_name(name)?;
        if self.scope.contains_key(name) {
            return Err(DatasetError::definition(format!(
                "variable '{name}' is already defined"
            )));
        }

        let value_type = expr.check(&self.scope).map_err(|e| match e {
            DatasetError::Definition(message) => {
                DatasetError::definition(format!("variable '{name}': {message}"))
            }
            other => other,
        })?;
        if !kind.accepts(value_type) {
            return Err(DatasetError::definition(format!(
                "variable '{name}' is tagged '{kind}' but its expression is {value_type}"
            )));
        }

        let total = expr.is_total(&self.scope);
        let vocabulary = if kind == Kind::Categorical {
            expr.vocabulary(&self.scope)
        } else {
            None
        };
        if kind == Kind::Categorical && role.is_output() {
            if !total {
                return Err(DatasetError::definition(format!(
                    "categorical variable '{name}' can be null; end it with a fallback value"
                )));
            }
            if vocabulary.is_none() {
                return Err(DatasetError::definition(format!(
                    "categorical variable '{name}' has an open set of values"
                )));
            }
        }

        let mut dependencies = BTreeSet::new();
        expr.collect_variables(&mut dependencies);

        log::debug!("Defined {name} ({value_type}) depending on {dependencies:?}");
        self.scope.insert(
            name.to_string(),
            VariableInfo {
                value_type,
                total,
                vocabulary: vocabulary.clone(),
            },
        );
        self.variables.push(Variable {
            name: name.to_string(),
            expr,
            role,
            kind,
            value_type,
            vocabulary,
            dependencies,
        });
        Ok(())
    }

    #[must_use]
    pub const fn population(&self) -> &PatientExpr {
        &self.population
    }

    /// Variables in definition order
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// Variables written to the output, in definition order
    pub fn output_columns(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|variable| variable.is_output())
    }

    /// Tables read by the population filter or any variable
    #[must_use]
    pub fn required_tables(&self) -> BTreeSet<Table> {
        let mut tables = BTreeSet::from([Table::Patients]);
        self.population.collect_tables(&mut tables);
        for variable in &self.variables {
            variable.expr.collect_tables(&mut tables);
        }
        tables
    }

    /// Names the variable references directly
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.get(name).map(|variable| &variable.dependencies)
    }

    /// Labels a categorical variable can take
    #[must_use]
    pub fn vocabulary(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.get(name).and_then(|variable| variable.vocabulary.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name() {
        assert_eq!(
            parse_name("cov_num_age").unwrap(),
            (Role::Covariate, Kind::Numeric)
        );
        assert_eq!(
            parse_name("exp_date_bari_hosp_first").unwrap(),
            (Role::Exposure, Kind::Date)
        );
        assert!(parse_name("age").is_err());
        assert!(parse_name("cov_int_age").is_err());
        assert!(parse_name("foo_bin_x").is_err());
        assert!(parse_name("cov_bin_").is_err());
        assert!(parse_name("cov_bin_Upper").is_err());
    }

    #[test]
    fn test_tag_must_match_type() {
        let mut dataset = Dataset::new();
        assert!(dataset.add("cov_bin_age", PatientExpr::literal(3i64)).is_err());
        assert!(dataset.add("cov_num_age", PatientExpr::literal(3i64)).is_ok());
        assert!(dataset.add("cov_num_age", PatientExpr::literal(4i64)).is_err());
    }
}
