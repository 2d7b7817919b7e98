//! Patient-level expressions
//!
//! A [`PatientExpr`] describes how to compute one value per patient. Building
//! an expression never reads data; [`PatientExpr::check`] infers its type and
//! rejects invalid definitions up front, and
//! [`EvalContext`](crate::query::eval::EvalContext) evaluates it for one
//! patient.
//!
//! Null is the absent marker and propagates: comparisons with null are null,
//! and boolean connectives follow three-valued logic.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::codelist::Codelist;
use crate::error::{DatasetError, Result};
use crate::models::CodeField;
use crate::query::frame::{Column, EventQuery, Position, RecordSelection};
use crate::query::value::{Value, ValueType};
use crate::tables::Table;

/// Demographic fields of the patients table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientField {
    DateOfBirth,
    Sex,
    DateOfDeath,
}

impl PatientField {
    #[must_use]
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::DateOfBirth | Self::DateOfDeath => ValueType::Date,
            Self::Sex => ValueType::Str,
        }
    }
}

/// Fields of the address in use on a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    ImdRounded,
    CareHomeIsPotentialMatch,
    CareHomeRequiresNursing,
    CareHomeDoesNotRequireNursing,
}

impl AddressField {
    #[must_use]
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::ImdRounded => ValueType::Int,
            Self::CareHomeIsPotentialMatch
            | Self::CareHomeRequiresNursing
            | Self::CareHomeDoesNotRequireNursing => ValueType::Bool,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Whether the operator holds for an ordering of left to right
    #[must_use]
    pub const fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Eq => matches!(ordering, Equal),
            Self::Ne => !matches!(ordering, Equal),
            Self::Lt => matches!(ordering, Less),
            Self::Le => matches!(ordering, Less | Equal),
            Self::Gt => matches!(ordering, Greater),
            Self::Ge => matches!(ordering, Greater | Equal),
        }
    }
}

/// What is known about an already defined variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub value_type: ValueType,
    /// Never null for any patient
    pub total: bool,
    /// Every string the variable can take, when bounded
    pub vocabulary: Option<BTreeSet<String>>,
}

/// Variables visible to an expression
pub type Scope = FxHashMap<String, VariableInfo>;

/// A patient-level expression
#[derive(Debug, Clone)]
pub enum PatientExpr {
    /// A non-null constant
    Literal(Value),
    /// A typed null
    Null(ValueType),
    Patient(PatientField),
    /// Reference to a previously defined variable
    Variable(String),
    Count(EventQuery),
    Exists(EventQuery),
    Pick {
        query: EventQuery,
        position: Position,
        column: Column,
    },
    Category {
        query: EventQuery,
        position: Position,
        field: CodeField,
        codelist: Arc<Codelist>,
    },
    Address {
        on: Box<PatientExpr>,
        field: AddressField,
    },
    Not(Box<PatientExpr>),
    And(Vec<PatientExpr>),
    Or(Vec<PatientExpr>),
    Compare {
        op: CompareOp,
        left: Box<PatientExpr>,
        right: Box<PatientExpr>,
    },
    IsNull(Box<PatientExpr>),
    IsIn {
        expr: Box<PatientExpr>,
        values: Vec<Value>,
    },
    /// First branch whose condition is true; null conditions count as false
    Case {
        branches: Vec<(PatientExpr, PatientExpr)>,
        otherwise: Option<Box<PatientExpr>>,
    },
    /// First non-null operand
    Coalesce(Vec<PatientExpr>),
    AddDays {
        date: Box<PatientExpr>,
        days: i64,
    },
    Year(Box<PatientExpr>),
    /// Whole years from the first date to the second (age)
    YearsBetween {
        from: Box<PatientExpr>,
        to: Box<PatientExpr>,
    },
}

impl PatientExpr {
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub const fn null(value_type: ValueType) -> Self {
        Self::Null(value_type)
    }

    #[must_use]
    pub fn variable(name: &str) -> Self {
        Self::Variable(name.to_string())
    }

    #[must_use]
    pub const fn date_of_birth() -> Self {
        Self::Patient(PatientField::DateOfBirth)
    }

    #[must_use]
    pub const fn sex() -> Self {
        Self::Patient(PatientField::Sex)
    }

    #[must_use]
    pub const fn date_of_death() -> Self {
        Self::Patient(PatientField::DateOfDeath)
    }

    /// A field of the address in use on `on`
    #[must_use]
    pub fn address(on: impl Into<Self>, field: AddressField) -> Self {
        Self::Address {
            on: Box::new(on.into()),
            field,
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Conjunction, flattening nested conjunctions
    #[must_use]
    pub fn and(self, rhs: impl Into<Self>) -> Self {
        match (self, rhs.into()) {
            (Self::And(mut lhs), Self::And(rhs)) => {
                lhs.extend(rhs);
                Self::And(lhs)
            }
            (Self::And(mut lhs), rhs) => {
                lhs.push(rhs);
                Self::And(lhs)
            }
            (lhs, rhs) => Self::And(vec![lhs, rhs]),
        }
    }

    /// Disjunction, flattening nested disjunctions
    #[must_use]
    pub fn or(self, rhs: impl Into<Self>) -> Self {
        match (self, rhs.into()) {
            (Self::Or(mut lhs), Self::Or(rhs)) => {
                lhs.extend(rhs);
                Self::Or(lhs)
            }
            (Self::Or(mut lhs), rhs) => {
                lhs.push(rhs);
                Self::Or(lhs)
            }
            (lhs, rhs) => Self::Or(vec![lhs, rhs]),
        }
    }

    fn compare(self, op: CompareOp, rhs: impl Into<Self>) -> Self {
        Self::Compare {
            op,
            left: Box::new(self),
            right: Box::new(rhs.into()),
        }
    }

    #[must_use]
    pub fn eq(self, rhs: impl Into<Self>) -> Self {
        self.compare(CompareOp::Eq, rhs)
    }

    #[must_use]
    pub fn ne(self, rhs: impl Into<Self>) -> Self {
        self.compare(CompareOp::Ne, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: impl Into<Self>) -> Self {
        self.compare(CompareOp::Lt, rhs)
    }

    #[must_use]
    pub fn le(self, rhs: impl Into<Self>) -> Self {
        self.compare(CompareOp::Le, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: impl Into<Self>) -> Self {
        self.compare(CompareOp::Gt, rhs)
    }

    #[must_use]
    pub fn ge(self, rhs: impl Into<Self>) -> Self {
        self.compare(CompareOp::Ge, rhs)
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.is_null().not()
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        Self::IsIn {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn add_days(self, days: i64) -> Self {
        Self::AddDays {
            date: Box::new(self),
            days,
        }
    }

    #[must_use]
    pub fn year(self) -> Self {
        Self::Year(Box::new(self))
    }

    /// Whole years from this date to `to`
    #[must_use]
    pub fn years_until(self, to: impl Into<Self>) -> Self {
        Self::YearsBetween {
            from: Box::new(self),
            to: Box::new(to.into()),
        }
    }

    /// Infer the type of the expression, validating every query in it
    pub fn check(&self, scope: &Scope) -> Result<ValueType> {
        match self {
            Self::Literal(value) => value.value_type().ok_or_else(|| {
                DatasetError::definition("null literal has no type, use PatientExpr::null")
            }),
            Self::Null(value_type) => Ok(*value_type),
            Self::Patient(field) => Ok(field.value_type()),
            Self::Variable(name) => scope.get(name).map(|info| info.value_type).ok_or_else(|| {
                DatasetError::definition(format!(
                    "reference to undefined variable '{name}' (variables must be defined before use)"
                ))
            }),
            Self::Count(query) => {
                query.validate(scope)?;
                Ok(ValueType::Int)
            }
            Self::Exists(query) => {
                query.validate(scope)?;
                Ok(ValueType::Bool)
            }
            Self::Pick { query, column, .. } => {
                query.validate(scope)?;
                column.validate_on(query.table)?;
                Ok(column.value_type())
            }
            Self::Category {
                query,
                field,
                codelist,
                ..
            } => {
                RecordSelection::validate_category(query, *field, codelist, scope)?;
                Ok(ValueType::Str)
            }
            Self::Address { on, field } => {
                expect_type(on, ValueType::Date, scope, "address date")?;
                Ok(field.value_type())
            }
            Self::Not(inner) => {
                expect_type(inner, ValueType::Bool, scope, "negation")?;
                Ok(ValueType::Bool)
            }
            Self::And(operands) | Self::Or(operands) => {
                for operand in operands {
                    expect_type(operand, ValueType::Bool, scope, "boolean connective")?;
                }
                Ok(ValueType::Bool)
            }
            Self::Compare { op, left, right } => {
                let (lhs, rhs) = (left.check(scope)?, right.check(scope)?);
                if !lhs.comparable_with(rhs) {
                    return Err(DatasetError::definition(format!(
                        "cannot compare {lhs} with {rhs} ({op:?})"
                    )));
                }
                Ok(ValueType::Bool)
            }
            Self::IsNull(inner) => {
                inner.check(scope)?;
                Ok(ValueType::Bool)
            }
            Self::IsIn { expr, values } => {
                let value_type = expr.check(scope)?;
                for value in values {
                    let comparable = value
                        .value_type()
                        .is_some_and(|candidate| candidate.comparable_with(value_type));
                    if !comparable {
                        return Err(DatasetError::definition(format!(
                            "cannot test {value_type} against {value}"
                        )));
                    }
                }
                Ok(ValueType::Bool)
            }
            Self::Case {
                branches,
                otherwise,
            } => {
                let mut result: Option<ValueType> = None;
                for (condition, value) in branches {
                    expect_type(condition, ValueType::Bool, scope, "case condition")?;
                    result = Some(unify_branch(result, value.check(scope)?)?);
                }
                if let Some(otherwise) = otherwise {
                    result = Some(unify_branch(result, otherwise.check(scope)?)?);
                }
                result.ok_or_else(|| DatasetError::definition("case expression has no branches"))
            }
            Self::Coalesce(operands) => {
                let mut result: Option<ValueType> = None;
                for operand in operands {
                    result = Some(unify_branch(result, operand.check(scope)?)?);
                }
                result.ok_or_else(|| DatasetError::definition("coalesce has no operands"))
            }
            Self::AddDays { date, .. } => {
                expect_type(date, ValueType::Date, scope, "date arithmetic")?;
                Ok(ValueType::Date)
            }
            Self::Year(date) => {
                expect_type(date, ValueType::Date, scope, "year")?;
                Ok(ValueType::Int)
            }
            Self::YearsBetween { from, to } => {
                expect_type(from, ValueType::Date, scope, "years between")?;
                expect_type(to, ValueType::Date, scope, "years between")?;
                Ok(ValueType::Int)
            }
        }
    }

    /// Whether the expression is non-null for every patient
    #[must_use]
    pub fn is_total(&self, scope: &Scope) -> bool {
        match self {
            Self::Literal(_) | Self::Count(_) | Self::Exists(_) | Self::IsNull(_) => true,
            Self::Null(_)
            | Self::Patient(_)
            | Self::Pick { .. }
            | Self::Category { .. }
            | Self::Address { .. } => false,
            Self::Variable(name) => scope.get(name).is_some_and(|info| info.total),
            Self::Not(inner)
            | Self::IsIn { expr: inner, .. }
            | Self::AddDays { date: inner, .. }
            | Self::Year(inner) => inner.is_total(scope),
            Self::And(operands) | Self::Or(operands) => {
                operands.iter().all(|operand| operand.is_total(scope))
            }
            Self::Compare { left, right, .. } => left.is_total(scope) && right.is_total(scope),
            // Age of a total birth date can still be negative, so never total
            Self::YearsBetween { .. } => false,
            Self::Case {
                branches,
                otherwise,
            } => {
                otherwise
                    .as_ref()
                    .is_some_and(|otherwise| otherwise.is_total(scope))
                    && branches.iter().all(|(_, value)| value.is_total(scope))
            }
            Self::Coalesce(operands) => operands.iter().any(|operand| operand.is_total(scope)),
        }
    }

    /// Every string value the expression can produce, when bounded
    ///
    /// `None` means the vocabulary is open (e.g. a raw code or text field).
    #[must_use]
    pub fn vocabulary(&self, scope: &Scope) -> Option<BTreeSet<String>> {
        match self {
            Self::Literal(Value::Str(value)) => Some(BTreeSet::from([value.clone()])),
            Self::Null(_) => Some(BTreeSet::new()),
            Self::Variable(name) => scope.get(name).and_then(|info| info.vocabulary.clone()),
            Self::Category { codelist, .. } => Some(
                codelist
                    .categories()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
            Self::Case {
                branches,
                otherwise,
            } => {
                let mut vocabulary = BTreeSet::new();
                for (_, value) in branches {
                    vocabulary.extend(value.vocabulary(scope)?);
                }
                if let Some(otherwise) = otherwise {
                    vocabulary.extend(otherwise.vocabulary(scope)?);
                }
                Some(vocabulary)
            }
            Self::Coalesce(operands) => {
                let mut vocabulary = BTreeSet::new();
                for operand in operands {
                    vocabulary.extend(operand.vocabulary(scope)?);
                }
                Some(vocabulary)
            }
            _ => None,
        }
    }

    /// Visit direct sub-expressions, including query date bounds
    pub fn for_each_child(&self, f: &mut dyn FnMut(&Self)) {
        match self {
            Self::Literal(_) | Self::Null(_) | Self::Patient(_) | Self::Variable(_) => {}
            Self::Count(query)
            | Self::Exists(query)
            | Self::Pick { query, .. }
            | Self::Category { query, .. } => query.predicate.for_each_bound(f),
            Self::Address { on: inner, .. }
            | Self::Not(inner)
            | Self::IsNull(inner)
            | Self::IsIn { expr: inner, .. }
            | Self::AddDays { date: inner, .. }
            | Self::Year(inner) => f(inner),
            Self::And(operands) | Self::Or(operands) | Self::Coalesce(operands) => {
                operands.iter().for_each(|operand| f(operand));
            }
            Self::Compare { left, right, .. } => {
                f(left);
                f(right);
            }
            Self::YearsBetween { from, to } => {
                f(from);
                f(to);
            }
            Self::Case {
                branches,
                otherwise,
            } => {
                for (condition, value) in branches {
                    f(condition);
                    f(value);
                }
                if let Some(otherwise) = otherwise {
                    f(otherwise);
                }
            }
        }
    }

    /// Add the tables the expression reads to `tables`
    pub fn collect_tables(&self, tables: &mut BTreeSet<Table>) {
        match self {
            Self::Patient(_) => {
                tables.insert(Table::Patients);
            }
            Self::Address { .. } => {
                tables.insert(Table::Addresses);
            }
            Self::Count(query)
            | Self::Exists(query)
            | Self::Pick { query, .. }
            | Self::Category { query, .. } => {
                tables.insert(query.table);
            }
            _ => {}
        }
        self.for_each_child(&mut |child| child.collect_tables(tables));
    }

    /// Add the names of referenced variables to `names`
    pub fn collect_variables(&self, names: &mut BTreeSet<String>) {
        if let Self::Variable(name) = self {
            names.insert(name.clone());
        }
        self.for_each_child(&mut |child| child.collect_variables(names));
    }
}

fn expect_type(expr: &PatientExpr, expected: ValueType, scope: &Scope, context: &str) -> Result<()> {
    let actual = expr.check(scope)?;
    if actual == expected {
        Ok(())
    } else {
        Err(DatasetError::definition(format!(
            "{context} expects a {expected} expression, found {actual}"
        )))
    }
}

fn unify_branch(current: Option<ValueType>, next: ValueType) -> Result<ValueType> {
    match current {
        None => Ok(next),
        Some(current) => current.unify(next).ok_or_else(|| {
            DatasetError::definition(format!("branches mix {current} and {next} values"))
        }),
    }
}

/// Disjunction of several expressions
#[must_use]
pub fn any_of(operands: impl IntoIterator<Item = PatientExpr>) -> PatientExpr {
    PatientExpr::Or(operands.into_iter().collect())
}

/// Conjunction of several expressions
#[must_use]
pub fn all_of(operands: impl IntoIterator<Item = PatientExpr>) -> PatientExpr {
    PatientExpr::And(operands.into_iter().collect())
}

/// Ordered decision table with a fallback value
#[must_use]
pub fn case(
    branches: impl IntoIterator<Item = (PatientExpr, PatientExpr)>,
    otherwise: Option<PatientExpr>,
) -> PatientExpr {
    PatientExpr::Case {
        branches: branches.into_iter().collect(),
        otherwise: otherwise.map(Box::new),
    }
}

/// First non-null operand
#[must_use]
pub fn coalesce(operands: impl IntoIterator<Item = PatientExpr>) -> PatientExpr {
    PatientExpr::Coalesce(operands.into_iter().collect())
}

impl From<Value> for PatientExpr {
    fn from(value: Value) -> Self {
        match value.value_type() {
            Some(_) => Self::Literal(value),
            // An untyped null only arises from `Option::None`; treat as a null date
            None => Self::Null(ValueType::Date),
        }
    }
}

impl From<bool> for PatientExpr {
    fn from(value: bool) -> Self {
        Self::literal(value)
    }
}

impl From<i64> for PatientExpr {
    fn from(value: i64) -> Self {
        Self::literal(value)
    }
}

impl From<f64> for PatientExpr {
    fn from(value: f64) -> Self {
        Self::literal(value)
    }
}

impl From<NaiveDate> for PatientExpr {
    fn from(value: NaiveDate) -> Self {
        Self::literal(value)
    }
}

impl From<&str> for PatientExpr {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<Option<NaiveDate>> for PatientExpr {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map_or(Self::Null(ValueType::Date), Self::literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(value_type: ValueType, total: bool) -> VariableInfo {
        VariableInfo {
            value_type,
            total,
            vocabulary: None,
        }
    }

    #[test]
    fn test_undefined_variable_rejected() {
        let scope = Scope::default();
        assert!(PatientExpr::variable("cov_num_age").check(&scope).is_err());
    }

    #[test]
    fn test_case_totality_needs_fallback() {
        let scope = Scope::default();
        let condition = PatientExpr::sex().eq("female");
        let without = case([(condition.clone(), PatientExpr::from("F"))], None);
        let with = case([(condition, PatientExpr::from("F"))], Some("unknown".into()));

        assert!(!without.is_total(&scope));
        assert!(with.is_total(&scope));
        assert_eq!(
            with.vocabulary(&scope),
            Some(BTreeSet::from(["F".to_string(), "unknown".to_string()]))
        );
    }

    #[test]
    fn test_coalesce_total_when_any_operand_total() {
        let mut scope = Scope::default();
        scope.insert("tmp_cat_x".to_string(), info(ValueType::Str, false));
        let expr = coalesce([PatientExpr::variable("tmp_cat_x"), "none".into()]);
        assert!(expr.is_total(&scope));
        assert_eq!(expr.check(&scope).unwrap(), ValueType::Str);
        // The variable has an open vocabulary, so the coalesce does too
        assert_eq!(expr.vocabulary(&scope), None);
    }

    #[test]
    fn test_mixed_branch_types_rejected() {
        let scope = Scope::default();
        let expr = case([(true.into(), PatientExpr::from("a"))], Some(1i64.into()));
        assert!(expr.check(&scope).is_err());
    }

    #[test]
    fn test_collect_variables_through_comparisons() {
        let expr = PatientExpr::variable("exp_date_a")
            .is_not_null()
            .or(PatientExpr::variable("exp_date_b").is_not_null());
        let mut names = BTreeSet::new();
        expr.collect_variables(&mut names);
        assert_eq!(names.len(), 2);
    }
}
