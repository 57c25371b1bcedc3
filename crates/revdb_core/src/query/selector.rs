//! Selector AST and its evaluator.
//!
//! Selectors are a closed tree of predicates over field paths. They can be
//! built with the constructor helpers or parsed from a mango-style JSON
//! document:
//!
//! ```json
//! { "age": { "$gte": 18, "$lt": 65 }, "$or": [{ "gender": "f" }, { "gender": "x" }] }
//! ```
//!
//! Matching rules:
//! - `Eq` and `In` compare with the query comparator, so `30` equals `30.0`.
//!   A `null` operand also matches a missing field.
//! - `Range` only matches values in the same type class as its bounds.
//! - `$ne` and `$nin` are negations and therefore match missing fields.

use super::compare::{compare_values, same_class, values_equal};
use crate::document::Document;
use crate::error::ValidationError;
use revdb_codec::Value;
use std::ops::Bound;

/// A predicate over a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Matches every document.
    All,
    /// Field equals a value.
    Eq {
        /// Field path.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field lies between two bounds.
    Range {
        /// Field path.
        field: String,
        /// Lower bound.
        lower: Bound<Value>,
        /// Upper bound.
        upper: Bound<Value>,
    },
    /// Field equals one of several values.
    In {
        /// Field path.
        field: String,
        /// Candidates.
        values: Vec<Value>,
    },
    /// Field presence.
    Exists {
        /// Field path.
        field: String,
        /// Whether the field must be present.
        exists: bool,
    },
    /// All children match.
    And(Vec<Selector>),
    /// At least one child matches.
    Or(Vec<Selector>),
    /// The child does not match.
    Not(Box<Selector>),
}

impl Selector {
    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field != value` (also matches a missing field).
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Not(Box::new(Self::eq(field, value)))
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, Bound::Excluded(value.into()), Bound::Unbounded)
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, Bound::Included(value.into()), Bound::Unbounded)
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, Bound::Unbounded, Bound::Excluded(value.into()))
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, Bound::Unbounded, Bound::Included(value.into()))
    }

    /// `lower <= field <= upper` with explicit bounds.
    pub fn range(field: impl Into<String>, lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self::Range {
            field: field.into(),
            lower,
            upper,
        }
    }

    /// `field ∈ values`.
    pub fn one_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field ∉ values` (also matches a missing field).
    pub fn none_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::Not(Box::new(Self::one_of(field, values)))
    }

    /// Field presence test.
    pub fn exists(field: impl Into<String>, exists: bool) -> Self {
        Self::Exists {
            field: field.into(),
            exists,
        }
    }

    /// Conjunction.
    pub fn and(children: impl IntoIterator<Item = Selector>) -> Self {
        Self::And(children.into_iter().collect())
    }

    /// Disjunction.
    pub fn or(children: impl IntoIterator<Item = Selector>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Selector) -> Self {
        Self::Not(Box::new(child))
    }

    /// Matches live documents only.
    pub fn not_deleted() -> Self {
        Self::eq(crate::document::DELETED_FIELD, false)
    }

    /// Evaluates the selector against one document state.
    pub fn matches(&self, doc: &Document, primary_key: &str) -> bool {
        self.eval(&|path| doc.field(path, primary_key))
    }

    /// Evaluates the selector with a custom field resolver.
    pub fn eval<F>(&self, resolve: &F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            Self::All => true,
            Self::Eq { field, value } => eq_matches(resolve(field).as_ref(), value),
            Self::Range {
                field,
                lower,
                upper,
            } => match resolve(field) {
                Some(actual) => in_range(&actual, lower, upper),
                None => false,
            },
            Self::In { field, values } => {
                let actual = resolve(field);
                values.iter().any(|v| eq_matches(actual.as_ref(), v))
            }
            Self::Exists { field, exists } => resolve(field).is_some() == *exists,
            Self::And(children) => children.iter().all(|c| c.eval(resolve)),
            Self::Or(children) => children.iter().any(|c| c.eval(resolve)),
            Self::Not(child) => !child.eval(resolve),
        }
    }

    /// Bounds every matching document's value of `field` must lie within.
    ///
    /// Only conjunctive `Eq` and `Range` clauses contribute; anything else
    /// yields unbounded ends. The bounds are in the query comparator's order.
    pub fn bounds_on(&self, field: &str) -> (Bound<&Value>, Bound<&Value>) {
        match self {
            Self::Eq { field: f, value } if f == field && !value.is_null() => {
                (Bound::Included(value), Bound::Included(value))
            }
            Self::Range {
                field: f,
                lower,
                upper,
            } if f == field => (lower.as_ref(), upper.as_ref()),
            Self::And(children) => children
                .iter()
                .map(|c| c.bounds_on(field))
                .find(|(lo, hi)| !matches!((lo, hi), (Bound::Unbounded, Bound::Unbounded)))
                .unwrap_or((Bound::Unbounded, Bound::Unbounded)),
            _ => (Bound::Unbounded, Bound::Unbounded),
        }
    }

    /// Calls `visit` for every field path and operand in the tree.
    ///
    /// `Exists` clauses report no operand.
    pub fn visit_fields<E>(
        &self,
        visit: &mut impl FnMut(&str, Option<&Value>) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Self::All => Ok(()),
            Self::Eq { field, value } => visit(field, Some(value)),
            Self::Range {
                field,
                lower,
                upper,
            } => {
                if lower == &Bound::Unbounded && upper == &Bound::Unbounded {
                    return visit(field, None);
                }
                for bound in [lower, upper] {
                    if let Bound::Included(v) | Bound::Excluded(v) = bound {
                        visit(field, Some(v))?;
                    }
                }
                Ok(())
            }
            Self::In { field, values } => {
                if values.is_empty() {
                    return visit(field, None);
                }
                values.iter().try_for_each(|v| visit(field, Some(v)))
            }
            Self::Exists { field, .. } => visit(field, None),
            Self::And(children) | Self::Or(children) => {
                children.iter().try_for_each(|c| c.visit_fields(visit))
            }
            Self::Not(child) => child.visit_fields(visit),
        }
    }

    /// Parses a mango-style JSON selector.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValidationError> {
        let object = json
            .as_object()
            .ok_or_else(|| ValidationError::invalid_selector("selector must be an object"))?;

        let mut clauses = Vec::with_capacity(object.len());
        for (key, operand) in object {
            match key.as_str() {
                "$and" => clauses.push(Self::And(parse_list(key, operand)?)),
                "$or" => clauses.push(Self::Or(parse_list(key, operand)?)),
                "$nor" => clauses.push(Self::not(Self::Or(parse_list(key, operand)?))),
                op if op.starts_with('$') => {
                    return Err(ValidationError::invalid_selector(format!(
                        "unknown top-level operator {op}"
                    )))
                }
                field => clauses.push(parse_field(field, operand)?),
            }
        }
        Ok(collapse(clauses))
    }
}

fn collapse(mut clauses: Vec<Selector>) -> Selector {
    match clauses.len() {
        0 => Selector::All,
        1 => clauses.remove(0),
        _ => Selector::And(clauses),
    }
}

fn parse_list(op: &str, operand: &serde_json::Value) -> Result<Vec<Selector>, ValidationError> {
    let items = operand
        .as_array()
        .ok_or_else(|| ValidationError::invalid_selector(format!("{op} expects an array")))?;
    items.iter().map(Selector::from_json).collect()
}

fn is_operator_object(operand: &serde_json::Value) -> bool {
    operand
        .as_object()
        .is_some_and(|o| !o.is_empty() && o.keys().all(|k| k.starts_with('$')))
}

fn parse_field(field: &str, operand: &serde_json::Value) -> Result<Selector, ValidationError> {
    if !is_operator_object(operand) {
        return Ok(Selector::eq(field, Value::from(operand.clone())));
    }
    let ops = operand
        .as_object()
        .ok_or_else(|| ValidationError::invalid_selector("operator object expected"))?;

    let mut clauses = Vec::new();
    let mut lower = Bound::Unbounded;
    let mut upper = Bound::Unbounded;
    for (op, arg) in ops {
        let value = || Value::from(arg.clone());
        match op.as_str() {
            "$eq" => clauses.push(Selector::eq(field, value())),
            "$ne" => clauses.push(Selector::ne(field, value())),
            "$gt" | "$gte" => {
                let bound = if op == "$gt" {
                    Bound::Excluded(value())
                } else {
                    Bound::Included(value())
                };
                if lower == Bound::Unbounded {
                    lower = bound;
                } else {
                    clauses.push(Selector::range(field, bound, Bound::Unbounded));
                }
            }
            "$lt" | "$lte" => {
                let bound = if op == "$lt" {
                    Bound::Excluded(value())
                } else {
                    Bound::Included(value())
                };
                if upper == Bound::Unbounded {
                    upper = bound;
                } else {
                    clauses.push(Selector::range(field, Bound::Unbounded, bound));
                }
            }
            "$in" | "$nin" => {
                let values: Vec<Value> = arg
                    .as_array()
                    .ok_or_else(|| {
                        ValidationError::invalid_selector(format!("{op} expects an array"))
                    })?
                    .iter()
                    .cloned()
                    .map(Value::from)
                    .collect();
                clauses.push(if op == "$in" {
                    Selector::one_of(field, values)
                } else {
                    Selector::none_of(field, values)
                });
            }
            "$exists" => {
                let exists = arg
                    .as_bool()
                    .ok_or_else(|| ValidationError::invalid_selector("$exists expects a boolean"))?;
                clauses.push(Selector::exists(field, exists));
            }
            "$not" => {
                if !is_operator_object(arg) {
                    return Err(ValidationError::invalid_selector(
                        "$not expects an operator object",
                    ));
                }
                clauses.push(Selector::not(parse_field(field, arg)?));
            }
            other => {
                return Err(ValidationError::invalid_selector(format!(
                    "unknown operator {other} on field {field:?}"
                )))
            }
        }
    }
    if lower != Bound::Unbounded || upper != Bound::Unbounded {
        clauses.insert(0, Selector::range(field, lower, upper));
    }
    Ok(collapse(clauses))
}

fn eq_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(actual) => values_equal(actual, expected),
        None => expected.is_null(),
    }
}

fn in_range(actual: &Value, lower: &Bound<Value>, upper: &Bound<Value>) -> bool {
    let above = match lower {
        Bound::Unbounded => true,
        Bound::Included(b) => same_class(actual, b) && compare_values(actual, b).is_ge(),
        Bound::Excluded(b) => same_class(actual, b) && compare_values(actual, b).is_gt(),
    };
    let below = match upper {
        Bound::Unbounded => true,
        Bound::Included(b) => same_class(actual, b) && compare_values(actual, b).is_le(),
        Bound::Excluded(b) => same_class(actual, b) && compare_values(actual, b).is_lt(),
    };
    above && below
}
