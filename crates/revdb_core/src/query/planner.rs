//! Query normalization.
//!
//! Turns a [`Query`] into a [`PreparedQuery`]:
//! - every selector and sort field must be declared, and selector operands
//!   must fit the declared type
//! - the primary key is appended to the sort unless it is already last, so
//!   the sort is a strict total order
//! - the index hint must name a registered index; without a hint the first
//!   index (in declaration order) whose leading fields are the sort fields is
//!   used, falling back to the primary-key index
//! - skip defaults to 0 and limit to unbounded

use super::selector::Selector;
use super::sort::SortField;
use super::Query;
use crate::error::ValidationError;
use crate::schema::Schema;
use revdb_codec::Value;
use std::borrow::Cow;

/// A query validated against a schema and bound to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    selector: Selector,
    sort: Vec<SortField>,
    skip: usize,
    limit: Option<usize>,
    index: Vec<String>,
    primary_key: String,
}

impl PreparedQuery {
    /// The filter.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Full sort, ending with the primary key.
    pub fn sort(&self) -> &[SortField] {
        &self.sort
    }

    /// Results to skip.
    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Maximum results, if bounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Fields of the index candidates are read from, as normalized.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Primary key of the schema the query was prepared against.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }
}

/// Validates `query` against `schema` and binds it to an index.
///
/// Schemas that have not been normalized are normalized first.
///
/// # Errors
///
/// Returns a [`ValidationError`] for undeclared fields, operands of the wrong
/// type, or an index hint that names no registered index.
pub fn prepare(schema: &Schema, query: Query) -> Result<PreparedQuery, ValidationError> {
    let schema = if schema.is_normalized() {
        Cow::Borrowed(schema)
    } else {
        Cow::Owned(schema.clone().normalize()?)
    };
    let pk = schema.primary_key.clone();

    query.selector.visit_fields(&mut |field, operand| {
        let declared = schema
            .field_type(field)
            .ok_or_else(|| ValidationError::unknown_field(field))?;
        match operand {
            Some(value) if !declared.accepts(value) => Err(ValidationError::TypeMismatch {
                field: field.to_string(),
                expected: declared.as_str().to_string(),
                found: value.type_name().to_string(),
            }),
            Some(value) if contains_nan(value) => Err(ValidationError::NanOperand {
                field: field.to_string(),
            }),
            _ => Ok(()),
        }
    })?;

    let mut sort = query.sort;
    if let Some(unknown) = sort.iter().find(|s| schema.field_type(&s.field).is_none()) {
        return Err(ValidationError::unknown_field(unknown.field.clone()));
    }
    if sort.last().map(|s| s.field.as_str()) != Some(pk.as_str()) {
        sort.push(SortField::asc(pk.clone()));
    }

    let index = match query.index {
        Some(hint) => resolve_hint(&schema, &hint)?,
        None => default_index(&schema, &sort),
    };

    tracing::debug!(index = ?index, sort = sort.len(), "prepared query");
    Ok(PreparedQuery {
        selector: query.selector,
        sort,
        skip: query.skip.unwrap_or(0),
        limit: query.limit,
        index,
        primary_key: pk,
    })
}

fn contains_nan(value: &Value) -> bool {
    match value {
        Value::Float(f) => f.is_nan(),
        Value::Array(items) => items.iter().any(contains_nan),
        Value::Map(entries) => entries
            .iter()
            .any(|(k, v)| contains_nan(k) || contains_nan(v)),
        _ => false,
    }
}

/// Accepts the index's fields as declared or as normalized.
fn resolve_hint(schema: &Schema, hint: &[String]) -> Result<Vec<String>, ValidationError> {
    let pk = &schema.primary_key;
    schema
        .indexes
        .iter()
        .find(|fields| {
            fields.as_slice() == hint
                || (fields.last() == Some(pk) && &fields[..fields.len() - 1] == hint)
        })
        .cloned()
        .ok_or_else(|| ValidationError::UnknownIndex {
            fields: hint.to_vec(),
        })
}

fn default_index(schema: &Schema, sort: &[SortField]) -> Vec<String> {
    let wanted: Vec<&str> = sort[..sort.len().saturating_sub(1)]
        .iter()
        .map(|s| s.field.as_str())
        .collect();
    let pk_index = || vec![schema.primary_key.clone()];
    if wanted.is_empty() {
        return pk_index();
    }
    schema
        .indexes
        .iter()
        .find(|fields| {
            fields.len() >= wanted.len() && fields.iter().zip(&wanted).all(|(f, w)| f == w)
        })
        .cloned()
        .unwrap_or_else(pk_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn humans() -> Schema {
        Schema::new("_id")
            .field("name", FieldType::String)
            .field("gender", FieldType::String)
            .field("age", FieldType::Number)
            .index(["name", "gender", "age"])
            .index(["gender", "age", "name"])
            .index(["age", "name", "gender"])
            .index(["gender", "age"])
            .index(["name", "gender"])
            .normalize()
            .unwrap()
    }

    fn strings(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn appends_primary_key_to_sort() {
        let query = Query::default().sort_by(SortField::desc("age"));
        let prepared = prepare(&humans(), query).unwrap();
        assert_eq!(prepared.sort(), &[SortField::desc("age"), SortField::asc("_id")]);
        assert_eq!(prepared.skip(), 0);
        assert_eq!(prepared.limit(), None);
    }

    #[test]
    fn keeps_explicit_primary_key_direction() {
        let query = Query::default().sort_by(SortField::desc("_id"));
        let prepared = prepare(&humans(), query).unwrap();
        assert_eq!(prepared.sort(), &[SortField::desc("_id")]);
    }

    #[test]
    fn hint_accepts_declared_or_normalized_fields() {
        let declared = prepare(&humans(), Query::default().index(["gender", "age"])).unwrap();
        let normalized =
            prepare(&humans(), Query::default().index(["gender", "age", "_id"])).unwrap();
        assert_eq!(declared.index(), strings(&["gender", "age", "_id"]).as_slice());
        assert_eq!(declared, normalized);
    }

    #[test]
    fn unknown_hint_is_rejected() {
        let err = prepare(&humans(), Query::default().index(["age", "gender"])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownIndex {
                fields: strings(&["age", "gender"])
            }
        );
    }

    #[test]
    fn default_index_follows_sort() {
        let by_name = prepare(&humans(), Query::default().sort_by(SortField::asc("name"))).unwrap();
        assert_eq!(by_name.index(), strings(&["name", "gender", "age", "_id"]).as_slice());

        let by_age_name = prepare(
            &humans(),
            Query::default()
                .sort_by(SortField::asc("age"))
                .sort_by(SortField::asc("name")),
        )
        .unwrap();
        assert_eq!(by_age_name.index(), strings(&["age", "name", "gender", "_id"]).as_slice());

        let unsorted = prepare(&humans(), Query::default()).unwrap();
        assert_eq!(unsorted.index(), strings(&["_id"]).as_slice());

        let query = Query::default().sort_by(SortField::asc("_deleted"));
        let no_match = prepare(&humans(), query).unwrap();
        assert_eq!(no_match.index(), strings(&["_id"]).as_slice());
    }

    #[test]
    fn unknown_selector_field_is_rejected() {
        let err = prepare(&humans(), Query::new(Selector::eq("unknownField", 1))).unwrap_err();
        assert_eq!(err, ValidationError::unknown_field("unknownField"));
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let query = Query::default().sort_by(SortField::asc("height"));
        let err = prepare(&humans(), query).unwrap_err();
        assert_eq!(err, ValidationError::unknown_field("height"));
    }

    #[test]
    fn operand_types_are_checked() {
        let err = prepare(&humans(), Query::new(Selector::gte("age", "eighteen"))).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));

        let nested = Selector::not(Selector::one_of("name", [Value::Integer(1)]));
        assert!(prepare(&humans(), Query::new(nested)).is_err());

        assert!(prepare(&humans(), Query::new(Selector::eq("name", ()))).is_ok());
        assert!(prepare(&humans(), Query::new(Selector::not_deleted())).is_ok());
    }

    #[test]
    fn nan_operands_are_rejected() {
        let nan = || ValidationError::NanOperand {
            field: "age".to_string(),
        };
        let selectors = [
            Selector::eq("age", f64::NAN),
            Selector::gt("age", f64::NAN),
            Selector::gte("age", f64::NAN),
            Selector::lt("age", f64::NAN),
            Selector::one_of("age", [Value::Integer(1), Value::Float(f64::NAN)]),
            Selector::not(Selector::eq("age", f64::NAN)),
        ];
        for selector in selectors {
            assert_eq!(prepare(&humans(), Query::new(selector)).unwrap_err(), nan());
        }
        assert!(prepare(&humans(), Query::new(Selector::gte("age", f64::INFINITY))).is_ok());
    }

    #[test]
    fn unnormalized_schema_is_normalized() {
        let raw = Schema::new("id").field("n", FieldType::Integer).index(["n"]);
        let prepared = prepare(&raw, Query::default().sort_by(SortField::asc("n"))).unwrap();
        assert_eq!(prepared.index(), strings(&["n", "id"]).as_slice());
        assert_eq!(prepared.primary_key(), "id");
    }
}
