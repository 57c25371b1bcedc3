//! Declarative queries.
//!
//! A [`Query`] is what callers write; [`prepare`] validates it against a
//! schema and binds it to an index, producing a [`PreparedQuery`] a storage
//! instance can execute.

pub mod compare;
pub(crate) mod executor;
mod planner;
mod selector;
mod sort;

pub use planner::{prepare, PreparedQuery};
pub use selector::Selector;
pub use sort::{SortDirection, SortField};

use crate::error::ValidationError;

impl Default for Selector {
    fn default() -> Self {
        Self::All
    }
}

/// An unvalidated query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// Filter.
    pub selector: Selector,
    /// Sort keys, most significant first.
    pub sort: Vec<SortField>,
    /// Results to skip.
    pub skip: Option<usize>,
    /// Maximum results.
    pub limit: Option<usize>,
    /// Fields of the index to read candidates from.
    pub index: Option<Vec<String>>,
}

impl Query {
    /// Creates a query with the given selector.
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sort_by(mut self, field: SortField) -> Self {
        self.sort.push(field);
        self
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the maximum number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Names the index to read candidates from.
    #[must_use]
    pub fn index<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.index = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Parses a mango query document:
    ///
    /// ```json
    /// { "selector": {"age": {"$gte": 18}}, "sort": [{"name": "asc"}],
    ///   "skip": 0, "limit": 10, "index": ["name", "age"] }
    /// ```
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValidationError> {
        let object = json
            .as_object()
            .ok_or_else(|| ValidationError::invalid_query("query must be an object"))?;

        let mut query = Self::default();
        for (key, value) in object {
            match key.as_str() {
                "selector" => query.selector = Selector::from_json(value)?,
                "sort" => query.sort = SortField::parse_list(value)?,
                "skip" => query.skip = Some(non_negative("skip", value)?),
                "limit" => query.limit = Some(non_negative("limit", value)?),
                "index" => query.index = Some(index_fields(value)?),
                other => {
                    return Err(ValidationError::invalid_query(format!(
                        "unknown query key {other:?}"
                    )))
                }
            }
        }
        Ok(query)
    }
}

fn non_negative(key: &str, value: &serde_json::Value) -> Result<usize, ValidationError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            ValidationError::invalid_query(format!(
                "{key} must be a non-negative integer, got {value}"
            ))
        })
}

fn index_fields(value: &serde_json::Value) -> Result<Vec<String>, ValidationError> {
    match value {
        serde_json::Value::String(field) => Ok(vec![field.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ValidationError::invalid_query("index fields must be strings"))
            })
            .collect(),
        _ => Err(ValidationError::invalid_query(
            "index must be a field name or a list of field names",
        )),
    }
}
