//! Compound index keys.

use crate::document::Document;
use crate::query::compare::compare_fields;
use revdb_codec::Value;
use std::cmp::Ordering;

/// Values of a document's indexed fields, in index order.
///
/// Missing fields are `None` and sort before every present value. Keys are
/// ordered component by component with the query comparator, and a key that
/// is a prefix of another sorts first.
#[derive(Debug, Clone)]
pub struct IndexKey(Vec<Option<Value>>);

impl IndexKey {
    /// Extracts the key of `doc` for an index over `fields`.
    pub fn of(doc: &Document, fields: &[String], primary_key: &str) -> Self {
        Self(fields.iter().map(|f| doc.field(f, primary_key)).collect())
    }

    /// A one-component key, used as a scan start.
    pub fn prefix(value: &Value) -> Self {
        Self(vec![Some(value.clone())])
    }

    /// Returns the leading component.
    pub fn first(&self) -> Option<&Value> {
        self.0.first().and_then(Option::as_ref)
    }

    /// Returns all components.
    pub fn components(&self) -> &[Option<Value>] {
        &self.0
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| compare_fields(a.as_ref(), b.as_ref()))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for IndexKey {}
