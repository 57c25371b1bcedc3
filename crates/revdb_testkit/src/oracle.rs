//! Reference collection answering queries by brute force.
//!
//! The collection keeps each live document as a JSON object and evaluates
//! selectors and sorts with its own matcher and comparator, sharing nothing
//! with the engine's query layer beyond the [`Selector`] tree itself. It is
//! slow and only meant to produce ground truth for comparisons.
//!
//! Ordering follows the engine's documented value order:
//! missing < null < boolean < number < string < array < object.

use revdb_core::{Document, Selector, SortDirection, SortField};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Naive in-memory collection of live documents.
#[derive(Debug, Clone)]
pub struct ReferenceCollection {
    primary_key: String,
    documents: BTreeMap<String, Json>,
}

impl ReferenceCollection {
    /// Creates an empty collection keyed by `primary_key`.
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            documents: BTreeMap::new(),
        }
    }

    /// Adds a document. Returns false if the key is already present.
    pub fn insert(&mut self, document: &Document) -> bool {
        if self.documents.contains_key(document.id()) {
            return false;
        }
        self.documents
            .insert(document.id().to_string(), document.to_json(&self.primary_key));
        true
    }

    /// Replaces a document. Returns false if the key is absent.
    pub fn update(&mut self, document: &Document) -> bool {
        match self.documents.get_mut(document.id()) {
            Some(slot) => {
                *slot = document.to_json(&self.primary_key);
                true
            }
            None => false,
        }
    }

    /// Removes a document. Returns false if the key is absent.
    pub fn delete(&mut self, id: &str) -> bool {
        self.documents.remove(id).is_some()
    }

    /// Applies a document state: tombstones remove, live states upsert.
    pub fn apply(&mut self, document: &Document) {
        if document.is_deleted() {
            self.delete(document.id());
        } else {
            self.documents
                .insert(document.id().to_string(), document.to_json(&self.primary_key));
        }
    }

    /// Returns a stored document.
    pub fn get(&self, id: &str) -> Option<&Json> {
        self.documents.get(id)
    }

    /// Live keys in ascending order.
    pub fn ids(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents matching `selector`, ordered by `sort` then primary key,
    /// after `skip` and `limit`.
    pub fn query(
        &self,
        selector: &Selector,
        sort: &[SortField],
        skip: usize,
        limit: Option<usize>,
    ) -> Vec<&Json> {
        let mut sort = sort.to_vec();
        if sort.last().map(|s| s.field.as_str()) != Some(self.primary_key.as_str()) {
            sort.push(SortField::asc(self.primary_key.clone()));
        }

        let mut hits: Vec<&Json> = self
            .documents
            .values()
            .filter(|doc| matches(selector, doc))
            .collect();
        hits.sort_by(|a, b| {
            for field in &sort {
                let ordering = compare(lookup(a, &field.field), lookup(b, &field.field));
                let ordering = match field.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        hits.into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Primary keys of [`Self::query`]'s result.
    pub fn query_ids(
        &self,
        selector: &Selector,
        sort: &[SortField],
        skip: usize,
        limit: Option<usize>,
    ) -> Vec<String> {
        self.query(selector, sort, skip, limit)
            .into_iter()
            .filter_map(|doc| doc.get(&self.primary_key).and_then(Json::as_str))
            .map(str::to_string)
            .collect()
    }
}

fn lookup<'a>(doc: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.').try_fold(doc, |node, segment| node.get(segment))
}

fn matches(selector: &Selector, doc: &Json) -> bool {
    match selector {
        Selector::All => true,
        Selector::Eq { field, value } => equals(lookup(doc, field), &Json::from(value)),
        Selector::In { field, values } => {
            let actual = lookup(doc, field);
            values.iter().any(|v| equals(actual, &Json::from(v)))
        }
        Selector::Range {
            field,
            lower,
            upper,
        } => match lookup(doc, field) {
            Some(actual) => {
                above(actual, lower.as_ref().map(Json::from))
                    && below(actual, upper.as_ref().map(Json::from))
            }
            None => false,
        },
        Selector::Exists { field, exists } => lookup(doc, field).is_some() == *exists,
        Selector::And(children) => children.iter().all(|c| matches(c, doc)),
        Selector::Or(children) => children.iter().any(|c| matches(c, doc)),
        Selector::Not(child) => !matches(child, doc),
    }
}

fn equals(actual: Option<&Json>, operand: &Json) -> bool {
    match actual {
        // A null operand also stands for "missing".
        None => operand.is_null(),
        Some(actual) => compare(Some(actual), Some(operand)) == Ordering::Equal,
    }
}

fn above(actual: &Json, bound: Bound<Json>) -> bool {
    within(actual, bound, |o| o != Ordering::Less, |o| o == Ordering::Greater)
}

fn below(actual: &Json, bound: Bound<Json>) -> bool {
    within(actual, bound, |o| o != Ordering::Greater, |o| o == Ordering::Less)
}

fn within(
    actual: &Json,
    bound: Bound<Json>,
    included: fn(Ordering) -> bool,
    excluded: fn(Ordering) -> bool,
) -> bool {
    let (b, accept) = match bound {
        Bound::Unbounded => return true,
        Bound::Included(b) => (b, included),
        Bound::Excluded(b) => (b, excluded),
    };
    rank(Some(actual)) == rank(Some(&b)) && accept(compare(Some(actual), Some(&b)))
}

fn rank(value: Option<&Json>) -> u8 {
    match value {
        None => 0,
        Some(Json::Null) => 1,
        Some(Json::Bool(_)) => 2,
        Some(Json::Number(_)) => 3,
        Some(Json::String(_)) => 4,
        Some(Json::Array(_)) => 6,
        Some(Json::Object(_)) => 7,
    }
}

fn compare(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return rank(a).cmp(&rank(b)),
    };
    match (a, b) {
        (Json::Bool(x), Json::Bool(y)) => x.cmp(y),
        (Json::Number(x), Json::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Json::String(x), Json::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Json::Array(x), Json::Array(y)) => {
            for (p, q) in x.iter().zip(y) {
                let ordering = compare(Some(p), Some(q));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Json::Object(x), Json::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            Json::Object(x.clone())
                .to_string()
                .cmp(&Json::Object(y.clone()).to_string())
        }),
        _ => rank(Some(a)).cmp(&rank(Some(b))),
    }
}
