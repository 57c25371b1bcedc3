//! Query execution.
//!
//! The chosen index only supplies candidates. Each candidate's current state
//! is read once, filtered, and the survivors are sorted by the full sort of
//! the prepared query, which always ends with the primary key. Skip and limit
//! apply to that order, so the result does not depend on the index.

use super::compare::compare_fields;
use super::planner::PreparedQuery;
use crate::document::Document;
use crate::error::{CoreResult, ValidationError};
use crate::index::IndexSet;
use crate::store::DocumentStore;
use revdb_codec::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Documents matching the query in sort order, after skip and limit.
pub(crate) fn execute(
    store: &DocumentStore,
    indexes: &IndexSet,
    query: &PreparedQuery,
) -> CoreResult<Vec<Arc<Document>>> {
    let matching = matching(store, indexes, query)?;

    let mut keyed: Vec<(Vec<Option<Value>>, Arc<Document>)> = matching
        .into_iter()
        .map(|doc| {
            let key = query
                .sort()
                .iter()
                .map(|s| doc.field(&s.field, query.primary_key()))
                .collect();
            (key, doc)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(query, a, b));

    let limit = query.limit().unwrap_or(usize::MAX);
    Ok(keyed
        .into_iter()
        .skip(query.skip())
        .take(limit)
        .map(|(_, doc)| doc)
        .collect())
}

/// Number of matching documents, ignoring skip and limit.
pub(crate) fn count(
    store: &DocumentStore,
    indexes: &IndexSet,
    query: &PreparedQuery,
) -> CoreResult<usize> {
    Ok(matching(store, indexes, query)?.len())
}

/// Compares two rows' sort keys under the query's sort directions.
pub(crate) fn compare_sort_keys(
    query: &PreparedQuery,
    a: &[Option<Value>],
    b: &[Option<Value>],
) -> Ordering {
    query
        .sort()
        .iter()
        .zip(a.iter().zip(b))
        .map(|(sort, (x, y))| sort.direction.apply(compare_fields(x.as_ref(), y.as_ref())))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn matching(
    store: &DocumentStore,
    indexes: &IndexSet,
    query: &PreparedQuery,
) -> CoreResult<Vec<Arc<Document>>> {
    let candidates = indexes
        .candidates(query.index(), query.selector())
        .ok_or_else(|| ValidationError::UnknownIndex {
            fields: query.index().to_vec(),
        })?;

    Ok(candidates
        .iter()
        .filter_map(|id| store.get(id))
        .filter(|doc| query.selector().matches(doc, query.primary_key()))
        .collect())
}
