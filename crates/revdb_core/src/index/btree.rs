//! Ordered index over compound keys.

use super::key::IndexKey;
use crate::query::compare::compare_fields;
use revdb_codec::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// BTree-based index for ordered traversal and range scans.
///
/// Maps the key of every stored state (tombstones included) to the primary
/// keys holding it. Indexes always end with the primary key, so in practice
/// each entry holds a single id.
///
/// # Example
///
/// ```rust,ignore
/// let mut index = BTreeIndex::new(vec!["age".into(), "_id".into()]);
/// index.insert(IndexKey::of(&doc, index.fields(), "_id"), doc.id());
/// let adults = index.scan_leading(Bound::Included(&Value::Integer(18)), Bound::Unbounded);
/// ```
#[derive(Debug, Clone)]
pub struct BTreeIndex {
    fields: Vec<String>,
    entries: BTreeMap<IndexKey, BTreeSet<String>>,
    count: usize,
}

impl BTreeIndex {
    /// Creates an empty index over `fields`.
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            entries: BTreeMap::new(),
            count: 0,
        }
    }

    /// Indexed field paths.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Adds a key-id mapping.
    pub fn insert(&mut self, key: IndexKey, id: &str) {
        if self.entries.entry(key).or_default().insert(id.to_string()) {
            self.count += 1;
        }
    }

    /// Removes a key-id mapping. Returns false if it was not present.
    pub fn remove(&mut self, key: &IndexKey, id: &str) -> bool {
        if let Some(ids) = self.entries.get_mut(key) {
            if ids.remove(id) {
                self.count -= 1;
                if ids.is_empty() {
                    self.entries.remove(key);
                }
                return true;
            }
        }
        false
    }

    /// Ids in key order.
    pub fn scan_ordered(&self) -> Vec<String> {
        self.entries.values().flatten().cloned().collect()
    }

    /// Ids whose leading key component lies within the bounds, in key order.
    pub fn scan_leading(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> Vec<String> {
        let start = match lower {
            Bound::Included(v) | Bound::Excluded(v) => Bound::Included(IndexKey::prefix(v)),
            Bound::Unbounded => Bound::Unbounded,
        };
        self.entries
            .range((start, Bound::Unbounded))
            .skip_while(|(key, _)| match lower {
                Bound::Excluded(v) => compare_fields(key.first(), Some(v)).is_le(),
                _ => false,
            })
            .take_while(|(key, _)| match upper {
                Bound::Included(v) => compare_fields(key.first(), Some(v)).is_le(),
                Bound::Excluded(v) => compare_fields(key.first(), Some(v)).is_lt(),
                Bound::Unbounded => true,
            })
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Ids of the first `n` entries in key order.
    pub fn take(&self, n: usize) -> Vec<String> {
        self.entries.values().flatten().take(n).cloned().collect()
    }

    /// Returns the minimum key.
    pub fn min_key(&self) -> Option<&IndexKey> {
        self.entries.keys().next()
    }

    /// Returns the maximum key.
    pub fn max_key(&self) -> Option<&IndexKey> {
        self.entries.keys().next_back()
    }

    /// Number of key-id mappings.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
