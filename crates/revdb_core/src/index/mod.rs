//! Secondary indexes.
//!
//! Every storage instance keeps one [`BTreeIndex`] per index of its
//! normalized schema. Indexes only source candidates for queries; results
//! are always filtered and sorted afterwards, so which index a query reads
//! never changes its output.
//!
//! Lock order: a writer holds the key's slot, then takes each index's write
//! lock in turn. Readers take one index read lock and release it before
//! touching any slot.

mod btree;
mod key;

pub use btree::BTreeIndex;
pub use key::IndexKey;

use crate::document::Document;
use crate::query::Selector;
use parking_lot::RwLock;

/// The indexes of one storage instance.
pub(crate) struct IndexSet {
    primary_key: String,
    indexes: Vec<RwLock<BTreeIndex>>,
}

impl IndexSet {
    /// Creates empty indexes for each field list.
    pub(crate) fn new(primary_key: &str, definitions: &[Vec<String>]) -> Self {
        Self {
            primary_key: primary_key.to_string(),
            indexes: definitions
                .iter()
                .map(|fields| RwLock::new(BTreeIndex::new(fields.clone())))
                .collect(),
        }
    }

    /// Moves a key's entries from its previous state to its current state.
    ///
    /// Must be called while holding the key's slot.
    pub(crate) fn replace(&self, previous: Option<&Document>, current: &Document) {
        for index in &self.indexes {
            let mut index = index.write();
            let new_key = IndexKey::of(current, index.fields(), &self.primary_key);
            if let Some(previous) = previous {
                let old_key = IndexKey::of(previous, index.fields(), &self.primary_key);
                index.remove(&old_key, previous.id());
            }
            index.insert(new_key, current.id());
        }
    }

    /// Candidate ids for `selector` read from the index over `fields`, in
    /// index order. `None` if no such index exists.
    ///
    /// The scan is narrowed by whatever the selector pins the index's
    /// leading field to; every matching document is among the candidates.
    pub(crate) fn candidates(&self, fields: &[String], selector: &Selector) -> Option<Vec<String>> {
        let index = self
            .indexes
            .iter()
            .find(|index| index.read().fields() == fields)?
            .read();
        let (lower, upper) = index
            .fields()
            .first()
            .map_or((std::ops::Bound::Unbounded, std::ops::Bound::Unbounded), |leading| {
                selector.bounds_on(leading)
            });
        Some(index.scan_leading(lower, upper))
    }

    /// Number of indexes.
    pub(crate) fn len(&self) -> usize {
        self.indexes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdb_codec::Value;

    fn defs() -> Vec<Vec<String>> {
        vec![
            vec!["_id".into()],
            vec!["age".into(), "_id".into()],
        ]
    }

    #[test]
    fn replace_moves_entries() {
        let set = IndexSet::new("_id", &defs());
        let v1 = Document::create("a", [("age", Value::Integer(30))]).unwrap();
        let v2 = v1.with_field("age", 40).unwrap();
        set.replace(None, &v1);
        set.replace(Some(&v1), &v2);

        let age: Vec<String> = vec!["age".into(), "_id".into()];
        let thirty = Selector::eq("age", 30);
        let forty = Selector::eq("age", 40);
        assert_eq!(set.candidates(&age, &thirty), Some(vec![]));
        assert_eq!(set.candidates(&age, &forty), Some(vec!["a".to_string()]));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn unknown_index_has_no_candidates() {
        let set = IndexSet::new("_id", &defs());
        assert_eq!(set.candidates(&["name".to_string()], &Selector::All), None);
    }
}
