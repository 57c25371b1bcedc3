//! Documents and their reserved fields.

use crate::error::CoreResult;
use crate::revision::Revision;
use crate::types::Timestamp;
use revdb_codec::{CodecResult, Value};
use std::collections::BTreeMap;

/// Query path of the deletion marker.
pub const DELETED_FIELD: &str = "_deleted";

/// Query path of the last-write timestamp.
pub const LWT_FIELD: &str = "_meta.lwt";

/// Top-level names a document's data may not use.
pub const RESERVED_FIELDS: [&str; 5] = ["_id", "_deleted", "_meta", "_rev", "_attachments"];

/// Content key under which the primary key is hashed.
const CONTENT_ID_KEY: &str = "_id";

/// Write metadata attached to each document state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentMeta {
    /// Last-write time.
    pub lwt: Timestamp,
}

/// One state of a document.
///
/// A document is its primary key, a map of data fields, a deletion marker,
/// write metadata and the revision of this state. Deleted documents are
/// tombstones: they stay addressable by key and keep their data.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    data: BTreeMap<String, Value>,
    deleted: bool,
    meta: DocumentMeta,
    revision: Revision,
}

impl Document {
    /// Creates the first state of a new document (height 1).
    ///
    /// # Errors
    ///
    /// Fails if the content has no canonical encoding.
    pub fn create<K, I>(id: impl Into<String>, data: I) -> CoreResult<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::derived(id.into(), data, false, 0)
    }

    /// Derives the state that replaces `self` with new data.
    pub fn next<K, I>(&self, data: I) -> CoreResult<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::derived(self.id.clone(), data, false, self.revision.height())
    }

    /// Derives a state that changes one field.
    pub fn with_field(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> CoreResult<Self> {
        let mut data = self.data.clone();
        data.insert(field.into(), value.into());
        Self::derived(self.id.clone(), data, self.deleted, self.revision.height())
    }

    /// Derives the tombstone that follows `self`, keeping its data.
    ///
    /// Deleting a tombstone again is allowed and only bumps height and metadata.
    pub fn next_deleted(&self) -> CoreResult<Self> {
        Self::derived(self.id.clone(), self.data.clone(), true, self.revision.height())
    }

    /// Assembles a document from raw parts without deriving its revision.
    ///
    /// Writers that compute revisions themselves use this; the write
    /// coordinator rejects states whose revision does not match.
    #[must_use]
    pub fn from_parts(
        id: impl Into<String>,
        data: BTreeMap<String, Value>,
        deleted: bool,
        meta: DocumentMeta,
        revision: Revision,
    ) -> Self {
        Self {
            id: id.into(),
            data,
            deleted,
            meta,
            revision,
        }
    }

    fn derived(
        id: String,
        data: BTreeMap<String, Value>,
        deleted: bool,
        previous_height: u64,
    ) -> CoreResult<Self> {
        let mut doc = Self {
            id,
            data,
            deleted,
            meta: DocumentMeta {
                lwt: Timestamp::now(),
            },
            revision: Revision::from_parts(0, [0; 32]),
        };
        doc.revision = Revision::derive(previous_height, &doc.content())?;
        Ok(doc)
    }

    /// Returns the primary key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the data fields.
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Returns a top-level data field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Returns true for tombstones.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns the write metadata.
    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    /// Returns the last-write time.
    pub fn lwt(&self) -> Timestamp {
        self.meta.lwt
    }

    /// Returns the revision of this state.
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Canonical content the revision digest covers.
    ///
    /// Includes the primary key, deletion marker and data. Excludes the
    /// revision and the write metadata.
    pub fn content(&self) -> Value {
        let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(self.data.len() + 2);
        pairs.push((Value::from(CONTENT_ID_KEY), Value::Text(self.id.clone())));
        pairs.push((Value::from(DELETED_FIELD), Value::Bool(self.deleted)));
        pairs.extend(
            self.data
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), v.clone())),
        );
        Value::map(pairs)
    }

    /// Returns true if the revision is consistent with the content.
    pub fn verify_revision(&self) -> CodecResult<bool> {
        self.revision.matches_content(&self.content())
    }

    /// Returns the first reserved name used as a data field, if any.
    pub fn reserved_field(&self) -> Option<&str> {
        self.data
            .keys()
            .map(String::as_str)
            .find(|k| RESERVED_FIELDS.contains(k))
    }

    /// Resolves a query path against this document.
    ///
    /// `primary_key` is the schema's primary key name; it, [`DELETED_FIELD`]
    /// and [`LWT_FIELD`] resolve to the reserved fields, everything else is a
    /// dotted path into the data.
    pub fn field(&self, path: &str, primary_key: &str) -> Option<Value> {
        if path == primary_key {
            return Some(Value::Text(self.id.clone()));
        }
        match path {
            DELETED_FIELD => Some(Value::Bool(self.deleted)),
            LWT_FIELD => Some(Value::Integer(
                i64::try_from(self.meta.lwt.as_micros()).unwrap_or(i64::MAX),
            )),
            _ => {
                let (head, rest) = match path.split_once('.') {
                    Some((head, rest)) => (head, Some(rest)),
                    None => (path, None),
                };
                let top = self.data.get(head)?;
                match rest {
                    Some(rest) => top.get_path(rest).cloned(),
                    None => Some(top.clone()),
                }
            }
        }
    }

    /// Renders the document as JSON, reserved fields included.
    pub fn to_json(&self, primary_key: &str) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(primary_key.to_string(), self.id.clone().into());
        for (k, v) in &self.data {
            object.insert(k.clone(), serde_json::Value::from(v));
        }
        object.insert(DELETED_FIELD.to_string(), self.deleted.into());
        object.insert(
            "_meta".to_string(),
            serde_json::json!({ "lwt": self.meta.lwt.as_micros() }),
        );
        object.insert("_rev".to_string(), self.revision.to_string().into());
        serde_json::Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Document {
        Document::create(
            "a",
            [("name", Value::from("Alice")), ("age", Value::Integer(30))],
        )
        .unwrap()
    }

    #[test]
    fn create_starts_at_height_one() {
        let doc = alice();
        assert_eq!(doc.revision().height(), 1);
        assert!(!doc.is_deleted());
        assert!(doc.verify_revision().unwrap());
    }

    #[test]
    fn next_increments_height() {
        let v1 = alice();
        let v2 = v1.with_field("age", 31).unwrap();
        assert_eq!(v2.revision().height(), 2);
        assert_eq!(v2.get("age"), Some(&Value::Integer(31)));
        assert!(v2.lwt() > v1.lwt());
        assert!(v2.verify_revision().unwrap());
    }

    #[test]
    fn deletion_keeps_data() {
        let tomb = alice().next_deleted().unwrap();
        assert!(tomb.is_deleted());
        assert_eq!(tomb.revision().height(), 2);
        assert_eq!(tomb.get("name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn repeated_deletion_keeps_digest() {
        let once = alice().next_deleted().unwrap();
        let twice = once.next_deleted().unwrap();
        assert_eq!(twice.revision().height(), 3);
        assert_eq!(twice.revision().digest(), once.revision().digest());
        assert_eq!(twice.content(), once.content());
    }

    #[test]
    fn metadata_is_not_hashed() {
        let doc = alice();
        let mut later = doc.clone();
        later.meta.lwt = Timestamp(doc.lwt().as_micros() + 1000);
        assert!(later.verify_revision().unwrap());
    }

    #[test]
    fn tampered_content_fails_verification() {
        let mut doc = alice();
        doc.data.insert("age".into(), Value::Integer(99));
        assert!(!doc.verify_revision().unwrap());
    }

    #[test]
    fn resolves_reserved_paths() {
        let doc = alice();
        assert_eq!(doc.field("_id", "_id"), Some(Value::from("a")));
        assert_eq!(doc.field("_deleted", "_id"), Some(Value::Bool(false)));
        assert!(matches!(doc.field("_meta.lwt", "_id"), Some(Value::Integer(_))));
        assert_eq!(doc.field("age", "_id"), Some(Value::Integer(30)));
        assert_eq!(doc.field("missing", "_id"), None);
    }

    #[test]
    fn custom_primary_key_name() {
        let doc = alice();
        assert_eq!(doc.field("passportId", "passportId"), Some(Value::from("a")));
        assert_eq!(doc.field("_id", "passportId"), None);
    }

    #[test]
    fn resolves_nested_paths() {
        let doc = Document::create(
            "p",
            [(
                "address",
                Value::object([("city", Value::from("Oslo"))]),
            )],
        )
        .unwrap();
        assert_eq!(doc.field("address.city", "_id"), Some(Value::from("Oslo")));
        assert_eq!(doc.field("address.zip", "_id"), None);
    }

    #[test]
    fn reserved_names_are_reported() {
        let doc = Document::create("x", [("_rev", Value::from("1-abc"))]).unwrap();
        assert_eq!(doc.reserved_field(), Some("_rev"));
        assert_eq!(alice().reserved_field(), None);
    }

    #[test]
    fn json_rendering() {
        let json = alice().to_json("_id");
        assert_eq!(json["_id"], "a");
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["_deleted"], false);
        assert!(json["_rev"].as_str().unwrap().starts_with("1-"));
    }
}
