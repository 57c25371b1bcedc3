//! Collection schemas.
//!
//! A schema declares the primary key, the typed fields queries may reference
//! and the indexes a storage instance maintains. Schemas are written in the
//! JSON-schema dialect collections are usually declared in:
//!
//! ```json
//! {
//!   "version": 0,
//!   "primaryKey": "_id",
//!   "properties": {
//!     "_id":  { "type": "string", "maxLength": 20 },
//!     "name": { "type": "string" },
//!     "age":  { "type": "number" }
//!   },
//!   "indexes": [["name", "age"], "age"]
//! }
//! ```
//!
//! Keywords other than `type` and `properties` are accepted and ignored.

use crate::document::{DELETED_FIELD, LWT_FIELD};
use crate::error::ValidationError;
use revdb_codec::Value;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// IEEE-754 double (integers included).
    Number,
    /// Whole number.
    Integer,
    /// `true` / `false`.
    Boolean,
    /// Nested object.
    Object,
    /// Array.
    Array,
}

impl FieldType {
    /// Returns true if a selector operand of this value fits the type.
    ///
    /// `null` fits every type so `{field: null}` can find documents without it.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::String, Value::Text(_)) => true,
            (FieldType::Number, v) => v.is_number(),
            (FieldType::Integer, Value::Integer(_)) => true,
            (FieldType::Integer, Value::Float(f)) => f.fract() == 0.0,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Object, Value::Map(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            _ => false,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// Declaration of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// The field's type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Nested fields of an object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldSchema>,
}

impl FieldSchema {
    /// Declares a field of the given type.
    #[must_use]
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            properties: BTreeMap::new(),
        }
    }
}

/// Schema of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Schema version.
    #[serde(default)]
    pub version: u32,
    /// Name of the primary key field.
    pub primary_key: String,
    /// Declared fields.
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
    /// Index definitions, each an ordered list of field paths.
    #[serde(default, deserialize_with = "deserialize_indexes")]
    pub indexes: Vec<Vec<String>>,
}

/// Indexes may be written as a single field name or a list of names.
#[derive(Deserialize)]
#[serde(untagged)]
enum IndexDecl {
    Single(String),
    Compound(Vec<String>),
}

fn deserialize_indexes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<String>>, D::Error> {
    let decls = Vec::<IndexDecl>::deserialize(d)?;
    Ok(decls
        .into_iter()
        .map(|decl| match decl {
            IndexDecl::Single(field) => vec![field],
            IndexDecl::Compound(fields) => fields,
        })
        .collect())
}

impl Schema {
    /// Starts a schema whose primary key is a string field.
    #[must_use]
    pub fn new(primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        let mut properties = BTreeMap::new();
        properties.insert(primary_key.clone(), FieldSchema::new(FieldType::String));
        Self {
            version: 0,
            primary_key,
            properties,
            indexes: Vec::new(),
        }
    }

    /// Declares a top-level field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.properties
            .insert(name.into(), FieldSchema::new(field_type));
        self
    }

    /// Declares an index.
    #[must_use]
    pub fn index<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.indexes
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Parses a schema from JSON.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValidationError> {
        Self::deserialize(json).map_err(|e| ValidationError::invalid_schema(e.to_string()))
    }

    /// Resolves the declared type of a field path.
    pub fn field_type(&self, path: &str) -> Option<FieldType> {
        let mut segments = path.split('.');
        let mut current = self.properties.get(segments.next()?)?;
        for segment in segments {
            if current.field_type != FieldType::Object {
                return None;
            }
            current = current.properties.get(segment)?;
        }
        Some(current.field_type)
    }

    /// Returns true once [`normalize`](Self::normalize) has run.
    pub fn is_normalized(&self) -> bool {
        self.properties.contains_key(DELETED_FIELD)
            && self.indexes.first() == Some(&vec![self.primary_key.clone()])
    }

    /// Fills in defaults and validates the schema.
    ///
    /// - declares `_deleted` and `_meta.lwt`
    /// - appends the primary key to every index that does not end with it
    /// - registers the primary-key index first and a `[_meta.lwt, pk]` index
    /// - drops duplicate indexes, keeping declaration order
    ///
    /// Normalizing twice yields the same schema.
    pub fn normalize(mut self) -> Result<Self, ValidationError> {
        if self.primary_key.is_empty() || self.primary_key.contains('.') {
            return Err(ValidationError::invalid_schema(
                "primary key must be a top-level field",
            ));
        }
        match self.properties.get(&self.primary_key) {
            Some(field) if field.field_type == FieldType::String => {}
            Some(_) => {
                return Err(ValidationError::invalid_schema(format!(
                    "primary key {:?} must be a string",
                    self.primary_key
                )))
            }
            None => return Err(ValidationError::unknown_field(self.primary_key.clone())),
        }

        self.properties
            .insert(DELETED_FIELD.to_string(), FieldSchema::new(FieldType::Boolean));
        let mut meta = FieldSchema::new(FieldType::Object);
        meta.properties
            .insert("lwt".to_string(), FieldSchema::new(FieldType::Integer));
        self.properties.insert("_meta".to_string(), meta);

        let pk = self.primary_key.clone();
        let mut indexes: Vec<Vec<String>> = vec![vec![pk.clone()]];
        let declared = std::mem::take(&mut self.indexes);
        for mut fields in declared
            .into_iter()
            .chain(std::iter::once(vec![LWT_FIELD.to_string()]))
        {
            if fields.is_empty() {
                return Err(ValidationError::invalid_schema("index without fields"));
            }
            if let Some(unknown) = fields.iter().find(|f| self.field_type(f).is_none()) {
                return Err(ValidationError::unknown_field(unknown.clone()));
            }
            if fields.last() != Some(&pk) {
                fields.push(pk.clone());
            }
            if !indexes.contains(&fields) {
                indexes.push(fields);
            }
        }
        self.indexes = indexes;
        Ok(self)
    }
}
