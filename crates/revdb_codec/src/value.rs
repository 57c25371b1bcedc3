//! Dynamic document value type.

use crate::encoder::to_canonical_cbor;
use std::cmp::Ordering;

/// A dynamic document value.
///
/// Documents are maps from field names to `Value`s. `Integer` and `Float`
/// are two spellings of one number type: queries order them on a single
/// numeric line and the canonical encoding writes `30.0` exactly like `30`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Exact signed integer.
    Integer(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Ordered list.
    Array(Vec<Value>),
    /// Key/value entries. Built through [`Value::map`] or [`Value::object`]
    /// the entries are kept in canonical key order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Map value with entries put in canonical key order.
    ///
    /// Two maps holding the same entries compare equal regardless of the
    /// order the entries were supplied in.
    pub fn map(mut entries: Vec<(Value, Value)>) -> Self {
        entries.sort_by(|(a, _), (b, _)| a.cmp_canonical(b));
        Value::Map(entries)
    }

    /// Map value keyed by field names.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entries = fields
            .into_iter()
            .map(|(name, value)| (Value::Text(name.into()), value))
            .collect();
        Self::map(entries)
    }

    /// Orders two values the way canonical map keys are ordered: shorter
    /// encoding first, then bytewise.
    ///
    /// Values with no encoding (NaN somewhere inside) are treated as equal
    /// to anything.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let (Ok(left), Ok(right)) = (to_canonical_cbor(self), to_canonical_cbor(other)) else {
            return Ordering::Equal;
        };
        left.len().cmp(&right.len()).then_with(|| left.cmp(&right))
    }

    /// `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        *self == Value::Null
    }

    /// `true` for either numeric variant.
    pub fn is_number(&self) -> bool {
        self.as_f64().is_some()
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(flag) = self {
            Some(*flag)
        } else {
            None
        }
    }

    /// The integer, if this is stored as one. Floats are not narrowed.
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// The number as a double. Integers beyond 2^53 lose precision.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Integer(n) => Some(n as f64),
            _ => None,
        }
    }

    /// Borrow the byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes.as_slice())
        } else {
            None
        }
    }

    /// Borrow the text.
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(text) = self {
            Some(text.as_str())
        } else {
            None
        }
    }

    /// Borrow the array items.
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(items) = self {
            Some(items.as_slice())
        } else {
            None
        }
    }

    /// Borrow the map entries.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        if let Value::Map(entries) = self {
            Some(entries.as_slice())
        } else {
            None
        }
    }

    /// Value stored under the text key `name`, when this is a map.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find_map(|(key, value)| (key.as_text() == Some(name)).then_some(value))
    }

    /// Walks a dotted path such as `"address.city"` through nested maps.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |node, segment| node.get(segment))
    }

    /// Lowercase type label for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "number",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "object",
        }
    }
}

macro_rules! value_from {
    ($($source:ty => |$v:ident| $build:expr;)*) => {
        $(
            impl From<$source> for Value {
                fn from($v: $source) -> Self {
                    $build
                }
            }
        )*
    };
}

value_from! {
    () => |_unit| Value::Null;
    bool => |b| Value::Bool(b);
    i64 => |n| Value::Integer(n);
    i32 => |n| Value::Integer(i64::from(n));
    u32 => |n| Value::Integer(i64::from(n));
    f64 => |f| Value::Float(f);
    String => |s| Value::Text(s);
    &str => |s| Value::Text(s.to_owned());
    Vec<u8> => |b| Value::Bytes(b);
    &[u8] => |b| Value::Bytes(b.to_vec());
    Vec<Value> => |items| Value::Array(items);
}
