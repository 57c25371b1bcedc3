//! Conversion between [`Value`] and JSON.
//!
//! JSON numbers become integers when they fit in `i64` and doubles
//! otherwise. Going back, byte strings become arrays of numbers and
//! non-text map keys are rendered through their JSON form.

use crate::value::Value;
use serde::{Serialize, Serializer};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => {
                Value::object(fields.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Map(pairs) => serde_json::Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Value::Text(s) => s.clone(),
                            other => serde_json::Value::from(other).to_string(),
                        };
                        (key, serde_json::Value::from(v))
                    })
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_prefer_integers() {
        assert_eq!(Value::from(json!(30)), Value::Integer(30));
        assert_eq!(Value::from(json!(-7)), Value::Integer(-7));
        assert_eq!(Value::from(json!(2.5)), Value::Float(2.5));
    }

    #[test]
    fn objects_become_sorted_maps() {
        let value = Value::from(json!({"name": "Alice", "age": 30}));
        assert_eq!(value.get("name"), Some(&Value::from("Alice")));
        assert_eq!(value.get("age"), Some(&Value::Integer(30)));

        if let Value::Map(pairs) = &value {
            // "age" and "name" have different lengths, shorter key first
            assert_eq!(pairs[0].0, Value::from("age"));
        } else {
            panic!("Expected Map");
        }
    }

    #[test]
    fn back_to_json() {
        let value = Value::object([
            ("tags", Value::Array(vec![Value::from("a"), Value::Null])),
            ("ratio", Value::Float(0.25)),
        ]);
        assert_eq!(
            serde_json::Value::from(&value),
            json!({"tags": ["a", null], "ratio": 0.25})
        );
    }

    #[test]
    fn serialize_uses_json_form() {
        let value = Value::object([("ok", Value::Bool(true))]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"ok":true}"#);
    }
}
