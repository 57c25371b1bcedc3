//! Total ordering over field values.
//!
//! Values are ordered first by type class, then within the class:
//!
//! missing < null < boolean < number < string < bytes < array < object
//!
//! Integers and floats share the number class and compare by numeric value
//! with IEEE-754 double semantics; an integer and a float are compared exactly,
//! without rounding the integer. Strings compare by UTF-8 bytes, never by
//! locale. Arrays and objects compare element by element.

use revdb_codec::Value;
use std::cmp::Ordering;

/// Rank of a value's type class in the total order.
pub fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Integer(_) | Value::Float(_)) => 3,
        Some(Value::Text(_)) => 4,
        Some(Value::Bytes(_)) => 5,
        Some(Value::Array(_)) => 6,
        Some(Value::Map(_)) => 7,
    }
}

/// Returns true if both values are in the same type class.
pub fn same_class(a: &Value, b: &Value) -> bool {
    type_rank(Some(a)) == type_rank(Some(b))
}

/// Compares two possibly missing field values.
pub fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Compares two present values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => compare_floats(*a, *b),
        (Value::Integer(a), Value::Float(b)) => compare_int_float(*a, *b),
        (Value::Float(a), Value::Integer(b)) => compare_int_float(*b, *a).reverse(),
        (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
        (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare_values(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Map(a), Value::Map(b)) => a
            .iter()
            .zip(b)
            .map(|((ka, va), (kb, vb))| compare_values(ka, kb).then_with(|| compare_values(va, vb)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => type_rank(Some(a)).cmp(&type_rank(Some(b))),
    }
}

/// Returns true if the values are equal under [`compare_values`].
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b).is_eq()
}

fn compare_floats(a: f64, b: f64) -> Ordering {
    // Stored values are never NaN; the codec rejects it.
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// 2^63 as a double.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

#[allow(clippy::cast_possible_truncation)]
fn compare_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Equal;
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    // In range, so the cast is exact.
    i.cmp(&(whole as i64))
        .then_with(|| compare_floats(0.0, f - whole))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn type_classes_are_ordered() {
        let ladder = [
            Value::Null,
            Value::Bool(true),
            Value::Integer(-5),
            Value::from("a"),
            Value::Bytes(vec![0]),
            Value::Array(vec![]),
            Value::object([("a", Value::Null)]),
        ];
        for pair in ladder.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less);
        }
        assert_eq!(compare_fields(None, Some(&Value::Null)), Ordering::Less);
        assert_eq!(compare_fields(None, None), Ordering::Equal);
    }

    #[test]
    fn numbers_mix_integers_and_floats() {
        assert!(values_equal(&Value::Integer(30), &Value::Float(30.0)));
        assert_eq!(
            compare_values(&Value::Integer(30), &Value::Float(30.5)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::Float(-0.5), &Value::Integer(0)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::Float(-1.5), &Value::Integer(-1)),
            Ordering::Less
        );
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 1_i64 << 53;
        assert_eq!(
            compare_values(&Value::Integer(big + 1), &Value::Float(9_007_199_254_740_992.0)),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&Value::Integer(i64::MAX), &Value::Float(1e300)),
            Ordering::Less
        );
    }

    #[test]
    fn strings_use_byte_order() {
        assert_eq!(
            compare_values(&Value::from("Zed"), &Value::from("alice")),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::from("é"), &Value::from("z")),
            Ordering::Greater
        );
    }

    #[test]
    fn arrays_compare_lexicographically() {
        let short = Value::Array(vec![Value::Integer(1)]);
        let long = Value::Array(vec![Value::Integer(1), Value::Integer(0)]);
        let bigger = Value::Array(vec![Value::Integer(2)]);
        assert_eq!(compare_values(&short, &long), Ordering::Less);
        assert_eq!(compare_values(&long, &bigger), Ordering::Less);
    }

    fn number() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::Integer),
            (-1e20f64..1e20).prop_map(Value::Float),
            (-1000i64..1000).prop_map(|n| Value::Float(n as f64 / 4.0)),
        ]
    }

    proptest! {
        #[test]
        fn number_order_is_antisymmetric(a in number(), b in number()) {
            prop_assert_eq!(compare_values(&a, &b), compare_values(&b, &a).reverse());
        }

        #[test]
        fn number_order_is_transitive(a in number(), b in number(), c in number()) {
            let mut sorted = [a, b, c];
            sorted.sort_by(compare_values);
            prop_assert!(compare_values(&sorted[0], &sorted[2]).is_le());
        }
    }
}
