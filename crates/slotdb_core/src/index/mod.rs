//! Hash index engine.
//!
//! An index is a fixed-size table of bucket slots written right after its
//! 260-byte header, outside every page. Collisions are chained through
//! overflow links appended to the last page; the bucket slot always holds
//! the newest reference. Lookups re-check every candidate against the
//! query, since equal hashes prove nothing.

mod hash;
mod table;

pub use hash::{bucket_index, hash_properties, hash_str, hash_value, prime_capacity, PRIMES};
pub(crate) use table::IndexHandle;
pub use table::IndexInfo;

use serde_json::Value;

/// Normalizes property names to the stored order: sorted, deduplicated.
pub(crate) fn normalize_properties<S: AsRef<str>>(properties: &[S]) -> Vec<String> {
    let mut names: Vec<String> = properties.iter().map(|p| p.as_ref().to_string()).collect();
    names.sort();
    names.dedup();
    names
}

/// Structural equality with numbers compared by value, so `1` equals `1.0`.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Whether every field of `condition` is present in `record` with an equal
/// value.
pub(crate) fn matches_condition(
    condition: &serde_json::Map<String, Value>,
    record: &Value,
) -> bool {
    condition
        .iter()
        .all(|(key, expected)| record.get(key).is_some_and(|actual| values_equal(expected, actual)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_order_is_canonical() {
        assert_eq!(normalize_properties(&["b", "a", "b"]), vec!["a", "b"]);
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn condition_requires_present_fields() {
        let condition = json!({"id": null});
        let condition = condition.as_object().unwrap();
        assert!(matches_condition(condition, &json!({"id": null})));
        assert!(!matches_condition(condition, &json!({"other": 1})));
    }
}
