//! Hashing and bucket capacity.
//!
//! All hashes are 31-bit: the top bit of the stored u32 is always clear.

use serde_json::Value;

const MASK: i32 = 0x7FFF_FFFF;

/// Bucket capacities, ascending. Each is prime.
pub const PRIMES: [u64; 72] = [
    3, 7, 11, 17, 23, 29, 37, 47, 59, 71, 89, 107, 131, 163, 197, 239, 293, 353, 431, 521, 631,
    761, 919, 1103, 1327, 1597, 1931, 2333, 2801, 3371, 4049, 4861, 5839, 7013, 8419, 10103,
    12143, 14591, 17519, 21023, 25229, 30293, 36353, 43627, 52361, 62851, 75431, 90523, 108631,
    130363, 156437, 187751, 225307, 270371, 324449, 389357, 467237, 560689, 672827, 807403,
    968897, 1162687, 1395263, 1674319, 2009191, 2411033, 2893249, 3471899, 4166287, 4999559,
    5999471, 7199369,
];

/// Largest integer a double represents exactly.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// The bucket count used for a requested capacity: the first tabulated
/// prime not below `minimum`, or past the table the largest prime doubled
/// until it is.
pub fn prime_capacity(minimum: u64) -> u64 {
    if let Some(&prime) = PRIMES.iter().find(|&&p| p >= minimum) {
        return prime;
    }
    let mut capacity = PRIMES[PRIMES.len() - 1];
    while capacity < minimum {
        capacity *= 2;
        if capacity > MAX_SAFE_INTEGER {
            return MAX_SAFE_INTEGER;
        }
    }
    capacity
}

/// Slot of `hash` in a table of `buckets` slots.
pub fn bucket_index(hash: u32, buckets: usize) -> usize {
    hash as usize % buckets.max(1)
}

/// Truncates a double to a wrapping 32-bit integer.
fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    wrapped as u32 as i32
}

fn roll(hash: i32, unit: i32) -> i32 {
    (hash << 5).wrapping_sub(hash).wrapping_add(unit)
}

/// Rolling hash over the UTF-16 code units of `s`.
pub fn hash_str(s: &str) -> u32 {
    let hash = s.encode_utf16().fold(0i32, |h, c| roll(h, i32::from(c)));
    (hash & MASK) as u32
}

/// Hash of one property value. A missing value hashes like `null`.
pub fn hash_value(value: Option<&Value>) -> u32 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => {
            let n = n.as_f64().unwrap_or(0.0);
            (to_int32(n) & MASK) as u32
        }
        Some(Value::String(s)) => hash_str(s),
        Some(Value::Bool(b)) => hash_str(if *b { "true" } else { "false" }),
        Some(other) => hash_str(&other.to_string()),
    }
}

/// Hash of a record (or an equality condition) over `properties`.
///
/// `properties` must be in the index's stored order.
pub fn hash_properties(properties: &[String], object: &Value) -> u32 {
    if let [single] = properties {
        return hash_value(object.get(single));
    }
    let hash = properties.iter().fold(0i32, |h, property| {
        roll(h, hash_value(object.get(property)) as i32)
    });
    (hash & MASK) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn string_hashes() {
        assert_eq!(hash_str(""), 0);
        assert_eq!(hash_str("a"), 97);
        assert_eq!(hash_str("ab"), 3105);
        // Overflows i32 and is masked.
        assert!(hash_str("a fairly long key that overflows") < 0x8000_0000);
    }

    #[test]
    fn number_hashes() {
        assert_eq!(hash_value(Some(&json!(42))), 42);
        assert_eq!(hash_value(Some(&json!(-1))), 0x7FFF_FFFF);
        assert_eq!(hash_value(Some(&json!(3.9))), 3);
        assert_eq!(hash_value(Some(&json!(4_294_967_298u64))), 2);
    }

    #[test]
    fn null_and_missing_agree() {
        assert_eq!(hash_value(None), 0);
        assert_eq!(hash_value(Some(&Value::Null)), 0);
    }

    #[test]
    fn other_kinds_hash_their_text() {
        assert_eq!(hash_value(Some(&json!(true))), hash_str("true"));
        assert_eq!(hash_value(Some(&json!([1, 2]))), hash_str("[1,2]"));
    }

    #[test]
    fn single_property_uses_value_hash() {
        let record = json!({"id": 2, "name": "x"});
        assert_eq!(hash_properties(&["id".to_string()], &record), 2);
    }

    #[test]
    fn multi_property_rolls() {
        let record = json!({"a": 1, "b": 2});
        let props = vec!["a".to_string(), "b".to_string()];
        assert_eq!(hash_properties(&props, &record), 31 + 2);
    }

    #[test]
    fn capacities() {
        assert_eq!(prime_capacity(0), 3);
        assert_eq!(prime_capacity(3), 3);
        assert_eq!(prime_capacity(100), 107);
        assert_eq!(prime_capacity(100_000), 108_631);
        assert_eq!(prime_capacity(7_199_370), 14_398_738);
        assert_eq!(prime_capacity(u64::MAX), MAX_SAFE_INTEGER);
    }

    proptest! {
        #[test]
        fn hashes_are_31_bit(s in ".*", n in any::<i64>()) {
            prop_assert!(hash_str(&s) <= 0x7FFF_FFFF);
            prop_assert!(hash_value(Some(&json!(n))) <= 0x7FFF_FFFF);
        }

        #[test]
        fn bucket_in_range(hash in 0u32..0x8000_0000, buckets in 1usize..10_000) {
            prop_assert!(bucket_index(hash, buckets) < buckets);
        }
    }
}
