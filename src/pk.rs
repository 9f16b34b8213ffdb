//! Compact key hashing.
//!
//! Uniqueness tracking stores 64-bit tuple hashes instead of the values
//! themselves so registries stay small for tables with tens of millions of rows.

use crate::generator::Value;
use std::hash::{Hash, Hasher};

/// Compact key hash (64-bit).
/// Collision risk is negligible for realistic table sizes.
pub type PkHash = u64;

/// Hash a key tuple. `AHasher::default()` keys are fixed for the lifetime of
/// the process, so every worker computes the same hash for the same tuple.
pub fn hash_key<'a, I>(values: I) -> PkHash
where
    I: IntoIterator<Item = &'a Value>,
    I::IntoIter: ExactSizeIterator,
{
    let mut hasher = ahash::AHasher::default();
    let iter = values.into_iter();

    // Include arity so (1) and (1, NULL) differ
    (iter.len() as u8).hash(&mut hasher);

    for v in iter {
        match v {
            Value::Null => 0u8.hash(&mut hasher),
            Value::Int(i) => {
                1u8.hash(&mut hasher);
                i.hash(&mut hasher);
            }
            Value::Decimal { units, scale } => {
                2u8.hash(&mut hasher);
                units.hash(&mut hasher);
                scale.hash(&mut hasher);
            }
            Value::Text(s) | Value::Json(s) | Value::Uuid(s) => {
                3u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::Bool(b) => {
                4u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Date(d) => {
                5u8.hash(&mut hasher);
                d.hash(&mut hasher);
            }
            Value::DateTime(dt) => {
                6u8.hash(&mut hasher);
                dt.hash(&mut hasher);
            }
            Value::Bytes(b) => {
                7u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
        }
    }

    hasher.finish()
}

/// Hash the columns at `slots` of `row`, or `None` when any of them is NULL.
/// SQL uniqueness ignores tuples containing NULL.
pub fn hash_row_key(row: &[Value], slots: &[usize]) -> Option<PkHash> {
    if slots.iter().any(|&i| row[i].is_null()) {
        return None;
    }
    Some(hash_key(slots.iter().map(|&i| &row[i])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_arity_sensitive() {
        let a = [Value::Int(1)];
        let b = [Value::Int(1), Value::Null];
        assert_eq!(hash_key(a.iter()), hash_key(a.iter()));
        assert_ne!(hash_key(a.iter()), hash_key(b.iter()));
    }

    #[test]
    fn test_hash_distinguishes_types() {
        let int = [Value::Int(1)];
        let text = [Value::Text("1".into())];
        assert_ne!(hash_key(int.iter()), hash_key(text.iter()));
    }

    #[test]
    fn test_row_key_skips_nulls() {
        let row = vec![Value::Int(1), Value::Null, Value::Text("x".into())];
        assert!(hash_row_key(&row, &[0, 2]).is_some());
        assert!(hash_row_key(&row, &[0, 1]).is_none());
    }
}
