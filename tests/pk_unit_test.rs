//! Unit tests for the pk (key hashing) module.

use sql_seeder::generator::Value;
use sql_seeder::pk::{hash_key, hash_row_key};

#[test]
fn test_hash_deterministic() {
    let a = [Value::Int(42), Value::Text("x".into())];
    let b = [Value::Int(42), Value::Text("x".into())];
    assert_eq!(hash_key(a.iter()), hash_key(b.iter()));
}

#[test]
fn test_hash_different_values_differ() {
    assert_ne!(
        hash_key([Value::Int(1)].iter()),
        hash_key([Value::Int(2)].iter())
    );
}

#[test]
fn test_hash_different_types_differ() {
    assert_ne!(
        hash_key([Value::Int(1)].iter()),
        hash_key([Value::Text("1".into())].iter())
    );
    assert_ne!(
        hash_key([Value::Int(1)].iter()),
        hash_key([Value::Bool(true)].iter())
    );
}

#[test]
fn test_hash_order_matters() {
    let ab = [Value::Int(1), Value::Int(2)];
    let ba = [Value::Int(2), Value::Int(1)];
    assert_ne!(hash_key(ab.iter()), hash_key(ba.iter()));
}

#[test]
fn test_decimal_scale_is_part_of_the_key() {
    let a = [Value::Decimal { units: 150, scale: 2 }];
    let b = [Value::Decimal { units: 150, scale: 1 }];
    assert_ne!(hash_key(a.iter()), hash_key(b.iter()));
}

#[test]
fn test_row_key_skips_null_tuples() {
    let row = vec![Value::Int(7), Value::Null, Value::Text("a".into())];
    assert!(hash_row_key(&row, &[0, 1]).is_none());
    assert_eq!(
        hash_row_key(&row, &[0, 2]),
        Some(hash_key([Value::Int(7), Value::Text("a".into())].iter()))
    );
}
