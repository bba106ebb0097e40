//! Tests for the Index newtype wrapper.

use adaptive_subdiv::Index;

#[test]
fn test_index_from_u32() {
    let idx = Index::from(42u32);
    assert_eq!(idx.0, 42);
}

#[test]
fn test_index_into_u32() {
    let idx = Index(42);
    let value: u32 = idx.into();
    assert_eq!(value, 42);
}

#[test]
fn test_index_from_usize() {
    let idx = Index::from(100usize);
    assert_eq!(idx.get(), 100);
}

#[test]
fn test_index_into_usize() {
    let idx = Index(100);
    let value: usize = idx.into();
    assert_eq!(value, 100);
}

#[test]
fn test_index_display_and_debug() {
    let idx = Index(42);
    assert_eq!(idx.to_string(), "42");
    assert_eq!(format!("{idx:?}"), "Index(42)");
}

#[test]
fn test_index_ordering() {
    let mut indices = vec![Index(2), Index(0), Index(1)];
    indices.sort();
    assert_eq!(indices, [Index(0), Index(1), Index(2)]);
}

#[test]
fn test_index_hash() {
    use std::collections::HashMap;

    let mut map = HashMap::new();
    map.insert(Index(1), "one");
    map.insert(Index(2), "two");

    assert_eq!(map.get(&Index(1)), Some(&"one"));
    assert_eq!(map.get(&Index(3)), None);
}
