//! Tests for IdAllocator
//!
//! These tests verify:
//! - IDs start at 1 and strictly increase
//! - Uniqueness under concurrent callers
//! - Overflow is reported, never wrapped

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chunkstore::id::IdAllocator;
use chunkstore::StoreError;

#[test]
fn test_first_id_is_one() {
    let ids = IdAllocator::new("file");

    assert_eq!(ids.peek(), 1);
    assert_eq!(ids.next().unwrap(), 1);
    assert_eq!(ids.next().unwrap(), 2);
    assert_eq!(ids.peek(), 3);
}

#[test]
fn test_starting_at() {
    let ids = IdAllocator::starting_at("part", 100);

    assert_eq!(ids.next().unwrap(), 100);
    assert_eq!(ids.next().unwrap(), 101);
}

#[test]
fn test_exhaustion_is_an_error() {
    let ids = IdAllocator::starting_at("part", u64::MAX - 1);

    assert_eq!(ids.next().unwrap(), u64::MAX - 1);

    let result = ids.next();
    assert!(matches!(result, Err(StoreError::IdExhausted { kind: "part" })));

    // Stays exhausted
    assert!(ids.next().is_err());
}

#[test]
fn test_concurrent_ids_are_unique_and_increasing_per_thread() {
    let ids = Arc::new(IdAllocator::new("file"));
    let mut handles = vec![];

    for _ in 0..8 {
        let ids = Arc::clone(&ids);
        handles.push(thread::spawn(move || {
            let mut seen = Vec::with_capacity(1000);
            for _ in 0..1000 {
                seen.push(ids.next().unwrap());
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    for handle in handles {
        let seen = handle.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        for id in seen {
            assert!(all.insert(id), "duplicate id {}", id);
        }
    }

    assert_eq!(all.len(), 8000);
    assert_eq!(all.iter().min(), Some(&1));
    assert_eq!(all.iter().max(), Some(&8000));
}
