//! Round-trip/idempotence laws and boundary behaviors from the testable
//! properties list, checked over randomized key/value byte strings with
//! `proptest` plus a couple of fixed boundary cases.

use cachecore::{CacheConfig, CacheErrorKind, CacheKind, Manager, PlainCache, RawByteHasher};
use proptest::prelude::*;
use std::sync::Arc;

fn fresh_plain_cache() -> (Manager, Arc<PlainCache>) {
    let mgr = Manager::new(CacheConfig::default());
    let handle = mgr.create_cache(
        CacheKind::Plain,
        Box::new(RawByteHasher::default()),
        16 << 20,
        32 << 20,
    );
    let cachecore::CacheHandle::Plain(cache) = handle else {
        panic!("expected a plain cache handle");
    };
    (mgr, cache)
}

proptest! {
    #[test]
    fn insert_then_find_returns_the_inserted_value(
        key in prop::collection::vec(any::<u8>(), 1..64),
        value in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let (_mgr, cache) = fresh_plain_cache();
        cache.insert(&key, &value, 10_000).unwrap();
        let found = cache.find(&key, 10_000);
        prop_assert!(found.found());
        prop_assert_eq!(found.value(), Some(value.as_slice()));
    }

    #[test]
    fn insert_then_remove_then_find_is_not_found(
        key in prop::collection::vec(any::<u8>(), 1..64),
        value in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let (_mgr, cache) = fresh_plain_cache();
        cache.insert(&key, &value, 10_000).unwrap();
        cache.remove(&key, 10_000).unwrap();
        let found = cache.find(&key, 10_000);
        prop_assert!(!found.found());
    }

    #[test]
    fn remove_is_idempotent(key in prop::collection::vec(any::<u8>(), 1..64)) {
        let (_mgr, cache) = fresh_plain_cache();
        prop_assert!(cache.remove(&key, 10_000).is_ok());
        prop_assert!(cache.remove(&key, 10_000).is_ok());
    }
}

#[test]
fn zero_length_key_is_rejected_through_the_cache_api() {
    let (_mgr, cache) = fresh_plain_cache();
    assert_eq!(
        cache.insert(b"", b"v", 10_000),
        Err(CacheErrorKind::Internal)
    );
}

#[test]
fn oversized_key_is_rejected_through_the_cache_api() {
    let (_mgr, cache) = fresh_plain_cache();
    // one byte past MAX_KEY_SIZE == (1 << 24) - 1
    let big_key = vec![0u8; (1 << 24) + 1];
    assert_eq!(
        cache.insert(&big_key, b"v", 10_000),
        Err(CacheErrorKind::Internal)
    );
}

#[test]
fn key_length_one_is_accepted() {
    let (_mgr, cache) = fresh_plain_cache();
    assert!(cache.insert(b"k", b"v", 10_000).is_ok());
}

#[test]
fn re_inserting_an_already_cached_key_replaces_it_rather_than_duplicating_it() {
    let (_mgr, cache) = fresh_plain_cache();
    cache.insert(b"doc/1", b"v1", 10_000).unwrap();
    cache.insert(b"doc/1", b"v2", 10_000).unwrap();

    let found = cache.find(b"doc/1", 10_000);
    assert!(found.found());
    assert_eq!(found.value(), Some(&b"v2"[..]));
    drop(found);

    // removing the (single, replaced) entry must make the key fully
    // absent; a duplicate stale entry from the first insert would
    // resurface here instead
    cache.remove(b"doc/1", 10_000).unwrap();
    let missed = cache.find(b"doc/1", 10_000);
    assert!(!missed.found());
}
