//! End-to-end scenarios 1 and 2: a plain round trip, and LRU eviction once
//! a bucket's fixed capacity is exceeded.

use cachecore::{CacheConfig, CacheKind, Hasher, Manager};

/// Hashes every key to the same non-zero bucket index, so a handful of
/// inserts can be forced into one bucket deterministically instead of
/// relying on a real hasher's natural spread.
#[derive(Default)]
struct SingleBucketHasher;

impl Hasher for SingleBucketHasher {
    fn hash_key(&self, _key: &[u8]) -> u32 {
        1
    }
}

fn manager() -> Manager {
    Manager::new(CacheConfig::default())
}

#[test]
fn basic_round_trip() {
    let mgr = manager();
    let handle = mgr.create_cache(
        CacheKind::Plain,
        Box::new(SingleBucketHasher),
        1 << 20,
        1 << 21,
    );
    let cachecore::CacheHandle::Plain(cache) = handle else {
        panic!("expected a plain cache handle");
    };

    cache.insert(b"doc/1", b"payload-1", 1_000).unwrap();
    let found = cache.find(b"doc/1", 1_000);
    assert!(found.found());
    assert_eq!(found.value(), Some(&b"payload-1"[..]));
    drop(found);

    cache.remove(b"doc/1", 1_000).unwrap();
    let missed = cache.find(b"doc/1", 1_000);
    assert!(!missed.found());
}

#[test]
fn lru_eviction_drops_the_least_recently_used_entry() {
    let mgr = manager();
    let handle = mgr.create_cache(
        CacheKind::Plain,
        Box::new(SingleBucketHasher),
        1 << 20,
        1 << 21,
    );
    let cachecore::CacheHandle::Plain(cache) = handle else {
        panic!("expected a plain cache handle");
    };

    // all ten keys collide into the same bucket, which has a fixed
    // capacity of ten slots
    for i in 0..10 {
        let key = format!("k{i}");
        cache.insert(key.as_bytes(), b"v", 1_000).unwrap();
    }
    // k0 is now the LRU-back entry; inserting an eleventh key evicts it
    cache.insert(b"k10", b"v", 1_000).unwrap();

    assert!(!cache.find(b"k0", 1_000).found());
    assert!(cache.find(b"k9", 1_000).found());
    assert!(cache.find(b"k10", 1_000).found());
}
