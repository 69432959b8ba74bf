//! End-to-end scenario 5: eight threads hammering the same cache with
//! overlapping keys via `libstress::Workpool`. A shadow map, updated under
//! the same lock that serializes the corresponding cache operation, gives
//! a ground truth to check every surviving key against afterward.

use cachecore::{CacheConfig, CacheKind, Manager, PlainCache, RawByteHasher};
use libstress::Workpool;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 100_000;
const KEY_SPACE: usize = 64;

#[derive(Clone)]
enum Op {
    Insert(String, Vec<u8>),
    Remove(String),
}

/// Cheap deterministic pseudo-randomness so the scenario is reproducible
/// without pulling in an extra dev-dependency just for this one test.
fn wang_hash(mut x: u64) -> u64 {
    x = (!x).wrapping_add(x << 21);
    x ^= x >> 24;
    x = x.wrapping_add(x << 3).wrapping_add(x << 8);
    x ^= x >> 14;
    x = x.wrapping_add(x << 2).wrapping_add(x << 4);
    x ^= x >> 28;
    x = x.wrapping_add(x << 31);
    x
}

#[test]
fn concurrent_find_insert_matches_shadow_state() {
    let mgr = Manager::new(CacheConfig::default());
    let handle = mgr.create_cache(
        CacheKind::Plain,
        Box::new(RawByteHasher::default()),
        64 << 20,
        128 << 20,
    );
    let cachecore::CacheHandle::Plain(cache) = handle else {
        panic!("expected a plain cache handle");
    };
    let cache: Arc<PlainCache> = cache;

    let shadow: Arc<Mutex<HashMap<String, Option<Vec<u8>>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let ops: Vec<Op> = (0..(THREADS * OPS_PER_THREAD))
        .map(|i| {
            let r = wang_hash(i as u64);
            let key = format!("k{}", r as usize % KEY_SPACE);
            if r % 5 == 0 {
                Op::Remove(key)
            } else {
                Op::Insert(key, (r as u32).to_be_bytes().to_vec())
            }
        })
        .collect();

    {
        let cache = Arc::clone(&cache);
        let shadow = Arc::clone(&shadow);
        let pool = Workpool::new(
            THREADS,
            || (),
            move |_: &mut (), op: Op| {
                // the cache operation and the shadow update happen under
                // the same lock, so the shadow reflects a valid total
                // order even though the threads racing into it do not.
                let mut shadow = shadow.lock().unwrap();
                match op {
                    Op::Insert(key, value) => {
                        cache.insert(key.as_bytes(), &value, 1_000).unwrap();
                        shadow.insert(key, Some(value));
                    }
                    Op::Remove(key) => {
                        let _ = cache.remove(key.as_bytes(), 1_000);
                        shadow.insert(key, None);
                    }
                }
            },
            |_: &mut ()| {},
            true,
        );
        pool.execute_iter(ops);
        // pool is dropped here, which blocks until every queued op has run
    }

    let shadow = shadow.lock().unwrap();
    let mut checked = 0;
    for (key, expected) in shadow.iter() {
        let found = cache.find(key.as_bytes(), 1_000);
        match expected {
            Some(value) => {
                assert!(found.found(), "expected {key} to be present");
                assert_eq!(found.value(), Some(value.as_slice()));
                checked += 1;
            }
            None => assert!(!found.found(), "expected {key} to be absent"),
        }
    }
    assert!(checked > 0, "expected at least one surviving key to verify");
}
