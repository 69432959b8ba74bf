//! End-to-end scenario 4: filling a table past its grow threshold makes a
//! migration to a larger table observable, and drivable to completion via
//! the manager's synchronous housekeeping tick. Every key inserted before
//! migration either survives at the new size or was legitimately evicted.

use cachecore::{CacheConfig, CacheKind, Manager, RawByteHasher};

#[test]
fn grow_migration_preserves_or_legitimately_evicts_every_key() {
    let mgr = Manager::new(CacheConfig {
        table_min_log_size: 8,
        ..CacheConfig::default()
    });
    let handle = mgr.create_cache(
        CacheKind::Plain,
        Box::new(RawByteHasher::default()),
        16 << 20,
        32 << 20,
    );
    let cachecore::CacheHandle::Plain(cache) = handle else {
        panic!("expected a plain cache handle");
    };

    let initial_capacity = cache.capacity();
    assert_eq!(initial_capacity, 1usize << 8);

    // 30% of capacity, spread by a real hasher rather than forced into one
    // bucket, so the fill ratio crosses the grow threshold without any one
    // bucket overflowing its own ten-slot capacity.
    let keys: Vec<String> = (0..(initial_capacity * 3 / 10))
        .map(|i| format!("doc/{i}"))
        .collect();
    for key in &keys {
        cache.insert(key.as_bytes(), b"payload", 1_000).unwrap();
    }

    assert!(cache.is_migration_pending());

    let mut ticks = 0;
    while cache.is_migration_pending() {
        mgr.drive_housekeeping_tick();
        ticks += 1;
        assert!(ticks < initial_capacity * 4, "migration did not converge");
    }

    assert!(cache.capacity() > initial_capacity);

    let mut evicted = 0;
    let mut survived = 0;
    for key in &keys {
        let found = cache.find(key.as_bytes(), 1_000);
        if found.found() {
            assert_eq!(found.value(), Some(&b"payload"[..]));
            survived += 1;
        } else {
            evicted += 1;
        }
    }
    assert_eq!(survived + evicted, keys.len());
    // with a 30%-full table and ten-wide buckets, eviction during migration
    // should be rare to nonexistent
    assert!(survived > 0);
}
