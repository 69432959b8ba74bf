//! End-to-end scenario 6: a cache at its soft limit refuses further
//! inserts with `RESOURCE_LIMIT`; once the manager grants more budget,
//! subsequent inserts succeed.

use cachecore::{CacheConfig, CacheErrorKind, CacheKind, Manager, RawByteHasher};

#[test]
fn resource_limit_then_grant_unblocks_inserts() {
    let mgr = Manager::new(CacheConfig::default());
    let handle = mgr.create_cache(
        CacheKind::Plain,
        Box::new(RawByteHasher::default()),
        4 * 1024,
        64 * 1024,
    );
    let cachecore::CacheHandle::Plain(cache) = handle else {
        panic!("expected a plain cache handle");
    };
    let id = cache.id();

    let mut refused = false;
    for i in 0..40 {
        let key = format!("k{i}");
        let value = vec![b'v'; 128]; // ~40 * (header + key + 128B) > 4 KiB soft limit
        match cache.insert(key.as_bytes(), &value, 1_000) {
            Ok(()) => {}
            Err(CacheErrorKind::ResourceLimit) => {
                refused = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(refused, "expected at least one insert to hit the soft limit");

    mgr.grant_budget(id, 64 * 1024).unwrap();

    cache.insert(b"after-grant", b"payload", 1_000).unwrap();
    let found = cache.find(b"after-grant", 1_000);
    assert!(found.found());
}
