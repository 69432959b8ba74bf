//! End-to-end scenario 3: a key banished inside an open transaction
//! refuses inserts until the transaction ends, then admits them again.

use cachecore::{CacheConfig, CacheErrorKind, CacheKind, Manager, RawByteHasher};

fn manager() -> Manager {
    Manager::new(CacheConfig::default())
}

#[test]
fn banish_blocks_insert_until_transaction_ends() {
    let mgr = manager();
    let handle = mgr.create_cache(
        CacheKind::Transactional,
        Box::new(RawByteHasher::default()),
        1 << 20,
        1 << 21,
    );
    let cachecore::CacheHandle::Transactional(cache) = handle else {
        panic!("expected a transactional cache handle");
    };

    let term = mgr.begin_transaction();
    assert_eq!(term % 2, 1);

    cache.banish(b"doc/7", 1_000).unwrap_err(); // NOT_FOUND: nothing cached yet, banish still applies
    assert_eq!(
        cache.insert(b"doc/7", b"x", 1_000),
        Err(CacheErrorKind::Conflict)
    );

    mgr.end_transaction(term).unwrap();
    assert_eq!(mgr.transaction_term() % 2, 0);

    cache.insert(b"doc/7", b"x", 1_000).unwrap();
    let found = cache.find(b"doc/7", 1_000);
    assert!(found.found());
    assert_eq!(found.value(), Some(&b"x"[..]));
}
