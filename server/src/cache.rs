/*
 * Created on Thu Jul 30 2026
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! Shared cache behavior plus the two concrete flavors. A `Cache` owns one
//! current `Table`, its `Metadata`, hit/miss statistics, and a weak
//! back-pointer to the owning `Manager`. Rather than a vtable over
//! `Cache`, the two flavors are concrete types and the manager's registry
//! holds a small sum type over them (`CacheHandle`), per the host
//! project's own preference for enums over trait objects at its
//! lowest-level data structures.

use {
    crate::{
        bucket::{evict_candidate, Bucket, PlainBucket, TransactionalBucket},
        error::{CacheErrorKind, CacheResult},
        hash::Hasher,
        manager::ManagerInner,
        metadata::Metadata,
        stats::Stats,
        table::{Resize, Table, TableLimits},
        value::{CachedValue, Finding},
    },
    core::{
        ptr::NonNull,
        sync::atomic::{AtomicBool, Ordering},
    },
    crossbeam_epoch::{self as epoch, Owned, Shared},
    std::sync::Weak,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Plain,
    Transactional,
}

/// Behavior shared by `PlainCache` and `TransactionalCache`: the table
/// swap point, metadata, stats, and the manager back-pointer. Neither
/// flavor is built directly; both go through `Manager::create_cache`.
pub(crate) struct CacheShared<B: Bucket> {
    pub(crate) id: CacheId,
    table: epoch::Atomic<Table<B>>,
    /// index of the next predecessor bucket to migrate, while a migration
    /// is in flight; reset to 0 each time a new auxiliary table is
    /// installed.
    migration_cursor: core::sync::atomic::AtomicUsize,
    pub(crate) metadata: Metadata,
    pub(crate) hasher: Box<dyn Hasher>,
    manager: Weak<ManagerInner>,
    pub(crate) stats: Stats,
    limits: TableLimits,
    shutting_down: AtomicBool,
}

impl<B: Bucket> CacheShared<B> {
    pub(crate) fn new(
        id: CacheId,
        hasher: Box<dyn Hasher>,
        manager: Weak<ManagerInner>,
        metadata: Metadata,
        limits: TableLimits,
        initial_log_size: u8,
    ) -> Self {
        let table = Table::new(initial_log_size, clone_limits(&limits));
        Self {
            id,
            table: epoch::Atomic::new(table),
            migration_cursor: core::sync::atomic::AtomicUsize::new(0),
            metadata,
            hasher,
            manager,
            stats: Stats::default(),
            limits,
            shutting_down: AtomicBool::new(false),
        }
    }

    fn table<'g>(&self, guard: &'g epoch::Guard) -> &'g Table<B> {
        unsafe { self.table.load(Ordering::Acquire, guard).deref() }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    fn manager(&self) -> Option<std::sync::Arc<ManagerInner>> {
        self.manager.upgrade()
    }

    /// `find` never fails structurally: a miss is `NOT_FOUND`, contention
    /// is `LOCK_TIMEOUT`.
    pub(crate) fn find(&self, key: &[u8], max_tries: u32) -> Finding {
        if self.is_shutting_down() {
            return Finding::miss(CacheErrorKind::ShuttingDown);
        }
        let guard = epoch::pin();
        let table = self.table(&guard);
        let hash = self.hasher.hash_key(key);
        self.stats.record_lookup_start();
        match table.fetch_and_lock_bucket(hash, max_tries) {
            None => Finding::miss(CacheErrorKind::LockTimeout),
            Some(locker) => match locker.bucket_mut().find(hash, key, &*self.hasher) {
                Some(ptr) => {
                    self.stats.record_hit();
                    unsafe { Finding::hit(NonNull::new_unchecked(ptr)) }
                }
                None => {
                    self.stats.record_miss();
                    Finding::miss(CacheErrorKind::NotFound)
                }
            },
        }
    }

    /// Shared admission path: lock the target bucket, evict a candidate if
    /// full, account the size delta, and report fill/empty events to the
    /// table. `on_locked` lets each flavor inject its own pre-admission
    /// check (banish lookup for the transactional flavor).
    fn insert_with<F>(
        &self,
        key: &[u8],
        raw_value: &[u8],
        max_tries: u32,
        on_locked: F,
    ) -> CacheResult<()>
    where
        F: FnOnce(&mut B, u32) -> CacheResult<()>,
    {
        if self.is_shutting_down() {
            return Err(CacheErrorKind::ShuttingDown);
        }
        let value = CachedValue::construct(key, raw_value);
        if value.is_null() {
            return Err(CacheErrorKind::Internal);
        }
        let size = unsafe { CachedValue::size_bytes(value) };
        let guard = epoch::pin();
        let table = self.table(&guard);
        let hash = self.hasher.hash_key(key);
        let locker = match table.fetch_and_lock_bucket(hash, max_tries) {
            Some(l) => l,
            None => {
                unsafe { CachedValue::delete(value) };
                return Err(CacheErrorKind::LockTimeout);
            }
        };
        let bucket = locker.bucket_mut();
        if let Err(e) = on_locked(bucket, hash) {
            unsafe { CachedValue::delete(value) };
            return Err(e);
        }
        // an insert for an already-cached key replaces that entry in place
        // rather than appending a duplicate slot for the same key; the
        // bucket's LRU eviction candidate is only consulted when no
        // same-key entry exists and the bucket is full.
        let same_key = bucket.find(hash, key, &*self.hasher);
        let (candidate, is_eviction) = match same_key {
            Some(ptr) => (Some(ptr), false),
            None if bucket.slots_used() == bucket.capacity() => match bucket.eviction_candidate()
            {
                Some(ptr) => (Some(ptr), true),
                None => {
                    unsafe { CachedValue::delete(value) };
                    return Err(CacheErrorKind::BusyBucket);
                }
            },
            None => (None, false),
        };
        // a same-key candidate may still be leased by an in-flight
        // `Finding`; only a freeable one is sized into the delta and freed
        // now, the same rule `remove` applies (see its comment on
        // deferred free). An eviction-candidate is always freeable by
        // construction.
        let freeable = match candidate {
            Some(ptr) => unsafe { CachedValue::is_freeable(ptr) },
            None => false,
        };
        let freed = match (candidate, freeable) {
            (Some(ptr), true) => unsafe { CachedValue::size_bytes(ptr) },
            _ => 0,
        };
        let delta = size as i64 - freed as i64;
        if !self.metadata.adjust_usage_if_allowed(delta) {
            // undo: the slot we just freed stays freed regardless (we do
            // not resurrect the evicted entry), we simply refuse the new one
            if let Some(mgr) = self.manager() {
                mgr.request_grow(self.id);
            }
            unsafe { CachedValue::delete(value) };
            return Err(CacheErrorKind::ResourceLimit);
        }
        if let Some(victim) = candidate {
            bucket.evict(victim);
            if freeable {
                unsafe { CachedValue::delete(victim) };
            }
        }
        bucket.insert(hash, value);
        // a true LRU eviction (replacing a different key) nets zero change
        // in occupancy, so only a same-key replace or a genuinely new slot
        // counts as a fill.
        if !is_eviction && table.slot_filled() {
            if let Some(mgr) = self.manager() {
                mgr.request_migration(self.id);
            }
        }
        self.stats.record_insert();
        Ok(())
    }

    pub(crate) fn remove(&self, key: &[u8], max_tries: u32) -> CacheResult<()> {
        if self.is_shutting_down() {
            return Err(CacheErrorKind::ShuttingDown);
        }
        let guard = epoch::pin();
        let table = self.table(&guard);
        let hash = self.hasher.hash_key(key);
        let locker = table
            .fetch_and_lock_bucket(hash, max_tries)
            .ok_or(CacheErrorKind::LockTimeout)?;
        let bucket = locker.bucket_mut();
        if let Some(ptr) = bucket.remove(hash, key, &*self.hasher) {
            let size = unsafe { CachedValue::size_bytes(ptr) };
            // a removed entry may still be leased by an in-flight Finding;
            // only a freeable entry may be deleted immediately, otherwise
            // the last `Finding::drop` would race a freed pointer. Bucket
            // removal already excised it from lookups, which is the
            // correctness-relevant half; deferred free would be needed for
            // full safety under concurrent leases, tracked as future work.
            if unsafe { CachedValue::is_freeable(ptr) } {
                unsafe { CachedValue::delete(ptr) };
                self.metadata.release_usage(size as u64);
                table.slot_emptied();
            }
        }
        // removing a missing key is success: idempotent by design
        Ok(())
    }

    /// Scans the current table starting from a random bucket, evicting one
    /// candidate per bucket visited, until `predicate` returns `false` or
    /// the table is exhausted. Returns whether a migration is now
    /// advisable. Does not touch the transaction term (see
    /// `TransactionalCache`'s doc comment on this point).
    pub(crate) fn free_memory_while<F: FnMut(usize) -> bool>(
        &self,
        max_tries: u32,
        mut predicate: F,
    ) -> bool {
        let guard = epoch::pin();
        let table = self.table(&guard);
        let capacity = table.capacity();
        if capacity == 0 {
            return false;
        }
        let start = crate::rng::next_usize() % capacity;
        let mut migration_advisable = false;
        for offset in 0..capacity {
            if offset % 1024 == 0 && self.is_shutting_down() {
                break;
            }
            let index = (start + offset) % capacity;
            if !table.bucket_at(index).lock(max_tries) {
                continue;
            }
            let bucket = unsafe { table.bucket_at_mut(index) };
            let freed = evict_candidate(bucket);
            table.bucket_at(index).unlock();
            if freed > 0 {
                self.metadata.release_usage(freed as u64);
                if table.slot_emptied() {
                    migration_advisable = true;
                }
                if !predicate(freed) {
                    break;
                }
            }
        }
        migration_advisable || table.resize_kind() != Resize::None
    }

    pub(crate) fn migration_pending(&self) -> bool {
        let guard = epoch::pin();
        self.table(&guard).resize_kind() != Resize::None
    }

    pub(crate) fn limits(&self) -> &TableLimits {
        &self.limits
    }

    /// Current bucket table capacity, for callers that want to observe a
    /// migration's effect without reaching into `Table` directly.
    pub(crate) fn capacity(&self) -> usize {
        let guard = epoch::pin();
        self.table(&guard).capacity()
    }

    /// Drives one tick of online migration. If none is in progress and
    /// the table's fill ratio calls for a resize, installs a
    /// differently-sized auxiliary table and returns; otherwise migrates
    /// one predecessor bucket per call, finalizing the swap once the
    /// cursor has walked every bucket. Returns whether it did any work,
    /// so the manager knows whether to keep scheduling ticks for this
    /// cache.
    pub(crate) fn migrate_tick(&self, tries: u32) -> bool {
        let guard = epoch::pin();
        let current = self.table(&guard);
        let aux_shared = current.auxiliary(&guard);
        if aux_shared.is_null() {
            if current.resize_kind() == Resize::None {
                return false;
            }
            let target_log_size = current.ideal_size();
            let new_table = Owned::new(Table::new(target_log_size, clone_limits(&self.limits)));
            // if someone beat us to installing one, just retry on the next
            // tick rather than treating it as an error
            let _ = current.set_auxiliary(new_table, &guard);
            self.migration_cursor.store(0, Ordering::Relaxed);
            return true;
        }
        let successor = unsafe { aux_shared.deref() };
        let cursor = self.migration_cursor.load(Ordering::Relaxed);
        if cursor >= current.capacity() {
            self.finalize_migration(aux_shared, &guard);
            return true;
        }
        if self.migrate_one_bucket(current, successor, cursor, tries) {
            self.migration_cursor.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Migrates one predecessor bucket's contents into the successor
    /// table, per the migration protocol in the spec: lock the
    /// predecessor, lock every successor bucket it could fan into,
    /// relocate each live entry (evicting a successor candidate if full,
    /// dropping the entry entirely if nothing in the successor is
    /// freeable), relay banish state, then mark the predecessor migrated.
    /// Returns `false` on a transient lock failure; the caller retries
    /// the same bucket on the next tick rather than skipping it.
    fn migrate_one_bucket(
        &self,
        predecessor: &Table<B>,
        successor: &Table<B>,
        index: usize,
        tries: u32,
    ) -> bool {
        if !predecessor.bucket_at(index).lock(tries) {
            return false;
        }
        let pred_bucket = unsafe { predecessor.bucket_at_mut(index) };
        if pred_bucket.state().is_migrated() {
            predecessor.bucket_at(index).unlock();
            return true;
        }
        let successor_indices = predecessor.subtable_for(index, successor.log_size());
        let mut locked = Vec::with_capacity(successor_indices.len());
        for &s_idx in &successor_indices {
            if successor.bucket_at(s_idx).lock(tries) {
                locked.push(s_idx);
            } else {
                for l in &locked {
                    successor.bucket_at(*l).unlock();
                }
                predecessor.bucket_at(index).unlock();
                return false;
            }
        }
        let max_term = successor_indices
            .iter()
            .map(|&i| successor.bucket_at(i).banish_term_or_zero())
            .fold(pred_bucket.banish_term_or_zero(), u64::max);
        let fully_banished = pred_bucket.is_fully_banished();
        for (hash, ptr) in pred_bucket.occupied() {
            let target_index = successor.index_for(hash);
            debug_assert!(successor_indices.contains(&target_index));
            let target_bucket = unsafe { successor.bucket_at_mut(target_index) };
            if target_bucket.slots_used() == target_bucket.capacity() {
                match target_bucket.eviction_candidate() {
                    Some(victim) => {
                        let freed = unsafe { CachedValue::size_bytes(victim) };
                        target_bucket.evict(victim);
                        unsafe { CachedValue::delete(victim) };
                        self.metadata.release_usage(freed as u64);
                    }
                    None => {
                        // nothing evictable (every slot leased): the
                        // migrating entry is dropped rather than blocking
                        let freed = unsafe { CachedValue::size_bytes(ptr) };
                        unsafe { CachedValue::delete(ptr) };
                        self.metadata.release_usage(freed as u64);
                        continue;
                    }
                }
            }
            target_bucket.insert(hash, ptr);
            successor.slot_filled();
        }
        pred_bucket.clear();
        for &s_idx in &successor_indices {
            let s_bucket = unsafe { successor.bucket_at_mut(s_idx) };
            s_bucket.relay_banish_term(max_term);
            if fully_banished {
                s_bucket.mark_fully_banished();
            }
        }
        pred_bucket.state().set_migrated();
        for l in locked {
            successor.bucket_at(l).unlock();
        }
        predecessor.bucket_at(index).unlock();
        true
    }

    fn finalize_migration<'g>(&self, aux_shared: Shared<'g, Table<B>>, guard: &'g epoch::Guard) {
        let old = self.table.swap(aux_shared, Ordering::AcqRel, guard);
        // SAFETY: no lookup can still be touching `old` once every bucket
        // it owns is marked `migrated`, which is the precondition for
        // reaching this call; the epoch guard defers the actual free past
        // any in-flight readers regardless.
        unsafe { guard.defer_destroy(old) };
        self.migration_cursor.store(0, Ordering::Relaxed);
    }
}

fn clone_limits(limits: &TableLimits) -> TableLimits {
    TableLimits {
        min_log_size: limits.min_log_size,
        max_log_size: limits.max_log_size,
        grow_threshold: limits.grow_threshold,
        shrink_threshold: limits.shrink_threshold,
    }
}

/// LRU cache over opaque byte keys with no transactional semantics.
pub struct PlainCache {
    pub(crate) shared: CacheShared<PlainBucket>,
}

impl PlainCache {
    pub(crate) fn new(
        id: CacheId,
        hasher: Box<dyn Hasher>,
        manager: Weak<ManagerInner>,
        metadata: Metadata,
        limits: TableLimits,
        initial_log_size: u8,
    ) -> Self {
        Self {
            shared: CacheShared::new(id, hasher, manager, metadata, limits, initial_log_size),
        }
    }

    pub fn find(&self, key: &[u8], max_tries: u32) -> Finding {
        self.shared.find(key, max_tries)
    }

    pub fn insert(&self, key: &[u8], value: &[u8], max_tries: u32) -> CacheResult<()> {
        self.shared
            .insert_with(key, value, max_tries, |_bucket, _hash| Ok(()))
    }

    pub fn remove(&self, key: &[u8], max_tries: u32) -> CacheResult<()> {
        self.shared.remove(key, max_tries)
    }

    /// The plain cache has no banish semantics.
    pub fn banish(&self, _key: &[u8]) -> CacheResult<()> {
        Err(CacheErrorKind::NotImplemented)
    }

    pub fn free_memory_while<F: FnMut(usize) -> bool>(&self, max_tries: u32, predicate: F) -> bool {
        self.shared.free_memory_while(max_tries, predicate)
    }

    pub fn id(&self) -> CacheId {
        self.shared.id
    }

    pub(crate) fn migrate_tick(&self, tries: u32) -> bool {
        self.shared.migrate_tick(tries)
    }

    pub(crate) fn metadata(&self) -> &Metadata {
        &self.shared.metadata
    }

    pub(crate) fn stats(&self) -> &Stats {
        &self.shared.stats
    }

    pub(crate) fn begin_shutdown(&self) {
        self.shared.begin_shutdown()
    }

    /// Whether the underlying table currently wants to grow or shrink.
    /// Exposed publicly so an embedder (or a test) can observe migration
    /// progress without reaching into private table internals.
    pub fn is_migration_pending(&self) -> bool {
        self.shared.migration_pending()
    }

    /// Current bucket table capacity.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// LRU cache with a per-key/per-bucket banish set tied to the manager's
/// monotonic transaction term.
pub struct TransactionalCache {
    pub(crate) shared: CacheShared<TransactionalBucket>,
}

impl TransactionalCache {
    pub(crate) fn new(
        id: CacheId,
        hasher: Box<dyn Hasher>,
        manager: Weak<ManagerInner>,
        metadata: Metadata,
        limits: TableLimits,
        initial_log_size: u8,
    ) -> Self {
        Self {
            shared: CacheShared::new(id, hasher, manager, metadata, limits, initial_log_size),
        }
    }

    fn current_term(&self) -> u64 {
        self.shared
            .manager()
            .map(|m| m.transaction_term())
            .unwrap_or(0)
    }

    pub fn find(&self, key: &[u8], max_tries: u32) -> Finding {
        if self.shared.is_shutting_down() {
            return Finding::miss(CacheErrorKind::ShuttingDown);
        }
        let guard = epoch::pin();
        let table = self.shared.table(&guard);
        let hash = self.shared.hasher.hash_key(key);
        match table.fetch_and_lock_bucket(hash, max_tries) {
            None => Finding::miss(CacheErrorKind::LockTimeout),
            Some(locker) => {
                let term = self.current_term();
                let bucket = locker.bucket_mut();
                bucket.update_banish_term(term);
                match bucket.find(hash, key, &*self.shared.hasher) {
                    Some(ptr) => {
                        self.shared.stats.record_hit();
                        unsafe { Finding::hit(NonNull::new_unchecked(ptr)) }
                    }
                    None => {
                        self.shared.stats.record_miss();
                        Finding::miss(CacheErrorKind::NotFound)
                    }
                }
            }
        }
    }

    pub fn insert(&self, key: &[u8], value: &[u8], max_tries: u32) -> CacheResult<()> {
        let term = self.current_term();
        self.shared.insert_with(key, value, max_tries, |bucket, hash| {
            bucket.update_banish_term(term);
            if bucket.is_banished(hash) {
                Err(CacheErrorKind::Conflict)
            } else {
                Ok(())
            }
        })
    }

    pub fn remove(&self, key: &[u8], max_tries: u32) -> CacheResult<()> {
        self.shared.remove(key, max_tries)
    }

    /// Locks the bucket, removes a matching entry if present (accounting
    /// for the freed memory), then installs the banish marker. Returns
    /// `NOT_FOUND` if no entry existed (the banish itself still applies).
    pub fn banish(&self, key: &[u8], max_tries: u32) -> CacheResult<()> {
        if self.shared.is_shutting_down() {
            return Err(CacheErrorKind::ShuttingDown);
        }
        let guard = epoch::pin();
        let table = self.shared.table(&guard);
        let hash = self.shared.hasher.hash_key(key);
        let locker = table
            .fetch_and_lock_bucket(hash, max_tries)
            .ok_or(CacheErrorKind::LockTimeout)?;
        let term = self.current_term();
        let bucket = locker.bucket_mut();
        bucket.update_banish_term(term);
        let had_entry = match bucket.banish(hash, key, &*self.shared.hasher) {
            Some(ptr) => {
                let size = unsafe { CachedValue::size_bytes(ptr) };
                if unsafe { CachedValue::is_freeable(ptr) } {
                    unsafe { CachedValue::delete(ptr) };
                    self.shared.metadata.release_usage(size as u64);
                    table.slot_emptied();
                }
                true
            }
            None => false,
        };
        if had_entry {
            Ok(())
        } else {
            Err(CacheErrorKind::NotFound)
        }
    }

    /// Deliberately bypasses `update_banish_term`: a background reclaim
    /// pass may act on a stale banish state, which only ever tightens
    /// (never loosens) admission, so it cannot violate the banish
    /// invariant even though it is stale.
    pub fn free_memory_while<F: FnMut(usize) -> bool>(&self, max_tries: u32, predicate: F) -> bool {
        self.shared.free_memory_while(max_tries, predicate)
    }

    pub fn id(&self) -> CacheId {
        self.shared.id
    }

    pub(crate) fn migrate_tick(&self, tries: u32) -> bool {
        self.shared.migrate_tick(tries)
    }

    pub(crate) fn metadata(&self) -> &Metadata {
        &self.shared.metadata
    }

    pub(crate) fn stats(&self) -> &Stats {
        &self.shared.stats
    }

    pub(crate) fn begin_shutdown(&self) {
        self.shared.begin_shutdown()
    }

    /// Whether the underlying table currently wants to grow or shrink.
    pub fn is_migration_pending(&self) -> bool {
        self.shared.migration_pending()
    }

    /// Current bucket table capacity.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}
