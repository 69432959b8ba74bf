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

//! The registry of caches, the global byte budget, the transaction-term
//! clock, and the single cooperative housekeeping task that drives
//! migration, memory reclaim, and soft-limit rebalancing. Modeled after
//! the host project's `engine::fractal` manager: a small struct owning
//! `UnboundedSender`-free, directly-callable state plus one or two
//! `tokio::spawn`ed service loops, rather than a supervisor tree.

use {
    crate::{
        bucket::{PlainBucket, TransactionalBucket},
        cache::{CacheId, CacheKind, PlainCache, TransactionalCache},
        config::CacheConfig,
        error::{CacheErrorKind, CacheResult},
        hash::Hasher,
        metadata::Metadata,
        table::TableLimits,
    },
    parking_lot::RwLock,
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::sync::Notify,
};

/// A sum type over the two cache flavors, held by the manager's registry.
/// The host project prefers enums over trait objects at its lowest-level
/// data structures (see `cache.rs`'s own note on `Cache`), so the
/// registry follows the same shape here.
#[derive(Clone)]
pub enum CacheHandle {
    Plain(Arc<PlainCache>),
    Transactional(Arc<TransactionalCache>),
}

impl CacheHandle {
    pub fn id(&self) -> CacheId {
        match self {
            Self::Plain(c) => c.id(),
            Self::Transactional(c) => c.id(),
        }
    }

    fn metadata(&self) -> &Metadata {
        match self {
            Self::Plain(c) => c.metadata(),
            Self::Transactional(c) => c.metadata(),
        }
    }

    fn decaying_hit_ratio(&self) -> f32 {
        match self {
            Self::Plain(c) => c.stats().decaying_hit_ratio(),
            Self::Transactional(c) => c.stats().decaying_hit_ratio(),
        }
    }

    fn migrate_tick(&self, tries: u32) -> bool {
        match self {
            Self::Plain(c) => c.migrate_tick(tries),
            Self::Transactional(c) => c.migrate_tick(tries),
        }
    }

    fn free_memory_while<F: FnMut(usize) -> bool>(&self, tries: u32, predicate: F) -> bool {
        match self {
            Self::Plain(c) => c.free_memory_while(tries, predicate),
            Self::Transactional(c) => c.free_memory_while(tries, predicate),
        }
    }

    fn begin_shutdown(&self) {
        match self {
            Self::Plain(c) => c.begin_shutdown(),
            Self::Transactional(c) => c.begin_shutdown(),
        }
    }
}

/// Point-in-time accounting for one registered cache, returned by
/// [`Manager::stats_snapshot`].
#[derive(Debug, Clone, Copy)]
pub struct CacheSnapshot {
    pub id: CacheId,
    pub used: u64,
    pub allocated: u64,
    pub soft_limit: u64,
    pub hit_ratio: f32,
}

/// A read-only point-in-time view of per-cache and global accounting.
/// Not a Non-goal exclusion: the spec excludes persistence and network
/// transport, not introspection.
#[derive(Debug, Clone)]
pub struct ManagerSnapshot {
    pub global_budget_bytes: u64,
    pub global_used_bytes: u64,
    pub transaction_term: u64,
    pub caches: Vec<CacheSnapshot>,
}

pub(crate) struct ManagerInner {
    registry: RwLock<HashMap<CacheId, CacheHandle>>,
    next_id: AtomicU64,
    config: CacheConfig,
    transaction_term: AtomicU64,
    shutting_down: AtomicBool,
    shutdown_ack: Notify,
    /// used only as a liveness marker for tests and diagnostics; bumped
    /// once per process-visible (re)start of housekeeping
    reboot_id: u64,
    tick_count: AtomicU64,
}

impl ManagerInner {
    fn table_limits(&self) -> TableLimits {
        TableLimits {
            min_log_size: self.config.table_min_log_size,
            max_log_size: self.config.table_max_log_size,
            grow_threshold: self.config.table_grow_threshold,
            shrink_threshold: self.config.table_shrink_threshold,
        }
    }

    pub(crate) fn transaction_term(&self) -> u64 {
        self.transaction_term.load(Ordering::Acquire)
    }

    /// Increments the term to the next odd value. "An open transaction
    /// exists" iff the term is odd, so opening always lands on an odd
    /// number regardless of the term's prior parity (a previous
    /// `end_transaction` always leaves it even).
    fn begin_transaction(&self) -> u64 {
        let new = self.transaction_term.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(new % 2 == 1, "begin_transaction must land on an odd term");
        new
    }

    /// Validates that `term` is the currently open (odd) term before
    /// closing it; a caller racing a concurrent `begin_transaction` (or
    /// replaying a stale term) gets `Conflict` rather than silently
    /// advancing someone else's transaction.
    fn end_transaction(&self, term: u64) -> CacheResult<()> {
        let current = self.transaction_term.load(Ordering::Acquire);
        if current != term || term % 2 == 0 {
            return Err(CacheErrorKind::Conflict);
        }
        self.transaction_term.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Cache-side hint that metadata refused a grow: logged, since the
    /// actual remedy (raising the cache's soft limit) only happens on the
    /// next rebalance pass, which reads fresh hit/miss statistics rather
    /// than reacting to a single refusal.
    pub(crate) fn request_grow(&self, id: CacheId) {
        log::debug!("cache {id:?} requested a budget grow; will be considered on next rebalance");
    }

    /// Cache-side hint that a table's fill ratio crossed a resize
    /// threshold. The background worker already walks every registered
    /// cache's migration state each tick, so this is a log site rather
    /// than a queue: the next tick picks it up regardless.
    pub(crate) fn request_migration(&self, id: CacheId) {
        log::debug!("cache {id:?} requested migration");
    }

    fn global_used(&self) -> u64 {
        self.registry
            .read()
            .values()
            .map(|c| c.metadata().used())
            .sum()
    }

    /// One tick of housekeeping: advance migration on every registered
    /// cache by one bucket, reclaim memory from the worst-performing
    /// cache if the global budget is under pressure, and rebalance soft
    /// limits every `rebalance_interval_ms`.
    fn tick(&self) {
        let tick_no = self.tick_count.fetch_add(1, Ordering::Relaxed);
        let registry = self.registry.read();
        let mut migrations_done = 0usize;
        let mut bytes_reclaimed = 0usize;
        for handle in registry.values() {
            if handle.migrate_tick(self.config.tries_fast) {
                migrations_done += 1;
            }
        }
        let used = self.global_used();
        let high_water = (self.config.global_budget_bytes as f64
            * self.config.free_memory_high_water_mark as f64) as u64;
        if used > high_water {
            log::warn!(
                "global cache usage {used} exceeds high-water mark {high_water}; reclaiming"
            );
            if let Some(worst) = registry
                .values()
                .min_by(|a, b| a.decaying_hit_ratio().total_cmp(&b.decaying_hit_ratio()))
            {
                let target = used - high_water;
                let mut freed_total = 0usize;
                worst.free_memory_while(self.config.tries_fast, |freed| {
                    freed_total += freed;
                    freed_total < target as usize
                });
                bytes_reclaimed = freed_total;
            }
        }
        let ticks_per_rebalance =
            (self.config.rebalance_interval_ms / Self::TICK_INTERVAL_MS).max(1);
        if tick_no % ticks_per_rebalance == 0 {
            self.rebalance(&registry);
        }
        if migrations_done > 0 || bytes_reclaimed > 0 {
            log::debug!(
                "housekeeping tick: {migrations_done} migration step(s), {bytes_reclaimed} byte(s) reclaimed"
            );
        }
    }

    const TICK_INTERVAL_MS: u64 = 50;

    /// Recomputes each cache's soft limit from its decaying hit ratio:
    /// caches with a higher recent hit rate earn a larger share of the
    /// global budget. This is the mechanism the spec names ("a
    /// rate-limited rebalance pass that recomputes each cache's soft
    /// limit from recent hit/miss statistics") but leaves unspecified.
    fn rebalance(&self, registry: &HashMap<CacheId, CacheHandle>) {
        if registry.is_empty() {
            return;
        }
        let weights: Vec<(CacheId, f32)> = registry
            .values()
            .map(|c| (c.id(), c.decaying_hit_ratio().max(0.01)))
            .collect();
        let total_weight: f32 = weights.iter().map(|(_, w)| w).sum();
        for (id, weight) in weights {
            if let Some(handle) = registry.get(&id) {
                let share = (self.config.global_budget_bytes as f64
                    * (weight / total_weight) as f64) as u64;
                let metadata = handle.metadata();
                metadata.set_deserved(share);
                metadata.set_soft_limit(share.min(metadata.hard_limit()));
            }
        }
        log::debug!("rebalanced soft limits across {} cache(s)", registry.len());
    }
}

/// Registry of caches, global byte budget, transaction-term clock, and
/// housekeeping driver. One per process is typical; nothing here is a
/// hidden global, matching the spec's design note that a singleton
/// `Manager` becomes a value owned by the outer system.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
                transaction_term: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
                shutdown_ack: Notify::new(),
                reboot_id: crate::rng::next_usize() as u64,
                tick_count: AtomicU64::new(0),
            }),
        }
    }

    pub fn reboot_id(&self) -> u64 {
        self.inner.reboot_id
    }

    /// Registers a new cache of the given flavor and returns a strong
    /// handle to it. The manager holds its own strong reference in the
    /// registry until [`Manager::destroy_cache`] removes it.
    pub fn create_cache(
        &self,
        kind: CacheKind,
        hasher: Box<dyn Hasher>,
        soft_limit_bytes: u64,
        hard_limit_bytes: u64,
    ) -> CacheHandle {
        let id = CacheId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let limits = self.inner.table_limits();
        let initial_log_size = limits.min_log_size;
        let metadata = Metadata::new(
            core::mem::size_of::<u64>() as u64,
            soft_limit_bytes,
            hard_limit_bytes,
        );
        let manager_weak = Arc::downgrade(&self.inner);
        let handle = match kind {
            CacheKind::Plain => CacheHandle::Plain(Arc::new(PlainCache::new(
                id,
                hasher,
                manager_weak,
                metadata,
                limits,
                initial_log_size,
            ))),
            CacheKind::Transactional => {
                CacheHandle::Transactional(Arc::new(TransactionalCache::new(
                    id,
                    hasher,
                    manager_weak,
                    metadata,
                    limits,
                    initial_log_size,
                )))
            }
        };
        self.inner.registry.write().insert(id, handle.clone());
        handle
    }

    /// Removes the cache from the registry and marks it shutting down;
    /// any `Arc` clones a caller still holds keep working (miss/reject
    /// with `ShuttingDown`) until they too are dropped.
    pub fn destroy_cache(&self, id: CacheId) {
        if let Some(handle) = self.inner.registry.write().remove(&id) {
            handle.begin_shutdown();
        }
    }

    /// Raises a registered cache's soft limit, the other half of the
    /// grow-request flow `CacheShared::insert_with` starts by calling
    /// `request_grow` on a `ResourceLimit` refusal. The manager decides
    /// how much (if any) of the global budget to grant; this call is the
    /// mechanical act of granting it.
    pub fn grant_budget(&self, id: CacheId, new_soft_limit_bytes: u64) -> CacheResult<()> {
        match self.inner.registry.read().get(&id) {
            Some(handle) => {
                handle.metadata().set_soft_limit(new_soft_limit_bytes);
                Ok(())
            }
            None => Err(CacheErrorKind::NotFound),
        }
    }

    pub fn begin_transaction(&self) -> u64 {
        self.inner.begin_transaction()
    }

    pub fn end_transaction(&self, term: u64) -> CacheResult<()> {
        self.inner.end_transaction(term)
    }

    pub fn transaction_term(&self) -> u64 {
        self.inner.transaction_term()
    }

    pub fn stats_snapshot(&self) -> ManagerSnapshot {
        let registry = self.inner.registry.read();
        let caches = registry
            .values()
            .map(|c| CacheSnapshot {
                id: c.id(),
                used: c.metadata().used(),
                allocated: c.metadata().allocated(),
                soft_limit: c.metadata().soft_limit(),
                hit_ratio: c.decaying_hit_ratio(),
            })
            .collect();
        ManagerSnapshot {
            global_budget_bytes: self.inner.config.global_budget_bytes,
            global_used_bytes: self.inner.global_used(),
            transaction_term: self.inner.transaction_term(),
            caches,
        }
    }

    /// Runs one housekeeping tick synchronously: advances migration on
    /// every registered cache by one bucket, reclaims memory under
    /// pressure, and rebalances soft limits if the interval has elapsed.
    /// An embedder that does not want a background `tokio` task can call
    /// this directly from its own event loop instead of
    /// [`Manager::spawn_background_worker`]; tests use it to drive
    /// migration deterministically without waiting on real time.
    pub fn drive_housekeeping_tick(&self) {
        self.inner.tick();
    }

    /// Spawns the single cooperative housekeeping task on the current
    /// tokio runtime. Dropping or aborting the returned handle stops
    /// housekeeping; prefer [`Manager::begin_shutdown`] for a clean stop
    /// that waits for the in-flight tick to finish.
    pub fn spawn_background_worker(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(ManagerInner::TICK_INTERVAL_MS));
            loop {
                interval.tick().await;
                if inner.shutting_down.load(Ordering::Acquire) {
                    inner.shutdown_ack.notify_waiters();
                    return;
                }
                inner.tick();
            }
        })
    }

    /// Sets the shared shutdown flag and waits for the background
    /// worker's current tick to finish, so that callers can be sure no
    /// further housekeeping runs once this returns. All further cache
    /// operations return `SHUTTING_DOWN` within one bucket-lock
    /// acquisition, per the spec's cancellation model; this call is the
    /// natural completion of that behavior for the worker side.
    pub async fn begin_shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        for handle in self.inner.registry.read().values() {
            handle.begin_shutdown();
        }
        self.inner.shutdown_ack.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::RawByteHasher;

    fn manager() -> Manager {
        Manager::new(CacheConfig::default())
    }

    #[test]
    fn begin_transaction_is_always_odd() {
        let mgr = manager();
        let t1 = mgr.begin_transaction();
        assert_eq!(t1 % 2, 1);
        assert!(mgr.end_transaction(t1).is_ok());
        let t2 = mgr.begin_transaction();
        assert_eq!(t2 % 2, 1);
        assert!(t2 > t1);
    }

    #[test]
    fn end_transaction_rejects_wrong_term() {
        let mgr = manager();
        let t1 = mgr.begin_transaction();
        assert_eq!(mgr.end_transaction(t1 + 1), Err(CacheErrorKind::Conflict));
        assert!(mgr.end_transaction(t1).is_ok());
        assert_eq!(mgr.end_transaction(t1), Err(CacheErrorKind::Conflict));
    }

    #[test]
    fn create_and_destroy_cache_round_trip() {
        let mgr = manager();
        let handle = mgr.create_cache(
            CacheKind::Plain,
            Box::new(RawByteHasher::default()),
            1 << 20,
            1 << 21,
        );
        let id = handle.id();
        assert_eq!(mgr.inner.registry.read().len(), 1);
        mgr.destroy_cache(id);
        assert_eq!(mgr.inner.registry.read().len(), 0);
    }

    #[test]
    fn stats_snapshot_reflects_global_budget() {
        let mgr = Manager::new(CacheConfig {
            global_budget_bytes: 4096,
            ..CacheConfig::default()
        });
        let snapshot = mgr.stats_snapshot();
        assert_eq!(snapshot.global_budget_bytes, 4096);
        assert_eq!(snapshot.global_used_bytes, 0);
    }
}
