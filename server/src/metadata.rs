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

//! Per-cache byte accounting. Multi-field updates go through a spinlock
//! (the struct is small and updates are brief); single-counter reads are
//! plain atomics.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Counters {
    allocated: u64,
    used: u64,
    table_size: u64,
}

pub struct Metadata {
    fixed_size: u64,
    soft_limit: core::sync::atomic::AtomicU64,
    hard_limit: u64,
    deserved: core::sync::atomic::AtomicU64,
    counters: Mutex<Counters>,
}

impl Metadata {
    pub fn new(fixed_size: u64, soft_limit: u64, hard_limit: u64) -> Self {
        Self {
            fixed_size,
            soft_limit: core::sync::atomic::AtomicU64::new(soft_limit),
            hard_limit,
            deserved: core::sync::atomic::AtomicU64::new(soft_limit),
            counters: Mutex::new(Counters {
                allocated: fixed_size,
                used: 0,
                table_size: 0,
            }),
        }
    }

    pub fn used(&self) -> u64 {
        self.counters.lock().used
    }

    pub fn allocated(&self) -> u64 {
        self.counters.lock().allocated
    }

    pub fn fixed_size(&self) -> u64 {
        self.fixed_size
    }

    pub fn soft_limit(&self) -> u64 {
        self.soft_limit.load(core::sync::atomic::Ordering::Relaxed)
    }

    pub fn hard_limit(&self) -> u64 {
        self.hard_limit
    }

    pub fn set_soft_limit(&self, new_limit: u64) {
        self.soft_limit
            .store(new_limit, core::sync::atomic::Ordering::Relaxed);
    }

    pub fn deserved(&self) -> u64 {
        self.deserved.load(core::sync::atomic::Ordering::Relaxed)
    }

    pub fn set_deserved(&self, bytes: u64) {
        self.deserved
            .store(bytes, core::sync::atomic::Ordering::Relaxed);
    }

    pub fn set_table_size(&self, bytes: u64) {
        let mut c = self.counters.lock();
        c.allocated = c.allocated - c.table_size + bytes;
        c.table_size = bytes;
    }

    /// Atomically checks `used + delta <= soft_limit` (for positive delta)
    /// and applies the change to both `used` and `allocated`. Returns
    /// whether the change was accepted. A negative delta (a free) is
    /// always accepted.
    pub fn adjust_usage_if_allowed(&self, delta: i64) -> bool {
        let mut c = self.counters.lock();
        if delta < 0 {
            let shrink = (-delta) as u64;
            c.used = c.used.saturating_sub(shrink);
            c.allocated = c.allocated.saturating_sub(shrink);
            return true;
        }
        let grow = delta as u64;
        let soft_limit = self.soft_limit();
        if c.used + grow > soft_limit {
            return false;
        }
        c.used += grow;
        c.allocated += grow;
        true
    }

    /// Unconditional accounting decrement, used by eviction/removal paths
    /// that have already committed to freeing the entry.
    pub fn release_usage(&self, freed: u64) {
        let mut c = self.counters.lock();
        c.used = c.used.saturating_sub(freed);
        c.allocated = c.allocated.saturating_sub(freed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_usage_respects_soft_limit() {
        let m = Metadata::new(64, 100, 1_000);
        assert!(m.adjust_usage_if_allowed(50));
        assert!(!m.adjust_usage_if_allowed(51));
        assert!(m.adjust_usage_if_allowed(50));
        assert_eq!(m.used(), 100);
    }

    #[test]
    fn negative_delta_always_accepted() {
        let m = Metadata::new(64, 100, 1_000);
        assert!(m.adjust_usage_if_allowed(80));
        assert!(m.adjust_usage_if_allowed(-30));
        assert_eq!(m.used(), 50);
    }

    #[test]
    fn invariant_used_le_allocated_le_hard_limit() {
        let m = Metadata::new(64, 100, 1_000);
        m.adjust_usage_if_allowed(90);
        assert!(m.used() <= m.allocated());
        assert!(m.allocated() <= m.hard_limit());
    }
}
