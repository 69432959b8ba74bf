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

//! Approximate hit/miss counters, including a windowed (exponentially
//! decaying) variant sampled by the manager's rebalance pass. No CAS is
//! required: a lost update under concurrency only blurs the statistic,
//! it never corrupts cache state.

use core::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    /// fixed-point decaying hit estimate, scaled by `DECAY_SCALE`
    decaying_hits: AtomicU64,
    decaying_total: AtomicU64,
}

const DECAY_SCALE: u64 = 1 << 16;
/// weight given to the new sample each time the decaying average updates;
/// smaller = smoother, slower to react
const DECAY_WEIGHT_NUM: u64 = 1;
const DECAY_WEIGHT_DEN: u64 = 16;

impl Stats {
    pub fn record_lookup_start(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.decay_update(true);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.decay_update(false);
    }

    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn decay_update(&self, hit: bool) {
        let sample = if hit { DECAY_SCALE } else { 0 };
        let prev = self.decaying_hits.load(Ordering::Relaxed);
        let next = prev - (prev * DECAY_WEIGHT_NUM) / DECAY_WEIGHT_DEN
            + (sample * DECAY_WEIGHT_NUM) / DECAY_WEIGHT_DEN;
        self.decaying_hits.store(next, Ordering::Relaxed);
        self.decaying_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// The decaying hit ratio in `[0.0, 1.0]`, weighted toward recent
    /// lookups. Returns `1.0` before any lookup has been recorded (an
    /// empty cache has not yet earned a demotion).
    pub fn decaying_hit_ratio(&self) -> f32 {
        if self.decaying_total.load(Ordering::Relaxed) == 0 {
            return 1.0;
        }
        self.decaying_hits.load(Ordering::Relaxed) as f32 / DECAY_SCALE as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_hits_converge_near_one() {
        let s = Stats::default();
        for _ in 0..200 {
            s.record_hit();
        }
        assert!(s.decaying_hit_ratio() > 0.95);
    }

    #[test]
    fn all_misses_converge_near_zero() {
        let s = Stats::default();
        s.record_hit();
        for _ in 0..200 {
            s.record_miss();
        }
        assert!(s.decaying_hit_ratio() < 0.05);
    }

    #[test]
    fn counters_are_monotonic() {
        let s = Stats::default();
        s.record_hit();
        s.record_miss();
        s.record_insert();
        assert_eq!(s.hits(), 1);
        assert_eq!(s.misses(), 1);
        assert_eq!(s.inserts(), 1);
    }
}
