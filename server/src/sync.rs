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

//! The one-byte bucket spinlock. Buckets are cache-line sized and
//! contention on any single one is expected to be brief, so a bounded
//! test-and-test-and-set spin beats parking a thread.

use core::sync::atomic::{AtomicU8, Ordering};

const LOCKED: u8 = 0b001;
const MIGRATED: u8 = 0b010;
const BANISHED: u8 = 0b100;

/// A single byte carrying the lock bit plus the `migrated`/`banished`
/// flags. Buckets hold this inline rather than a full `Mutex` so that the
/// whole bucket still fits one cache line.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct BucketState(AtomicU8);

impl BucketState {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Bounded TATAS spin. Returns `false` once `max_tries` attempts have
    /// all observed the lock held.
    #[inline]
    pub fn lock(&self, max_tries: u32) -> bool {
        for _ in 0..max_tries {
            if self.0.load(Ordering::Relaxed) & LOCKED == 0 {
                let prev = self.0.fetch_or(LOCKED, Ordering::Acquire);
                if prev & LOCKED == 0 {
                    return true;
                }
            }
            core::hint::spin_loop();
        }
        false
    }

    /// Must only be called by the current lock holder.
    #[inline]
    pub fn unlock(&self) {
        self.0.fetch_and(!LOCKED, Ordering::Release);
    }

    #[inline]
    pub fn is_migrated(&self) -> bool {
        self.0.load(Ordering::Acquire) & MIGRATED != 0
    }

    /// Caller must hold the lock.
    #[inline]
    pub fn set_migrated(&self) {
        self.0.fetch_or(MIGRATED, Ordering::Release);
    }

    #[inline]
    pub fn is_banished(&self) -> bool {
        self.0.load(Ordering::Relaxed) & BANISHED != 0
    }

    /// Caller must hold the lock.
    #[inline]
    pub fn set_banished(&self) {
        self.0.fetch_or(BANISHED, Ordering::Relaxed);
    }

    /// Caller must hold the lock.
    #[inline]
    pub fn clear_banished(&self) {
        self.0.fetch_and(!BANISHED, Ordering::Relaxed);
    }
}

/// RAII guard returned by [`BucketState::lock`] callers; ties the unlock to
/// the guard's drop so a panic mid-operation can never leave a bucket
/// wedged. Bucket-level code builds these rather than calling lock/unlock
/// directly (see `bucket.rs`).
pub struct LockGuard<'a> {
    state: &'a BucketState,
}

impl<'a> LockGuard<'a> {
    /// Caller asserts the lock is already held (e.g. `state.lock(..)` just
    /// returned `true`).
    pub(crate) fn assume_locked(state: &'a BucketState) -> Self {
        Self { state }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.state.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_unlock_roundtrip() {
        let s = BucketState::new();
        assert!(s.lock(10));
        s.unlock();
        assert!(s.lock(10));
    }

    #[test]
    fn second_lock_attempt_fails_while_held() {
        let s = BucketState::new();
        assert!(s.lock(10));
        assert!(!s.lock(5));
        s.unlock();
        assert!(s.lock(5));
    }

    #[test]
    fn migrated_and_banished_flags_are_independent_of_lock_bit() {
        let s = BucketState::new();
        assert!(s.lock(10));
        s.set_migrated();
        s.set_banished();
        assert!(s.is_migrated());
        assert!(s.is_banished());
        s.clear_banished();
        assert!(!s.is_banished());
        assert!(s.is_migrated());
        s.unlock();
        assert!(s.is_migrated());
    }

    #[test]
    fn guard_unlocks_on_drop() {
        let s = BucketState::new();
        assert!(s.lock(10));
        {
            let _g = LockGuard::assume_locked(&s);
        }
        assert!(s.lock(10));
    }
}
