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

//! Cache-line-sized buckets. A bucket is a tiny, fixed-capacity,
//! spinlock-guarded slot array; all mutation and observation requires the
//! lock, since contention on any one bucket is expected to be brief.
//!
//! Note on sizing: a native pointer is 8 bytes, so a literal 64-byte bucket
//! with 10 `(u32, *mut CachedValue)` slots does not fit in one cache line
//! on a 64-bit target the way it would with a narrower pointer width. The
//! capacities below keep the *slot counts* the original design calls for
//! (10 for plain, fewer for transactional once the banish fields are
//! accounted for) rather than chasing an exact byte count that a pointer
//! width the design didn't anticipate makes impossible.

use crate::{hash::Hasher, sync::BucketState, value::CachedValue};

pub const PLAIN_BUCKET_CAPACITY: usize = 10;
pub const TXN_BUCKET_CAPACITY: usize = 6;
pub const BANISH_SLOTS: usize = 4;

/// Shared bucket surface used by `Table`/`Cache` generically over the two
/// concrete bucket kinds.
pub trait Bucket: Default {
    fn lock(&self, max_tries: u32) -> bool;
    fn unlock(&self);
    fn state(&self) -> &BucketState;
    fn slots_used(&self) -> usize;
    fn capacity(&self) -> usize;

    /// Caller must hold the lock. Returns `false` (no-op) if full.
    fn insert(&mut self, hash: u32, value: *mut CachedValue) -> bool;
    /// Caller must hold the lock.
    fn find(&mut self, hash: u32, key: &[u8], hasher: &dyn Hasher) -> Option<*mut CachedValue>;
    /// Caller must hold the lock. Returns the removed pointer, if any.
    fn remove(&mut self, hash: u32, key: &[u8], hasher: &dyn Hasher) -> Option<*mut CachedValue>;
    /// Caller must hold the lock. Freeable candidate closest to the back.
    fn eviction_candidate(&self) -> Option<*mut CachedValue>;
    /// Caller must hold the lock. Removes a specific slot, closing the gap.
    fn evict(&mut self, value: *mut CachedValue) -> bool;
    /// Caller must hold the lock. All occupied `(hash, value)` pairs, for
    /// migration and accounting sweeps.
    fn occupied(&self) -> Vec<(u32, *mut CachedValue)>;
    /// Caller must hold the lock.
    fn clear(&mut self) -> Vec<*mut CachedValue>;

    /// The bucket's current banish term, or `0` for a bucket kind that has
    /// no banish concept at all (the plain bucket). Used by migration to
    /// compute the maximum term across a predecessor and its successors.
    fn banish_term_or_zero(&self) -> u64 {
        0
    }
    /// Applies `new_term` as this bucket's banish term if it is newer,
    /// clearing banish state in the process. No-op on a bucket kind with
    /// no banish concept.
    fn relay_banish_term(&mut self, _new_term: u64) {}
    /// True if the bucket-wide banished flag is set. Always `false` on a
    /// bucket kind with no banish concept.
    fn is_fully_banished(&self) -> bool {
        false
    }
    /// Sets the bucket-wide banished flag. No-op on a bucket kind with no
    /// banish concept.
    fn mark_fully_banished(&mut self) {}
}

/// Evicts the current candidate (if any), frees it, and returns the bytes
/// reclaimed. Shared by both bucket kinds and by the migration path.
pub fn evict_candidate<B: Bucket>(bucket: &mut B) -> usize {
    match bucket.eviction_candidate() {
        Some(ptr) => {
            let size = unsafe { CachedValue::size_bytes(ptr) };
            bucket.evict(ptr);
            unsafe { CachedValue::delete(ptr) };
            size
        }
        None => 0,
    }
}

macro_rules! impl_slot_ops {
    ($ty:ty, $cap:expr) => {
        impl $ty {
            /// Position of the first slot whose hash matches and whose
            /// hasher-level key comparison confirms the hit.
            fn find_slot(&self, hash: u32, key: &[u8], hasher: &dyn Hasher) -> Option<usize> {
                (0..self.slots_used as usize).find(|&i| {
                    self.hashes[i] == hash
                        && unsafe { CachedValue::same_key(self.values[i], key, hasher) }
                })
            }

            /// Shifts `[0, pos)` down by one and puts `value` at index 0,
            /// i.e. MRU-bump.
            fn promote(&mut self, pos: usize, hash: u32, value: *mut CachedValue) {
                for i in (1..=pos).rev() {
                    self.hashes[i] = self.hashes[i - 1];
                    self.values[i] = self.values[i - 1];
                }
                self.hashes[0] = hash;
                self.values[0] = value;
            }

            fn close_gap(&mut self, pos: usize) {
                let last = self.slots_used as usize - 1;
                if pos != last {
                    self.hashes[pos] = self.hashes[last];
                    self.values[pos] = self.values[last];
                }
                self.hashes[last] = 0;
                self.values[last] = core::ptr::null_mut();
                self.slots_used -= 1;
            }

            fn eviction_candidate_impl(&self) -> Option<(usize, *mut CachedValue)> {
                (0..self.slots_used as usize)
                    .rev()
                    .find(|&i| unsafe { CachedValue::is_freeable(self.values[i]) })
                    .map(|i| (i, self.values[i]))
            }
        }
    };
}

/// 64-bit-target layout: `{state, slots_used, hashes, values}`. The MRU
/// slot is always index 0; the LRU-back slot (index `slots_used - 1`) is
/// the first eviction candidate examined.
pub struct PlainBucket {
    state: BucketState,
    slots_used: u16,
    hashes: [u32; PLAIN_BUCKET_CAPACITY],
    values: [*mut CachedValue; PLAIN_BUCKET_CAPACITY],
}

impl Default for PlainBucket {
    fn default() -> Self {
        Self {
            state: BucketState::new(),
            slots_used: 0,
            hashes: [0; PLAIN_BUCKET_CAPACITY],
            values: [core::ptr::null_mut(); PLAIN_BUCKET_CAPACITY],
        }
    }
}

// SAFETY: all mutation/observation of the raw pointers is gated behind the
// bucket's own spinlock; the bucket itself carries no interior aliasing.
unsafe impl Send for PlainBucket {}
unsafe impl Sync for PlainBucket {}

impl_slot_ops!(PlainBucket, PLAIN_BUCKET_CAPACITY);

impl Bucket for PlainBucket {
    fn lock(&self, max_tries: u32) -> bool {
        self.state.lock(max_tries)
    }
    fn unlock(&self) {
        self.state.unlock()
    }
    fn state(&self) -> &BucketState {
        &self.state
    }
    fn slots_used(&self) -> usize {
        self.slots_used as usize
    }
    fn capacity(&self) -> usize {
        PLAIN_BUCKET_CAPACITY
    }

    fn insert(&mut self, hash: u32, value: *mut CachedValue) -> bool {
        if self.slots_used as usize == PLAIN_BUCKET_CAPACITY {
            return false;
        }
        let pos = self.slots_used as usize;
        self.hashes[pos] = hash;
        self.values[pos] = value;
        self.slots_used += 1;
        self.promote(pos, hash, value);
        true
    }

    fn find(&mut self, hash: u32, key: &[u8], hasher: &dyn Hasher) -> Option<*mut CachedValue> {
        let pos = self.find_slot(hash, key, hasher)?;
        let value = self.values[pos];
        self.promote(pos, hash, value);
        Some(value)
    }

    fn remove(&mut self, hash: u32, key: &[u8], hasher: &dyn Hasher) -> Option<*mut CachedValue> {
        let pos = self.find_slot(hash, key, hasher)?;
        let value = self.values[pos];
        self.close_gap(pos);
        Some(value)
    }

    fn eviction_candidate(&self) -> Option<*mut CachedValue> {
        self.eviction_candidate_impl().map(|(_, v)| v)
    }

    fn evict(&mut self, value: *mut CachedValue) -> bool {
        match (0..self.slots_used as usize).find(|&i| self.values[i] == value) {
            Some(pos) => {
                self.close_gap(pos);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) -> Vec<*mut CachedValue> {
        let drained = self.values[..self.slots_used as usize].to_vec();
        self.hashes = [0; PLAIN_BUCKET_CAPACITY];
        self.values = [core::ptr::null_mut(); PLAIN_BUCKET_CAPACITY];
        self.slots_used = 0;
        drained
    }

    fn occupied(&self) -> Vec<(u32, *mut CachedValue)> {
        (0..self.slots_used as usize)
            .map(|i| (self.hashes[i], self.values[i]))
            .collect()
    }
}

/// Plain-bucket-like slots plus a per-bucket banish set tied to a
/// monotonic transaction term.
pub struct TransactionalBucket {
    state: BucketState,
    slots_used: u16,
    hashes: [u32; TXN_BUCKET_CAPACITY],
    values: [*mut CachedValue; TXN_BUCKET_CAPACITY],
    banish_hashes: [u32; BANISH_SLOTS],
    banish_term: u64,
}

impl Default for TransactionalBucket {
    fn default() -> Self {
        Self {
            state: BucketState::new(),
            slots_used: 0,
            hashes: [0; TXN_BUCKET_CAPACITY],
            values: [core::ptr::null_mut(); TXN_BUCKET_CAPACITY],
            banish_hashes: [0; BANISH_SLOTS],
            banish_term: 0,
        }
    }
}

unsafe impl Send for TransactionalBucket {}
unsafe impl Sync for TransactionalBucket {}

impl_slot_ops!(TransactionalBucket, TXN_BUCKET_CAPACITY);

impl Bucket for TransactionalBucket {
    fn lock(&self, max_tries: u32) -> bool {
        self.state.lock(max_tries)
    }
    fn unlock(&self) {
        self.state.unlock()
    }
    fn state(&self) -> &BucketState {
        &self.state
    }
    fn slots_used(&self) -> usize {
        self.slots_used as usize
    }
    fn capacity(&self) -> usize {
        TXN_BUCKET_CAPACITY
    }

    fn insert(&mut self, hash: u32, value: *mut CachedValue) -> bool {
        if self.slots_used as usize == TXN_BUCKET_CAPACITY {
            return false;
        }
        let pos = self.slots_used as usize;
        self.hashes[pos] = hash;
        self.values[pos] = value;
        self.slots_used += 1;
        self.promote(pos, hash, value);
        true
    }

    fn find(&mut self, hash: u32, key: &[u8], hasher: &dyn Hasher) -> Option<*mut CachedValue> {
        let pos = self.find_slot(hash, key, hasher)?;
        let value = self.values[pos];
        self.promote(pos, hash, value);
        Some(value)
    }

    fn remove(&mut self, hash: u32, key: &[u8], hasher: &dyn Hasher) -> Option<*mut CachedValue> {
        let pos = self.find_slot(hash, key, hasher)?;
        let value = self.values[pos];
        self.close_gap(pos);
        Some(value)
    }

    fn eviction_candidate(&self) -> Option<*mut CachedValue> {
        self.eviction_candidate_impl().map(|(_, v)| v)
    }

    fn evict(&mut self, value: *mut CachedValue) -> bool {
        match (0..self.slots_used as usize).find(|&i| self.values[i] == value) {
            Some(pos) => {
                self.close_gap(pos);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) -> Vec<*mut CachedValue> {
        let drained = self.values[..self.slots_used as usize].to_vec();
        self.hashes = [0; TXN_BUCKET_CAPACITY];
        self.values = [core::ptr::null_mut(); TXN_BUCKET_CAPACITY];
        self.slots_used = 0;
        drained
    }

    fn occupied(&self) -> Vec<(u32, *mut CachedValue)> {
        (0..self.slots_used as usize)
            .map(|i| (self.hashes[i], self.values[i]))
            .collect()
    }

    fn banish_term_or_zero(&self) -> u64 {
        self.banish_term
    }

    fn relay_banish_term(&mut self, new_term: u64) {
        self.update_banish_term(new_term);
    }

    fn is_fully_banished(&self) -> bool {
        self.state.is_banished()
    }

    fn mark_fully_banished(&mut self) {
        self.state.set_banished();
    }
}

impl TransactionalBucket {
    pub fn banish_term(&self) -> u64 {
        self.banish_term
    }

    /// "An open transaction exists" iff `banish_term` is odd.
    pub fn transaction_open(&self) -> bool {
        self.banish_term % 2 == 1
    }

    /// Monotonic: a no-op unless `new_term > banish_term`, in which case it
    /// clears the banish flag and all banish hashes before bumping the
    /// term. Caller must hold the lock.
    pub fn update_banish_term(&mut self, new_term: u64) {
        if new_term > self.banish_term {
            self.state.clear_banished();
            self.banish_hashes = [0; BANISH_SLOTS];
            self.banish_term = new_term;
        }
    }

    /// True if the bucket-wide banished flag is set, `hash` appears among
    /// the banish hashes, or no transaction is currently open (banish has
    /// no meaning outside a transaction, so it reports false there).
    pub fn is_banished(&self, hash: u32) -> bool {
        if !self.transaction_open() {
            return false;
        }
        self.state.is_banished() || self.banish_hashes.contains(&hash)
    }

    /// Requires an open transaction. Removes a matching entry if present
    /// (caller is responsible for freeing it / accounting for it), then
    /// installs `hash` into the first empty banish slot; if all four are
    /// full, sets the bucket-wide banished flag instead.
    ///
    /// Caller must hold the lock.
    pub fn banish(
        &mut self,
        hash: u32,
        key: &[u8],
        hasher: &dyn Hasher,
    ) -> Option<*mut CachedValue> {
        debug_assert!(self.transaction_open());
        let removed = self.remove(hash, key, hasher);
        match self.banish_hashes.iter().position(|h| *h == 0) {
            Some(slot) => self.banish_hashes[slot] = hash,
            None => self.state.set_banished(),
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::RawByteHasher;

    fn h() -> RawByteHasher {
        RawByteHasher::default()
    }

    #[test]
    fn plain_insert_find_promotes_to_front() {
        let mut b = PlainBucket::default();
        let hasher = h();
        let v0 = CachedValue::construct(b"k0", b"v0");
        let v1 = CachedValue::construct(b"k1", b"v1");
        assert!(b.insert(hasher.hash_key(b"k0"), v0));
        assert!(b.insert(hasher.hash_key(b"k1"), v1));
        // k0 is now LRU-back; finding it should bump it back to front
        let found = b.find(hasher.hash_key(b"k0"), b"k0", &hasher).unwrap();
        assert_eq!(found, v0);
        assert_eq!(b.eviction_candidate(), Some(v1));
        unsafe {
            CachedValue::delete(v0);
            CachedValue::delete(v1);
        }
    }

    #[test]
    fn plain_bucket_refuses_insert_when_full() {
        let mut b = PlainBucket::default();
        let hasher = h();
        let mut ptrs = vec![];
        for i in 0..PLAIN_BUCKET_CAPACITY {
            let key = format!("k{i}");
            let p = CachedValue::construct(key.as_bytes(), b"v");
            assert!(b.insert(hasher.hash_key(key.as_bytes()), p));
            ptrs.push(p);
        }
        let overflow = CachedValue::construct(b"kx", b"v");
        assert!(!b.insert(hasher.hash_key(b"kx"), overflow));
        unsafe {
            for p in ptrs {
                CachedValue::delete(p);
            }
            CachedValue::delete(overflow);
        }
    }

    #[test]
    fn eviction_candidate_skips_leased_entries() {
        let mut b = PlainBucket::default();
        let hasher = h();
        let v0 = CachedValue::construct(b"k0", b"v0");
        let v1 = CachedValue::construct(b"k1", b"v1");
        b.insert(hasher.hash_key(b"k0"), v0);
        b.insert(hasher.hash_key(b"k1"), v1);
        unsafe { CachedValue::lease(v0) }; // v0 is now at the back, leased
        assert_eq!(b.eviction_candidate(), Some(v1));
        unsafe {
            CachedValue::release(v0);
            CachedValue::delete(v0);
            CachedValue::delete(v1);
        }
    }

    #[test]
    fn transactional_banish_blocks_until_term_advances() {
        let mut b = TransactionalBucket::default();
        let hasher = h();
        b.update_banish_term(1); // open transaction
        assert!(b.transaction_open());
        let hash = hasher.hash_key(b"doc/7");
        assert!(b.banish(hash, b"doc/7", &hasher).is_none());
        assert!(b.is_banished(hash));
        b.update_banish_term(2); // transaction ends
        assert!(!b.transaction_open());
        assert!(!b.is_banished(hash));
    }

    #[test]
    fn transactional_bucket_banishes_fully_after_four_keys() {
        let mut b = TransactionalBucket::default();
        let hasher = h();
        b.update_banish_term(1);
        for i in 0..BANISH_SLOTS {
            let key = format!("k{i}");
            b.banish(hasher.hash_key(key.as_bytes()), key.as_bytes(), &hasher);
        }
        assert!(!b.state.is_banished());
        b.banish(hasher.hash_key(b"overflow"), b"overflow", &hasher);
        assert!(b.state.is_banished());
        assert!(b.is_banished(hasher.hash_key(b"anything-at-all")));
    }
}
