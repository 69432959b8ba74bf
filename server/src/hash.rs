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

//! Pluggable hashing for the cache engine. A bucket never cares what the
//! hash function is, only that `hash_key` is stable and that `same_key`
//! resolves collisions; that split is what `Hasher` captures.

/// A hash of `0` is reserved to mean "empty slot" inside a bucket, so every
/// implementation must substitute `1` when the natural hash value is `0`.
pub trait Hasher: Send + Sync + 'static {
    fn hash_key(&self, key: &[u8]) -> u32;
    fn same_key(&self, key: &[u8], other: &[u8]) -> bool {
        key == other
    }
}

#[inline(always)]
const fn never_zero(h: u32) -> u32 {
    if h == 0 {
        1
    } else {
        h
    }
}

/// Raw byte hasher: a seeded fast hash over an opaque byte string, in the
/// rotate-xor-multiply family (the same shape as the host project's
/// `HasherRawFx`). Used for plain binary document keys.
#[derive(Debug, Clone, Copy)]
pub struct RawByteHasher {
    seed: u32,
}

impl RawByteHasher {
    const ROTATE: u32 = 5;
    const PRIME32: u32 = 0x9E3779B9;

    pub const fn new(seed: u32) -> Self {
        Self { seed }
    }

    #[inline(always)]
    fn fasthash32(&self, key: &[u8]) -> u32 {
        let mut hash = self.seed ^ (key.len() as u32).wrapping_mul(Self::PRIME32);
        let mut chunks = key.chunks_exact(4);
        for chunk in &mut chunks {
            let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            hash = hash.rotate_left(Self::ROTATE) ^ word;
            hash = hash.wrapping_mul(Self::PRIME32);
        }
        let mut tail = [0u8; 4];
        for (i, b) in chunks.remainder().iter().enumerate() {
            tail[i] = *b;
        }
        if !chunks.remainder().is_empty() {
            let word = u32::from_ne_bytes(tail);
            hash = hash.rotate_left(Self::ROTATE) ^ word;
            hash = hash.wrapping_mul(Self::PRIME32);
        }
        hash ^= hash >> 15;
        hash = hash.wrapping_mul(0x85EBCA6B);
        hash ^= hash >> 13;
        hash
    }
}

impl Default for RawByteHasher {
    fn default() -> Self {
        Self::new(0xA5A5_5A5A)
    }
}

impl Hasher for RawByteHasher {
    fn hash_key(&self, key: &[u8]) -> u32 {
        never_zero(self.fasthash32(key))
    }
}

/// Structured-value hasher: normalizes a nested record (here: a byte
/// encoding of one) before hashing, using FNV-1a in the same shape as the
/// host project's `engine::hash::Fnv1A`. Trailing NUL padding, which a
/// structured encoder may emit to align fields, is stripped before hashing
/// so that two byte-distinct but logically-equal encodings still collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredValueHasher;

impl StructuredValueHasher {
    const OFFSET: u32 = 0x811C_9DC5;
    const PRIME: u32 = 0x0100_0193;

    fn normalize(key: &[u8]) -> &[u8] {
        let trimmed = key.len() - key.iter().rev().take_while(|b| **b == 0).count();
        &key[..trimmed]
    }

    fn fnv1a(key: &[u8]) -> u32 {
        let mut hash = Self::OFFSET;
        for byte in key {
            hash ^= *byte as u32;
            hash = hash.wrapping_mul(Self::PRIME);
        }
        hash
    }
}

impl Hasher for StructuredValueHasher {
    fn hash_key(&self, key: &[u8]) -> u32 {
        never_zero(Self::fnv1a(Self::normalize(key)))
    }
    fn same_key(&self, key: &[u8], other: &[u8]) -> bool {
        Self::normalize(key) == Self::normalize(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_byte_hash_never_zero() {
        let h = RawByteHasher::new(0);
        // a seed/key combination that would naturally fold to 0 must still
        // report 1
        assert_ne!(h.hash_key(b""), 0);
        for n in 0..2000u32 {
            assert_ne!(h.hash_key(&n.to_ne_bytes()), 0);
        }
    }

    #[test]
    fn raw_byte_hash_stable_and_sensitive() {
        let h = RawByteHasher::default();
        assert_eq!(h.hash_key(b"doc/1"), h.hash_key(b"doc/1"));
        assert_ne!(h.hash_key(b"doc/1"), h.hash_key(b"doc/2"));
    }

    #[test]
    fn structured_hasher_ignores_trailing_padding() {
        let h = StructuredValueHasher;
        assert_eq!(h.hash_key(b"record"), h.hash_key(b"record\0\0\0"));
        assert!(h.same_key(b"record", b"record\0\0"));
        assert!(!h.same_key(b"record", b"Record"));
    }

    #[test]
    fn structured_hash_never_zero() {
        let h = StructuredValueHasher;
        assert_ne!(h.hash_key(b""), 0);
    }
}
