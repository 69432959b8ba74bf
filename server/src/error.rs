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

//! Error taxonomy for the cache engine. Kept as a plain `Copy` enum (no
//! `thiserror`/`anyhow`) so that hot cache paths never pay for boxed errors.

use core::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u8)]
pub enum CacheErrorKind {
    /// lookup missed; the normal miss path, never logged
    NotFound,
    /// bucket lock contention exceeded the caller's max_tries
    LockTimeout,
    /// all slots full and none evictable (every entry currently leased)
    BusyBucket,
    /// metadata refused an allocation delta; cache is at its soft limit
    ResourceLimit,
    /// transactional insert rejected: key is banished in the current term
    Conflict,
    /// terminal: no further cache operations will succeed
    ShuttingDown,
    /// static fact about the chosen cache flavor (e.g. banish on a plain cache)
    NotImplemented,
    /// invariant violation; aborts in debug builds
    Internal,
}

impl CacheErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::LockTimeout => "lock-timeout",
            Self::BusyBucket => "busy-bucket",
            Self::ResourceLimit => "resource-limit",
            Self::Conflict => "conflict",
            Self::ShuttingDown => "shutting-down",
            Self::NotImplemented => "not-implemented",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for CacheErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for CacheErrorKind {}

pub type CacheResult<T> = Result<T, CacheErrorKind>;
