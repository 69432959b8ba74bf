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

//! `cachecore`: an in-memory document cache engine for a clustered
//! database server. Power-of-two hashed bucket tables migrate online
//! between sizes as load changes; two cache flavors sit on top
//! (`PlainCache` for a bare LRU, `TransactionalCache` for an LRU with
//! transaction-term-scoped banishing); a `Manager` arbitrates a global
//! byte budget across every registered cache and drives migration,
//! reclaim, and rebalancing from one background task.

#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod bucket;
mod cache;
mod config;
mod error;
mod hash;
pub mod logging;
mod manager;
mod metadata;
mod rng;
mod stats;
mod sync;
mod table;
mod value;

pub use crate::{
    cache::{CacheId, CacheKind, PlainCache, TransactionalCache},
    config::CacheConfig,
    error::{CacheErrorKind, CacheResult},
    hash::{Hasher, RawByteHasher, StructuredValueHasher},
    manager::{CacheHandle, CacheSnapshot, Manager, ManagerSnapshot},
    value::Finding,
};
