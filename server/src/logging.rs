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

//! Thin `env_logger` init, matching the host server's own approach: a
//! library does not choose a global logger for its embedder, it only
//! offers a convenience initializer the embedder may call.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes `env_logger` from the `CACHECORE_LOG` environment variable,
/// defaulting to `info`. Safe to call more than once; only the first call
/// takes effect. An embedding process that already runs its own logger
/// should skip this and let its own init own the global logger instead.
pub fn init() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().filter_or("CACHECORE_LOG", "info"))
            .init();
    });
}
