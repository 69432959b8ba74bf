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

//! Tunables for the cache engine, loaded the way the host server loads its
//! own configuration: a `serde`-derived struct with defaults, optionally
//! overridden from a YAML file, never failing loudly on a bad source.

use {
    serde::Deserialize,
    std::{fs, path::Path},
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// the manager's global byte budget
    pub global_budget_bytes: u64,
    pub table_min_log_size: u8,
    pub table_max_log_size: u8,
    pub table_grow_threshold: f32,
    pub table_shrink_threshold: f32,
    pub tries_fast: u32,
    pub tries_slow: u32,
    pub tries_guarantee: u32,
    /// fraction of the global budget above which the background worker
    /// starts reclaiming
    pub free_memory_high_water_mark: f32,
    pub rebalance_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            global_budget_bytes: 256 * 1024 * 1024,
            table_min_log_size: 8,
            table_max_log_size: 28,
            table_grow_threshold: 0.25,
            table_shrink_threshold: 0.04,
            tries_fast: 100,
            tries_slow: 10_000,
            tries_guarantee: 1_000_000,
            free_memory_high_water_mark: 0.9,
            rebalance_interval_ms: 2000,
        }
    }
}

impl CacheConfig {
    /// Loads configuration from `path` if given, falling back to defaults on
    /// any I/O or parse failure. Never panics, never exits the process: a
    /// library has no business doing either.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!(
                        "failed to parse cache config at {}: {e}; using defaults",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "failed to read cache config at {}: {e}; using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let cfg = CacheConfig::default();
        assert!(cfg.table_min_log_size < cfg.table_max_log_size);
        assert!(cfg.table_shrink_threshold < cfg.table_grow_threshold);
        assert!(cfg.tries_fast < cfg.tries_slow);
        assert!(cfg.tries_slow < cfg.tries_guarantee);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let cfg = CacheConfig::load(Some(Path::new("/nonexistent/path/cachecore.yaml")));
        assert_eq!(cfg, CacheConfig::default());
    }
}
