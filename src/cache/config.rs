//! Cache configuration.
//!
//! Controls the memory and persistent tiers and the invalidation bus via the
//! `[cache]` section of `bizdash.toml`.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::Deserialize;
use time::Duration;

const DEFAULT_MEMORY_TTL_SECS: u64 = 300;
const DEFAULT_PERSISTENT_TTL_SECS: u64 = 1800;
const DEFAULT_MEMORY_CAPACITY: usize = 256;
const DEFAULT_BUS_CAPACITY: usize = 1024;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 256;
const DEFAULT_NAMESPACE: &str = "bizdash:";
const DEFAULT_STORAGE_DIR: &str = ".bizdash-cache";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the in-process memory tier.
    pub enable_memory_tier: bool,
    /// Enable the persistent tier.
    pub enable_persistent_tier: bool,
    /// Lifetime of memory-tier entries in seconds.
    pub memory_ttl_seconds: u64,
    /// Lifetime of persistent-tier entries in seconds.
    pub persistent_ttl_seconds: u64,
    /// Maximum entries held in memory before LRU eviction.
    pub memory_capacity: usize,
    /// Directory backing the file storage.
    pub storage_dir: PathBuf,
    /// Prefix applied to every persistent key.
    pub namespace: String,
    /// Maximum pending events on the bus; the oldest are dropped first.
    pub bus_capacity: usize,
    /// Maximum events merged into one consumption plan.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_memory_tier: true,
            enable_persistent_tier: true,
            memory_ttl_seconds: DEFAULT_MEMORY_TTL_SECS,
            persistent_ttl_seconds: DEFAULT_PERSISTENT_TTL_SECS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            namespace: DEFAULT_NAMESPACE.to_string(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl CacheConfig {
    /// Returns true if any cache tier is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enable_memory_tier || self.enable_persistent_tier
    }

    pub fn memory_ttl(&self) -> Duration {
        seconds(self.memory_ttl_seconds)
    }

    pub fn persistent_ttl(&self) -> Duration {
        seconds(self.persistent_ttl_seconds)
    }

    /// Memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Bus capacity, clamping to 1 if zero.
    pub fn bus_capacity_non_zero(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enable_memory_tier);
        assert!(config.enable_persistent_tier);
        assert_eq!(config.memory_ttl(), Duration::minutes(5));
        assert_eq!(config.persistent_ttl(), Duration::minutes(30));
        assert_eq!(config.memory_capacity, 256);
        assert_eq!(config.namespace, "bizdash:");
        assert_eq!(config.bus_capacity, 1024);
        assert_eq!(config.consume_batch_limit, 256);
    }

    #[test]
    fn is_enabled_when_memory_only() {
        let config = CacheConfig {
            enable_persistent_tier: false,
            ..Default::default()
        };
        assert!(config.is_enabled());
    }

    #[test]
    fn is_disabled_when_both_off() {
        let config = CacheConfig {
            enable_memory_tier: false,
            enable_persistent_tier: false,
            ..Default::default()
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn zero_capacities_clamp_to_one() {
        let config = CacheConfig {
            memory_capacity: 0,
            bus_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
        assert_eq!(config.bus_capacity_non_zero(), 1);
    }
}
