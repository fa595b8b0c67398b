//! Cache storage implementations.
//!
//! Memory tier: bounded LRU map local to this session.
//! Persistent tier: JSON records in shared key-value storage.
//!
//! Both tiers expire entries lazily: an entry is never returned at or past its
//! `expires_at` and is dropped when a read finds it expired.

use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::clock::Clock;
use super::config::CacheConfig;
use super::keys::{CacheKey, QueryKind};
use super::lock::{rw_read, rw_write};
use super::storage::{KeyValueStorage, StorageError};

const SOURCE: &str = "cache::store";

const METRIC_MEMORY_HIT: &str = "bizdash_cache_memory_hit_total";
const METRIC_MEMORY_MISS: &str = "bizdash_cache_memory_miss_total";
const METRIC_MEMORY_EVICT: &str = "bizdash_cache_memory_evict_total";
const METRIC_PERSISTENT_HIT: &str = "bizdash_cache_persistent_hit_total";
const METRIC_PERSISTENT_MISS: &str = "bizdash_cache_persistent_miss_total";
const METRIC_PERSISTENT_WRITE_ERROR: &str = "bizdash_cache_persistent_write_error_total";
const METRIC_INVALIDATED: &str = "bizdash_cache_invalidated_total";

/// A cached value with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl CacheEntry {
    pub fn new(key: CacheKey, value: Value, expires_at: OffsetDateTime) -> Self {
        Self {
            key,
            value,
            expires_at,
        }
    }

    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

// ============================================================================
// Memory tier
// ============================================================================

pub struct MemoryTier {
    entries: RwLock<LruCache<CacheKey, CacheEntry>>,
}

impl MemoryTier {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CacheEntry> {
        let mut entries = rw_write(&self.entries, SOURCE, "memory_get");
        let expired = match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Insert an entry, returning the key evicted to make room, if any.
    pub fn set(&self, entry: CacheEntry) -> Option<CacheKey> {
        let key = entry.key.clone();
        rw_write(&self.entries, SOURCE, "memory_set")
            .push(key.clone(), entry)
            .and_then(|(previous, _)| (previous != key).then_some(previous))
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        rw_write(&self.entries, SOURCE, "memory_remove")
            .pop(key)
            .is_some()
    }

    pub fn remove_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "memory_remove_where");
        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "memory_purge_expired");
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "memory_clear");
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "memory_len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Persistent tier
// ============================================================================

pub struct PersistentTier {
    storage: Arc<dyn KeyValueStorage>,
    namespace: String,
}

enum Stored {
    Fresh(CacheEntry),
    Stale,
    Missing,
}

impl PersistentTier {
    pub fn new(storage: Arc<dyn KeyValueStorage>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
        }
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.namespace, key)
    }

    fn load(&self, key: &CacheKey, now: OffsetDateTime) -> Stored {
        let raw = match self.storage.get(&self.storage_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Stored::Missing,
            Err(err) => {
                warn!(cache_key = %key, error = %err, "Persistent cache read failed");
                return Stored::Missing;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.key == *key && entry.is_fresh(now) => Stored::Fresh(entry),
            Ok(_) => Stored::Stale,
            Err(err) => {
                warn!(cache_key = %key, error = %err, "Discarding unreadable persistent cache entry");
                Stored::Stale
            }
        }
    }

    pub fn get(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CacheEntry> {
        match self.load(key, now) {
            Stored::Fresh(entry) => Some(entry),
            Stored::Stale => {
                self.remove_logged(key);
                None
            }
            Stored::Missing => None,
        }
    }

    pub fn set(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let raw = serde_json::to_string(entry)?;
        self.storage.set(&self.storage_key(&entry.key), &raw)
    }

    pub fn remove(&self, key: &CacheKey) -> Result<(), StorageError> {
        self.storage.remove(&self.storage_key(key))
    }

    fn remove_logged(&self, key: &CacheKey) -> bool {
        match self.remove(key) {
            Ok(()) => true,
            Err(err) => {
                warn!(cache_key = %key, error = %err, "Failed to remove persistent cache entry");
                false
            }
        }
    }

    /// Keys in this tier's namespace. Foreign keys in shared storage are skipped.
    pub fn keys(&self) -> Result<Vec<CacheKey>, StorageError> {
        Ok(self
            .storage
            .keys()?
            .into_iter()
            .filter_map(|raw| {
                raw.strip_prefix(self.namespace.as_str())
                    .map(CacheKey::from_raw)
            })
            .collect())
    }

    fn keys_logged(&self, op: &'static str) -> Vec<CacheKey> {
        self.keys().unwrap_or_else(|err| {
            warn!(op, error = %err, "Failed to enumerate persistent cache keys");
            Vec::new()
        })
    }

    pub fn remove_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        self.keys_logged("remove_where")
            .into_iter()
            .filter(|key| predicate(key))
            .filter(|key| self.remove_logged(key))
            .count()
    }

    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        self.keys_logged("purge_expired")
            .into_iter()
            .filter(|key| matches!(self.load(key, now), Stored::Stale))
            .filter(|key| self.remove_logged(key))
            .count()
    }
}

// ============================================================================
// Two-tier store
// ============================================================================

/// Memory tier in front of a persistent tier, each with its own TTL.
///
/// The store is a pure optimization over idempotent reads: skipping it
/// entirely changes timing, never results.
pub struct TwoTierStore {
    config: CacheConfig,
    memory: MemoryTier,
    persistent: PersistentTier,
    clock: Arc<dyn Clock>,
}

impl TwoTierStore {
    pub fn new(
        config: &CacheConfig,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: config.clone(),
            memory: MemoryTier::new(config.memory_capacity_non_zero()),
            persistent: PersistentTier::new(storage, config.namespace.clone()),
            clock,
        }
    }

    fn lookup_memory(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CacheEntry> {
        if !self.config.enable_memory_tier {
            return None;
        }
        let hit = self.memory.get(key, now);
        if hit.is_some() {
            counter!(METRIC_MEMORY_HIT).increment(1);
        } else {
            counter!(METRIC_MEMORY_MISS).increment(1);
        }
        hit
    }

    fn lookup_persistent(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CacheEntry> {
        if !self.config.enable_persistent_tier {
            return None;
        }
        let hit = self.persistent.get(key, now);
        if hit.is_some() {
            counter!(METRIC_PERSISTENT_HIT).increment(1);
        } else {
            counter!(METRIC_PERSISTENT_MISS).increment(1);
        }
        hit
    }

    fn store_memory(&self, entry: CacheEntry) {
        if !self.config.enable_memory_tier {
            return;
        }
        if let Some(evicted) = self.memory.set(entry) {
            counter!(METRIC_MEMORY_EVICT).increment(1);
            debug!(cache_key = %evicted, "Evicted memory cache entry");
        }
    }

    /// `None` when `now + ttl` is not representable; the write is skipped.
    fn expiry_after(&self, key: &CacheKey, ttl: Duration) -> Option<OffsetDateTime> {
        let expires_at = self.clock.now().checked_add(ttl);
        if expires_at.is_none() {
            warn!(
                cache_key = %key,
                ttl_seconds = ttl.whole_seconds(),
                "Cache TTL out of range, entry not stored"
            );
        }
        expires_at
    }

    pub fn get_memory(&self, key: &CacheKey) -> Option<Value> {
        self.lookup_memory(key, self.clock.now())
            .map(|entry| entry.value)
    }

    pub fn set_memory(&self, key: &CacheKey, value: Value, ttl: Duration) {
        let Some(expires_at) = self.expiry_after(key, ttl) else {
            return;
        };
        self.store_memory(CacheEntry::new(key.clone(), value, expires_at));
    }

    pub fn get_persistent(&self, key: &CacheKey) -> Option<Value> {
        self.lookup_persistent(key, self.clock.now())
            .map(|entry| entry.value)
    }

    pub fn set_persistent(
        &self,
        key: &CacheKey,
        value: Value,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        if !self.config.enable_persistent_tier {
            return Ok(());
        }
        let Some(expires_at) = self.expiry_after(key, ttl) else {
            return Ok(());
        };
        self.persistent
            .set(&CacheEntry::new(key.clone(), value, expires_at))
    }

    /// Read memory first, then persistent storage.
    ///
    /// A persistent hit is promoted into memory. The promoted entry keeps the
    /// earlier of its stored expiry and the memory TTL.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = self.clock.now();
        if let Some(entry) = self.lookup_memory(key, now) {
            debug!(cache_key = %key, tier = "memory", "Cache hit");
            return Some(entry.value);
        }

        let entry = self.lookup_persistent(key, now)?;
        debug!(cache_key = %key, tier = "persistent", "Cache hit");

        let promoted_expiry = now
            .checked_add(self.config.memory_ttl())
            .map_or(entry.expires_at, |limit| entry.expires_at.min(limit));
        let value = entry.value.clone();
        self.store_memory(CacheEntry::new(entry.key, entry.value, promoted_expiry));
        Some(value)
    }

    /// Populate both tiers with their configured TTLs.
    ///
    /// A persistent write failure is logged; the memory tier is still
    /// populated.
    pub fn set(&self, key: &CacheKey, value: Value) {
        if let Err(err) = self.set_persistent(key, value.clone(), self.config.persistent_ttl()) {
            counter!(METRIC_PERSISTENT_WRITE_ERROR).increment(1);
            warn!(cache_key = %key, error = %err, "Persistent cache write failed");
        }
        self.set_memory(key, value, self.config.memory_ttl());
    }

    pub fn remove(&self, key: &CacheKey) {
        self.memory.remove(key);
        self.persistent.remove_logged(key);
    }

    /// Drop every entry derived from the given query kinds, in both tiers.
    ///
    /// Returns the number of entries removed across tiers.
    pub fn invalidate_kinds(&self, kinds: &[QueryKind]) -> usize {
        if kinds.is_empty() {
            return 0;
        }
        let matches = |key: &CacheKey| kinds.iter().any(|kind| key.belongs_to(*kind));
        let removed = self.memory.remove_where(matches) + self.persistent.remove_where(matches);
        counter!(METRIC_INVALIDATED).increment(removed as u64);
        debug!(kinds = ?kinds, removed, "Invalidated cache entries");
        removed
    }

    /// Drop every entry in this store's namespace.
    pub fn clear(&self) -> usize {
        let removed = self.memory.clear() + self.persistent.remove_where(|_| true);
        counter!(METRIC_INVALIDATED).increment(removed as u64);
        debug!(removed, "Cleared cache");
        removed
    }

    /// Sweep expired entries from both tiers.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.memory.purge_expired(now) + self.persistent.purge_expired(now)
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn persistent_keys(&self) -> Result<Vec<CacheKey>, StorageError> {
        self.persistent.keys()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::keys::QueryParams;
    use crate::cache::storage::MemoryStorage;

    fn key(kind: QueryKind, year: i32) -> CacheKey {
        CacheKey::for_query(kind, &QueryParams::new().with("year", year))
    }

    fn store_with(config: CacheConfig) -> (TwoTierStore, Arc<ManualClock>, MemoryStorage) {
        let clock = Arc::new(ManualClock::default());
        let storage = MemoryStorage::new();
        let store = TwoTierStore::new(&config, Arc::new(storage.clone()), clock.clone());
        (store, clock, storage)
    }

    fn store() -> (TwoTierStore, Arc<ManualClock>, MemoryStorage) {
        store_with(CacheConfig::default())
    }

    #[test]
    fn memory_roundtrip_respects_ttl() {
        let (store, clock, _) = store();
        let k = key(QueryKind::DashboardStats, 2024);

        store.set_memory(&k, json!({"orders": 3}), Duration::seconds(60));
        assert_eq!(store.get_memory(&k), Some(json!({"orders": 3})));

        clock.advance(Duration::seconds(59));
        assert!(store.get_memory(&k).is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get_memory(&k).is_none());
        assert_eq!(store.memory_len(), 0, "expired entry dropped on read");
    }

    #[test]
    fn persistent_roundtrip_respects_ttl() {
        let (store, clock, storage) = store();
        let k = key(QueryKind::TopClients, 2024);

        store
            .set_persistent(&k, json!([1, 2]), Duration::seconds(10))
            .expect("persist");
        assert_eq!(store.get_persistent(&k), Some(json!([1, 2])));

        clock.advance(Duration::seconds(10));
        assert!(store.get_persistent(&k).is_none());
        assert!(storage.is_empty(), "expired record removed on read");
    }

    #[test]
    fn unrepresentable_expiry_skips_the_write() {
        let config = CacheConfig {
            memory_ttl_seconds: u64::MAX,
            persistent_ttl_seconds: 1_000_000_000_000,
            ..CacheConfig::default()
        };
        let (store, _, storage) = store_with(config);
        let k = key(QueryKind::DashboardStats, 2024);

        store.set(&k, json!({"orders": 1}));

        assert!(store.get(&k).is_none());
        assert_eq!(store.memory_len(), 0);
        assert!(storage.is_empty());
    }

    #[test]
    fn persistent_hit_is_promoted_to_memory() {
        let (store, _, _) = store();
        let k = key(QueryKind::DashboardStats, 2024);

        store
            .set_persistent(&k, json!("v"), Duration::minutes(10))
            .expect("persist");
        assert!(store.get_memory(&k).is_none());

        assert_eq!(store.get(&k), Some(json!("v")));
        assert_eq!(store.get_memory(&k), Some(json!("v")));
    }

    #[test]
    fn promotion_never_outlives_persistent_expiry() {
        let (store, clock, _) = store();
        let k = key(QueryKind::DashboardStats, 2024);

        store
            .set_persistent(&k, json!(1), Duration::seconds(30))
            .expect("persist");
        assert!(store.get(&k).is_some());

        clock.advance(Duration::seconds(30));
        assert!(store.get_memory(&k).is_none());
        assert!(store.get(&k).is_none());
    }

    #[test]
    fn set_populates_both_tiers() {
        let (store, _, storage) = store();
        let k = key(QueryKind::OrdersList, 2024);

        store.set(&k, json!({"page": 1}));

        assert!(store.get_memory(&k).is_some());
        assert!(store.get_persistent(&k).is_some());
        assert_eq!(
            storage.keys().expect("keys"),
            vec![format!("bizdash:{k}")]
        );
    }

    #[test]
    fn persistent_write_failure_still_populates_memory() {
        let clock = Arc::new(ManualClock::default());
        let storage = MemoryStorage::with_quota(4);
        let store = TwoTierStore::new(&CacheConfig::default(), Arc::new(storage.clone()), clock);
        let k = key(QueryKind::DashboardStats, 2024);

        store.set(&k, json!({"large": "value that will not fit"}));

        assert!(storage.is_empty());
        assert_eq!(
            store.get(&k),
            Some(json!({"large": "value that will not fit"}))
        );
    }

    #[test]
    fn unreadable_persistent_record_is_a_miss() {
        let (store, _, storage) = store();
        let k = key(QueryKind::DashboardStats, 2024);
        storage
            .set(&format!("bizdash:{k}"), "{not json")
            .expect("seed");

        assert!(store.get(&k).is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn invalidate_kinds_leaves_other_kinds() {
        let (store, _, _) = store();
        let stats = key(QueryKind::DashboardStats, 2024);
        let clients = key(QueryKind::TopClients, 2024);
        let orders = key(QueryKind::OrdersList, 2024);
        for k in [&stats, &clients, &orders] {
            store.set(k, json!(true));
        }

        let removed = store.invalidate_kinds(&[QueryKind::DashboardStats, QueryKind::TopClients]);

        assert_eq!(removed, 4);
        assert!(store.get(&stats).is_none());
        assert!(store.get(&clients).is_none());
        assert_eq!(store.get(&orders), Some(json!(true)));
    }

    #[test]
    fn clear_ignores_foreign_keys_in_shared_storage() {
        let (store, _, storage) = store();
        storage.set("theme", "dark").expect("seed");
        store.set(&key(QueryKind::OrdersList, 2023), json!(1));

        store.clear();

        assert_eq!(storage.keys().expect("keys"), vec!["theme".to_string()]);
        assert_eq!(store.memory_len(), 0);
    }

    #[test]
    fn purge_expired_keeps_fresh_entries() {
        let (store, clock, storage) = store();
        let old = key(QueryKind::OrdersList, 2022);
        let fresh = key(QueryKind::OrdersList, 2023);

        store
            .set_persistent(&old, json!(1), Duration::seconds(5))
            .expect("persist");
        store
            .set_persistent(&fresh, json!(2), Duration::minutes(5))
            .expect("persist");
        clock.advance(Duration::seconds(6));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(storage.len(), 1);
        assert_eq!(store.get_persistent(&fresh), Some(json!(2)));
    }

    #[test]
    fn disabled_tiers_always_miss() {
        let (store, _, storage) = store_with(CacheConfig {
            enable_memory_tier: false,
            enable_persistent_tier: false,
            ..Default::default()
        });
        let k = key(QueryKind::DashboardStats, 2024);

        store.set(&k, json!(1));

        assert!(store.get(&k).is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn memory_tier_evicts_least_recently_used() {
        let (store, _, _) = store_with(CacheConfig {
            memory_capacity: 2,
            enable_persistent_tier: false,
            ..Default::default()
        });
        let a = key(QueryKind::OrdersList, 1);
        let b = key(QueryKind::OrdersList, 2);
        let c = key(QueryKind::OrdersList, 3);

        store.set(&a, json!("a"));
        store.set(&b, json!("b"));
        assert!(store.get(&a).is_some());
        store.set(&c, json!("c"));

        assert!(store.get(&a).is_some());
        assert!(store.get(&b).is_none());
        assert!(store.get(&c).is_some());
    }
}
