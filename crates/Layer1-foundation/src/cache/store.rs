//! Cache store - TTL 기반 키/값 캐시
//!
//! Cache entries are entities of an [`EntityStore`], so they share its
//! snapshot persistence. Lookups go through a `key -> id` index rebuilt from
//! the snapshot at startup.
//!
//! ## Expiration
//!
//! Two paths remove stale entries and both are required:
//! - lazy: [`CacheStore::get_cached`] deletes an expired entry it finds
//! - sweep: [`CacheStore::clear_expired`] removes every stale entry at once
//!
//! ## Concurrency
//!
//! Each operation runs under the cache's index mutex (index first, then the
//! table), so a lookup-then-evict or lookup-then-write is atomic with respect
//! to other tasks. Concurrent misses on the same key are not coalesced: both
//! callers compute, both write, the last write wins.

use super::config::CacheSettings;
use super::entry::{CacheEntry, CacheEntryData, CacheEntryPatch};
use super::keys::{self, CacheDomain, KeyPart};
use crate::clock::{system_clock, SharedClock};
use crate::config::StoreConfig;
use crate::storage::{EntityId, EntityStore, Repository};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Point-in-time cache classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub valid_entries: usize,
    /// Serialized size of all entries (bytes)
    pub approximate_size_bytes: usize,
}

/// Expiring key/value store over an entity store
pub struct CacheStore {
    entries: EntityStore<CacheEntryData>,
    index: Mutex<HashMap<String, EntityId>>,
    settings: CacheSettings,
}

impl CacheStore {
    /// Open the cache described by `settings`
    pub fn from_settings(settings: CacheSettings) -> Self {
        let config = settings.store_config();
        Self::with_clock(config, settings, system_clock())
    }

    pub fn open(config: StoreConfig, settings: CacheSettings) -> Self {
        Self::with_clock(config, settings, system_clock())
    }

    /// Memory-only cache with default settings
    pub fn in_memory() -> Self {
        let settings = CacheSettings::default();
        Self::open(StoreConfig::memory_only(&settings.store_name), settings)
    }

    pub fn with_clock(config: StoreConfig, settings: CacheSettings, clock: SharedClock) -> Self {
        let entries = EntityStore::with_clock(config, clock);
        let index = build_index(&entries);

        Self {
            entries,
            index: Mutex::new(index),
            settings,
        }
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    /// Live value for `key`; an expired entry is deleted and reported absent
    pub fn get_cached(&self, key: &str) -> Option<Value> {
        let mut index = self.lock_index();
        let id = index.get(key)?.clone();

        let Some(entry) = self.entries.get(&id) else {
            index.remove(key);
            return None;
        };

        if entry.data.is_expired_at(self.entries.now()) {
            self.entries.remove(&id);
            index.remove(key);
            debug!(key = %key, "Cache entry expired on read");
            return None;
        }

        Some(entry.data.value)
    }

    /// Write `value` with `expires_at = now + ttl_minutes`
    ///
    /// An existing entry for `key` is refreshed in place (same entity id).
    /// Negative TTLs count as zero.
    pub fn set_cache(&self, key: &str, value: Value, ttl_minutes: i64) {
        let ttl_minutes = ttl_minutes.max(0);
        let expires_at = expiry(self.entries.now(), ttl_minutes);

        let mut index = self.lock_index();
        if let Some(id) = index.get(key).cloned() {
            let patch = CacheEntryPatch {
                value: Some(value.clone()),
                expires_at: Some(expires_at),
                ttl_minutes: Some(ttl_minutes),
            };
            match self.entries.update(&id, patch) {
                Ok(_) => {
                    debug!(key = %key, ttl_minutes, "Cache entry refreshed");
                    return;
                }
                Err(e) => warn!(key = %key, error = %e, "Indexed cache entry missing, recreating"),
            }
        }

        let created = self.entries.add(CacheEntryData {
            key: key.to_string(),
            value,
            expires_at,
            ttl_minutes,
        });
        match created {
            Ok(entry) => {
                index.insert(key.to_string(), entry.id);
                debug!(key = %key, ttl_minutes, "Cache entry created");
            }
            Err(e) => error!(key = %key, error = %e, "Cache entry rejected"),
        }
    }

    /// Remove the entry for `key`, if any
    pub fn delete_cache(&self, key: &str) {
        let mut index = self.lock_index();
        if let Some(id) = index.remove(key) {
            self.entries.remove(&id);
            debug!(key = %key, "Cache entry deleted");
        }
    }

    /// Remove every entry already past its expiry; returns how many
    pub fn clear_expired(&self) -> usize {
        let mut index = self.lock_index();
        let now = self.entries.now();

        let removed = self.entries.remove_where(|e| e.data.is_expired_at(now));
        for entry in &removed {
            if index.get(&entry.data.key) == Some(&entry.id) {
                index.remove(&entry.data.key);
            }
        }

        if !removed.is_empty() {
            info!(removed = removed.len(), "Expired cache entries cleared");
        }
        removed.len()
    }

    /// Classify every entry against now; no eviction
    pub fn get_cache_stats(&self) -> CacheStats {
        let now = self.entries.now();
        let all = self.entries.get_all();

        let expired_entries = all.iter().filter(|e| e.data.is_expired_at(now)).count();
        let approximate_size_bytes = serde_json::to_vec(&all).map(|b| b.len()).unwrap_or(0);

        CacheStats {
            total_entries: all.len(),
            expired_entries,
            valid_entries: all.len() - expired_entries,
            approximate_size_bytes,
        }
    }

    /// Deterministic key from a prefix and primitive parts
    pub fn generate_key(prefix: &str, parts: &[KeyPart]) -> String {
        keys::generate_key(prefix, parts)
    }

    // ========================================================================
    // Convenience
    // ========================================================================

    /// Write with the domain's configured default TTL
    pub fn set_cache_for(&self, domain: CacheDomain, key: &str, value: Value) {
        self.set_cache(key, value, self.settings.ttl_minutes(domain));
    }

    /// Typed read; a payload of the wrong shape counts as a miss
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_cached(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub fn set_typed<T: Serialize>(&self, key: &str, value: &T, ttl_minutes: i64) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_cache(key, value, ttl_minutes);
        Ok(())
    }

    /// Read-through: on a miss run `compute` and cache its result
    ///
    /// Errors from `compute` are returned and nothing is cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl_minutes: i64,
        compute: F,
    ) -> std::result::Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
    {
        if let Some(hit) = self.get_cached(key) {
            return Ok(hit);
        }

        let value = compute().await?;
        self.set_cache(key, value.clone(), ttl_minutes);
        Ok(value)
    }

    /// Full entry for `key`, expired or not; no eviction
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let index = self.lock_index();
        let id = index.get(key)?;
        self.entries.get(id)
    }

    /// Whether a live entry exists; no eviction
    pub fn contains(&self, key: &str) -> bool {
        let now = self.entries.now();
        self.get_entry(key)
            .map(|e| !e.data.is_expired_at(now))
            .unwrap_or(false)
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        self.entries.get_all()
    }

    /// Remove everything; returns how many entries were dropped
    pub fn clear(&self) -> usize {
        let mut index = self.lock_index();
        let removed = self.entries.remove_where(|_| true);
        index.clear();
        removed.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.entries.snapshot_path()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.entries.now()
    }

    pub async fn flush(&self) -> Result<()> {
        self.entries.flush().await
    }

    fn lock_index(&self) -> MutexGuard<'_, HashMap<String, EntityId>> {
        self.index.lock().unwrap_or_else(|e| {
            warn!("Cache index lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries)
            .finish()
    }
}

/// `now + ttl`, saturating at the latest representable instant
fn expiry(now: DateTime<Utc>, ttl_minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(ttl_minutes)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Rebuild `key -> id`; duplicate keys keep the latest expiry
fn build_index(entries: &EntityStore<CacheEntryData>) -> HashMap<String, EntityId> {
    let mut index: HashMap<String, CacheEntry> = HashMap::new();
    let mut duplicates = Vec::new();

    for entry in entries.get_all() {
        match index.get(&entry.data.key) {
            Some(existing) if existing.data.expires_at >= entry.data.expires_at => {
                duplicates.push(entry.id);
            }
            Some(existing) => {
                duplicates.push(existing.id.clone());
                index.insert(entry.data.key.clone(), entry);
            }
            None => {
                index.insert(entry.data.key.clone(), entry);
            }
        }
    }

    if !duplicates.is_empty() {
        warn!(count = duplicates.len(), "Dropping duplicate cache keys from snapshot");
        entries.remove_where(|e| duplicates.contains(&e.id));
    }

    index.into_iter().map(|(key, entry)| (key, entry.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::Error;
    use chrono::TimeZone;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn cache_with_clock() -> (CacheStore, ManualClock) {
        let clock = ManualClock::new(start());
        let cache = CacheStore::with_clock(
            StoreConfig::memory_only("cache"),
            CacheSettings::default(),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn test_geocode_scenario() {
        let (cache, clock) = cache_with_clock();
        let coords = json!({"lat": 40.7128, "lng": -74.006});

        cache.set_cache("geocode:new york", coords.clone(), 1440);
        assert_eq!(cache.get_cached("geocode:new york"), Some(coords));

        clock.advance(Duration::minutes(1441));
        assert_eq!(cache.get_cached("geocode:new york"), None);
    }

    #[test]
    fn test_reads_within_ttl_do_not_touch_expiry() {
        let (cache, _clock) = cache_with_clock();
        cache.set_cache("k", json!("v"), 60);
        let before = cache.get_entry("k").unwrap();

        assert_eq!(cache.get_cached("k"), Some(json!("v")));
        assert_eq!(cache.get_cached("k"), Some(json!("v")));

        let after = cache.get_entry("k").unwrap();
        assert_eq!(after.data.expires_at, before.data.expires_at);
        assert_eq!(after.data.expires_at, start() + Duration::minutes(60));
    }

    #[test]
    fn test_expired_read_evicts_entity() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("k", json!(1), 0);
        clock.advance(Duration::seconds(1));

        assert_eq!(cache.get_cached("k"), None);
        assert!(cache.get_entry("k").is_none());
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn test_entry_at_exact_expiry_is_live() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("k", json!(1), 10);
        clock.advance(Duration::minutes(10));
        assert_eq!(cache.get_cached("k"), Some(json!(1)));
    }

    #[test]
    fn test_overwrite_keeps_identity() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("k", json!("old"), 5);
        let first = cache.get_entry("k").unwrap();

        clock.advance(Duration::minutes(1));
        cache.set_cache("k", json!("new"), 30);
        let second = cache.get_entry("k").unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.data.value, json!("new"));
        assert_eq!(second.data.ttl_minutes, 30);
        assert_eq!(second.data.expires_at, start() + Duration::minutes(31));
    }

    #[test]
    fn test_rewrite_after_expiry_revives_key() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("k", json!(1), 1);
        clock.advance(Duration::minutes(2));
        cache.set_cache("k", json!(2), 1);
        assert_eq!(cache.get_cached("k"), Some(json!(2)));
    }

    #[test]
    fn test_negative_ttl_is_immediately_stale() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("k", json!(1), -5);
        assert_eq!(cache.get_entry("k").unwrap().data.ttl_minutes, 0);
        clock.advance(Duration::milliseconds(1));
        assert_eq!(cache.get_cached("k"), None);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let (cache, _clock) = cache_with_clock();
        cache.set_cache("k", json!(1), i64::MAX);
        assert_eq!(cache.get_cached("k"), Some(json!(1)));
    }

    #[test]
    fn test_delete_cache() {
        let (cache, _clock) = cache_with_clock();
        cache.set_cache("k", json!(1), 60);

        cache.delete_cache("k");
        cache.delete_cache("k");
        cache.delete_cache("never");

        assert_eq!(cache.get_cached("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_expired_removes_only_stale() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("short-1", json!(1), 1);
        cache.set_cache("short-2", json!(2), 2);
        cache.set_cache("long", json!(3), 60);

        clock.advance(Duration::minutes(5));

        assert_eq!(cache.clear_expired(), 2);
        assert_eq!(cache.clear_expired(), 0);
        assert_eq!(cache.get_cached("long"), Some(json!(3)));
        assert!(cache.get_entry("short-1").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats_are_read_only() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("a", json!(1), 1);
        cache.set_cache("b", json!(2), 60);
        clock.advance(Duration::minutes(2));

        let first = cache.get_cache_stats();
        let second = cache.get_cache_stats();

        assert_eq!(first, second);
        assert_eq!(first.total_entries, 2);
        assert_eq!(first.expired_entries, 1);
        assert_eq!(first.valid_entries, 1);
        assert!(first.approximate_size_bytes > 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_empty_stats() {
        let cache = CacheStore::in_memory();
        let stats = cache.get_cache_stats();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.valid_entries, 0);
    }

    #[test]
    fn test_set_cache_for_uses_domain_ttl() {
        let (cache, _clock) = cache_with_clock();
        cache.set_cache_for(CacheDomain::Weather, "weather:x", json!(1));
        let entry = cache.get_entry("weather:x").unwrap();
        assert_eq!(entry.data.ttl_minutes, 60);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Coords {
        lat: f64,
        lng: f64,
    }

    #[test]
    fn test_typed_round_trip() {
        let (cache, _clock) = cache_with_clock();
        let coords = Coords {
            lat: 48.8566,
            lng: 2.3522,
        };
        cache.set_typed("geocode:paris", &coords, 60).unwrap();
        assert_eq!(cache.get_typed::<Coords>("geocode:paris"), Some(coords));

        cache.set_cache("geocode:broken", json!("not coords"), 60);
        assert_eq!(cache.get_typed::<Coords>("geocode:broken"), None);
    }

    #[test]
    fn test_contains_does_not_evict() {
        let (cache, clock) = cache_with_clock();
        cache.set_cache("k", json!(1), 1);
        assert!(cache.contains("k"));

        clock.advance(Duration::minutes(2));
        assert!(!cache.contains("k"));
        assert!(cache.get_entry("k").is_some());
    }

    #[test]
    fn test_clear() {
        let (cache, _clock) = cache_with_clock();
        cache.set_cache("a", json!(1), 1);
        cache.set_cache("b", json!(2), 1);
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.get_cached("a"), None);
    }

    #[test]
    fn test_generate_key_delegates() {
        let key = CacheStore::generate_key("weather", &[40.7128.into(), "2024-01-01".into()]);
        assert_eq!(key, "weather:40.7128:2024-01-01");
    }

    #[tokio::test]
    async fn test_get_or_compute_caches_success() {
        let (cache, _clock) = cache_with_clock();
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute("geocode:oslo", 60, || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, Error>(json!({"lat": 59.91}))
                })
                .await
                .unwrap();
            assert_eq!(value, json!({"lat": 59.91}));
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_does_not_cache_errors() {
        let (cache, _clock) = cache_with_clock();
        let result = cache
            .get_or_compute("geocode:nowhere", 60, || async {
                Err::<Value, _>(Error::not_found("geocode:nowhere"))
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_survives_restart() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable("cache", dir.path());
        let clock = ManualClock::new(start());

        let cache = CacheStore::with_clock(
            config.clone(),
            CacheSettings::default(),
            Arc::new(clock.clone()),
        );
        cache.set_cache("geocode:oslo", json!({"lat": 59.91}), 60);
        cache.set_cache("geocode:rome", json!({"lat": 41.9}), 60);
        cache.delete_cache("geocode:rome");
        cache.flush().await.unwrap();

        let reopened =
            CacheStore::with_clock(config, CacheSettings::default(), Arc::new(clock.clone()));
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get_cached("geocode:oslo"), Some(json!({"lat": 59.91})));

        let entry = reopened.get_entry("geocode:oslo").unwrap();
        assert_eq!(entry.data.expires_at, start() + Duration::minutes(60));

        clock.advance(Duration::minutes(61));
        assert_eq!(reopened.get_cached("geocode:oslo"), None);
    }

    #[tokio::test]
    async fn test_lazy_eviction_reaches_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable("cache", dir.path());
        let clock = ManualClock::new(start());

        let cache = CacheStore::with_clock(
            config.clone(),
            CacheSettings::default(),
            Arc::new(clock.clone()),
        );
        cache.set_cache("weather:59.91:10.75:2024-01-15:2024-01-16", json!({"t": -3}), 60);
        cache.set_cache("geocode:oslo", json!({"lat": 59.91}), 1440);
        cache.flush().await.unwrap();

        clock.advance(Duration::minutes(61));
        assert_eq!(
            cache.get_cached("weather:59.91:10.75:2024-01-15:2024-01-16"),
            None
        );
        cache.flush().await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("cache.json")).unwrap();
        assert!(!raw.contains("weather:59.91"));
        assert!(raw.contains("geocode:oslo"));

        let reopened =
            CacheStore::with_clock(config, CacheSettings::default(), Arc::new(clock.clone()));
        assert_eq!(reopened.len(), 1);
        assert!(reopened
            .get_entry("weather:59.91:10.75:2024-01-15:2024-01-16")
            .is_none());
        assert_eq!(reopened.get_cached("geocode:oslo"), Some(json!({"lat": 59.91})));
    }

    /// One entity per key, and the index points at exactly the stored entities
    fn assert_index_matches_table(cache: &CacheStore) {
        let entries = cache.entries();
        let mut keys: Vec<&str> = entries.iter().map(|e| e.data.key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), entries.len(), "duplicate entities for one key");

        let index = cache.lock_index();
        assert_eq!(index.len(), entries.len());
        for entry in &entries {
            assert_eq!(index.get(&entry.data.key), Some(&entry.id));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_operations_stay_consistent() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::durable("cache", dir.path());
        let cache = Arc::new(CacheStore::open(config.clone(), CacheSettings::default()));

        let handles: Vec<_> = (0..8)
            .map(|task| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for round in 0..200usize {
                        let key = format!("geocode:shared-{}", (task + round) % 4);
                        match (task + round) % 5 {
                            0 => {
                                let value = json!({"task": task, "round": round});
                                cache.set_cache(&key, value, 0)
                            }
                            1 | 2 => cache.set_cache(&key, json!({"task": task}), 60),
                            3 => {
                                cache.get_cached(&key);
                            }
                            _ if round % 3 == 0 => cache.delete_cache(&key),
                            _ => {
                                cache.clear_expired();
                            }
                        }
                        if round % 16 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(cache.len() <= 4);
        assert_index_matches_table(&cache);

        cache.flush().await.unwrap();
        let reopened = CacheStore::open(config, CacheSettings::default());
        assert_index_matches_table(&reopened);

        let mut before: Vec<_> = cache.entries().into_iter().map(|e| e.id).collect();
        let mut after: Vec<_> = reopened.entries().into_iter().map(|e| e.id).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_last_wins() {
        let cache = Arc::new(CacheStore::in_memory());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.set_cache("geocode:shared", json!(i), 60);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 1);
        let value = cache.get_cached("geocode:shared").unwrap();
        assert!((0..8).any(|i| value == json!(i)));
    }
}
