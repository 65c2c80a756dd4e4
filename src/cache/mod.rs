//! Metadata cache
//!
//! Metadata lookups (entity types, variable lists, category sets, geographic
//! codes) are small and stable per census year, so they are cached as JSON
//! payloads under string keys.
//!
//! Empty payloads (`null`, `[]`, `{}`, `""`) are never valid cached results:
//! they are skipped on write, and on read they are dropped and reported as a
//! miss. A payload that no longer deserializes into the expected type is
//! treated the same way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::census_catalog::{CensusYear, GeoLevel};

/// Key-value store for metadata payloads.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn put(&self, key: &str, value: Value);

    fn remove(&self, key: &str);
}

/// Cache keys, one variant per kind of cached lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey<'a> {
    EntityTypes(CensusYear),
    Variables(CensusYear, Option<&'a str>),
    GeoCodes(CensusYear, GeoLevel),
    AllMetadata(CensusYear),
    Categories(CensusYear, &'a str),
}

impl std::fmt::Display for CacheKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::EntityTypes(year) => write!(f, "entity_types_{}", year),
            CacheKey::Variables(year, entity) => {
                write!(f, "variables_{}_{}", year, entity.unwrap_or("all"))
            }
            CacheKey::GeoCodes(year, level) => write!(f, "geo_codes_{}_{}", year, level),
            CacheKey::AllMetadata(year) => write!(f, "all_metadata_{}", year),
            CacheKey::Categories(year, code) => write!(f, "categories_{}_{}", year, code),
        }
    }
}

/// True for payloads that must be treated as a miss.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Typed read. Empty or undecodable payloads are removed and yield `None`.
pub fn get_typed<T: DeserializeOwned>(store: &dyn CacheStore, key: &CacheKey<'_>) -> Option<T> {
    let key = key.to_string();
    let value = store.get(&key)?;
    if is_empty_payload(&value) {
        store.remove(&key);
        return None;
    }
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            log::warn!("Discarding malformed cache entry {}: {}", key, e);
            store.remove(&key);
            None
        }
    }
}

/// Typed write. Empty payloads are not stored.
pub fn put_typed<T: Serialize>(store: &dyn CacheStore, key: &CacheKey<'_>, value: &T) {
    let key = key.to_string();
    match serde_json::to_value(value) {
        Ok(value) if !is_empty_payload(&value) => store.put(&key, value),
        Ok(_) => log::debug!("Not caching empty payload for {}", key),
        Err(e) => log::warn!("Could not serialize cache entry {}: {}", key, e),
    }
}

/// Configuration for the in-memory cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Enable or disable caching
    pub enabled: bool,
    /// Maximum number of entries (LRU eviction)
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// Logical clock value of the last access (for LRU)
    last_accessed: u64,
}

/// In-memory cache with LRU eviction
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        MemoryCache {
            entries: Mutex::new(HashMap::new()),
            config,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// A cache that stores nothing.
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            max_entries: 0,
        })
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn evict_lru(&self, entries: &mut HashMap<String, CacheEntry>) {
        if let Some(key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone())
        {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Clear entire cache
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.lock().len(),
            max_entries: self.config.max_entries,
        }
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        if !self.config.enabled {
            return None;
        }

        let now = self.tick();
        let mut entries = self.lock();
        let found = match entries.get_mut(key) {
            Some(entry) if !is_empty_payload(&entry.value) => {
                entry.last_accessed = now;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn put(&self, key: &str, value: Value) {
        if !self.config.enabled || is_empty_payload(&value) {
            return;
        }

        let entry = CacheEntry {
            value,
            last_accessed: self.tick(),
        };
        let mut entries = self.lock();
        if !entries.contains_key(key) && entries.len() >= self.config.max_entries {
            self.evict_lru(&mut entries);
        }
        entries.insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_entries: usize,
}

impl CacheMetrics {
    /// Calculate cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
