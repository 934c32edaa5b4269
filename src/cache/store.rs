//! The capacity-bounded store behind every cache layer
//!
//! One generic map with per-entry recency and frequency metadata. LRU
//! evicts the entry with the oldest access tick; LFU evicts the entry with
//! the lowest frequency count (ties broken by the older tick). TTL is lazy:
//! expired entries are purged when touched, plus on an explicit
//! [`CacheStore::remove_expired`] sweep — no full scan on the hot path.

use std::hash::Hash;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::cache::EvictionPolicy;

/// Hit/miss/eviction counters for one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStatistics {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (or only an expired entry).
    pub misses: u64,
    /// Entries discarded by the eviction policy.
    pub evictions: u64,
    /// Current number of live entries.
    pub size: usize,
}

struct Entry<V> {
    value: V,
    inserted: Instant,
    last_access: u64,
    frequency: u64,
}

pub(crate) struct CacheStore<K, V> {
    map: FxHashMap<K, Entry<V>>,
    capacity: usize,
    policy: EvictionPolicy,
    ttl: Option<Duration>,
    collect_statistics: bool,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> CacheStore<K, V> {
    pub(crate) fn new(
        capacity: usize,
        policy: EvictionPolicy,
        ttl: Option<Duration>,
        collect_statistics: bool,
    ) -> Self {
        CacheStore {
            map: FxHashMap::default(),
            capacity,
            policy,
            ttl,
            collect_statistics,
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Whether the layer participates at all (capacity 0 disables it).
    pub(crate) fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    fn expired(&self, entry: &Entry<V>) -> bool {
        self.ttl.is_some_and(|ttl| entry.inserted.elapsed() > ttl)
    }

    /// Read an entry; touches recency/frequency metadata on a hit. An
    /// expired entry is removed and reported as a miss.
    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        let expired = self.map.get(key).is_some_and(|e| self.expired(e));
        if expired {
            self.map.remove(key);
        }
        match self.map.get_mut(key) {
            Some(entry) => {
                self.tick += 1;
                entry.last_access = self.tick;
                entry.frequency += 1;
                if self.collect_statistics {
                    self.hits += 1;
                }
                Some(entry.value.clone())
            }
            None => {
                if self.collect_statistics {
                    self.misses += 1;
                }
                None
            }
        }
    }

    /// Insert or replace; evicts per policy when the layer is full.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        if !self.is_enabled() {
            return;
        }
        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            self.evict_one();
        }
        self.tick += 1;
        self.map.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                last_access: self.tick,
                frequency: 1,
            },
        );
    }

    fn evict_one(&mut self) {
        // Prefer discarding something already expired.
        let dead: Option<K> = self
            .map
            .iter()
            .find(|(_, e)| self.expired(e))
            .map(|(k, _)| k.clone());
        let victim = dead.or_else(|| {
            self.map
                .iter()
                .min_by_key(|(_, e)| match self.policy {
                    EvictionPolicy::Lru => (0, e.last_access),
                    EvictionPolicy::Lfu => (e.frequency, e.last_access),
                })
                .map(|(k, _)| k.clone())
        });
        if let Some(key) = victim {
            self.map.remove(&key);
            if self.collect_statistics {
                self.evictions += 1;
            }
        }
    }

    /// Drop every expired entry now.
    pub(crate) fn remove_expired(&mut self) {
        if self.ttl.is_none() {
            return;
        }
        let ttl = self.ttl.unwrap_or_default();
        self.map.retain(|_, e| e.inserted.elapsed() <= ttl);
    }

    /// Drop every entry; counters survive.
    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    pub(crate) fn statistics(&self) -> LayerStatistics {
        LayerStatistics {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.map.len(),
        }
    }
}
