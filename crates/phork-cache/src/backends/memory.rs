//! In-memory cache backend

use crate::{CacheBackend, CacheConfig, CacheResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct BlobEntry {
    data: Vec<u8>,
    created_at: Instant,
    expires_at: Option<Instant>,
}

impl BlobEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            data,
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| Instant::now() > exp)
    }
}

/// In-memory backend over concurrent maps.
///
/// Blobs and counters live in separate keyspaces so counter adjustments stay
/// atomic under the map's per-shard locking. `forget`, `exists` and `flush`
/// span both.
pub struct MemoryBackend {
    entries: DashMap<String, BlobEntry>,
    counters: DashMap<String, i64>,
    config: CacheConfig,
}

impl MemoryBackend {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            counters: DashMap::new(),
            config,
        }
    }

    /// Drop expired entries, then the oldest entries while over `max_entries`.
    fn evict(&self) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
        }

        let Some(max) = self.config.max_entries else {
            return;
        };
        while self.entries.len() >= max {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    fn effective_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        ttl.or(self.config.default_ttl)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.data.clone()));
            }
        } else {
            return Ok(None);
        }
        // Lazily reap the expired entry.
        self.entries.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        self.evict();
        let ttl = self.effective_ttl(ttl);
        self.entries.insert(key.to_string(), BlobEntry::new(value, ttl));
        Ok(())
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        let blob = self.entries.remove(key).is_some();
        let counter = self.counters.remove(key).is_some();
        Ok(blob || counter)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(true);
            }
        }
        Ok(self.counters.contains_key(key))
    }

    async fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        self.counters.clear();
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        delta: i64,
        create_missing: bool,
    ) -> CacheResult<Option<i64>> {
        match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let value = entry.get_mut();
                *value += delta;
                Ok(Some(*value))
            }
            Entry::Vacant(vacant) => {
                if create_missing {
                    vacant.insert(delta);
                    Ok(Some(delta))
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool> {
        if self.counters.contains_key(key) {
            return Ok(false);
        }
        let ttl = self.effective_ttl(ttl);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired() {
                    entry.insert(BlobEntry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(BlobEntry::new(value, ttl));
                Ok(true)
            }
        }
    }
}
