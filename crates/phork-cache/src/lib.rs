//! # phork-cache
//!
//! Caching layer for the phork framework: a pluggable backend trait, a
//! type-safe `Cache` handle, namespace-token invalidation and tiered pools.
//!
//! ## Quick start
//!
//! ```rust
//! use phork_cache::{Cache, CacheConfig, MemoryBackend};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = Cache::new(MemoryBackend::new(CacheConfig::default()));
//!
//! cache.put("user:123", &"John Doe".to_string(), Duration::from_secs(3600)).await.unwrap();
//!
//! let user: Option<String> = cache.get("user:123").await.unwrap();
//! assert_eq!(user, Some("John Doe".to_string()));
//! # });
//! ```

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod backends;
pub mod config;
pub mod namespace;
pub mod tier;

pub use backends::*;
pub use config::*;
pub use tier::*;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Core backend trait every cache implementation must satisfy.
///
/// Values are opaque byte blobs; typed access lives on [`Cache`]. Counters are
/// a distinct keyspace: `increment` and `add` never observe blob entries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Put a value in the cache with optional TTL
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove a value (blob or counter) from the cache
    async fn forget(&self, key: &str) -> CacheResult<bool>;

    /// Check if a key exists in the cache
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Clear all entries
    async fn flush(&self) -> CacheResult<()>;

    /// Atomically adjust a counter by `delta`, returning the new value.
    ///
    /// A missing counter is created at `delta` when `create_missing` is set;
    /// otherwise `None` is returned and nothing is written.
    async fn increment(&self, key: &str, delta: i64, create_missing: bool)
        -> CacheResult<Option<i64>>;

    /// Store a value only if the key is absent. Returns whether it was stored.
    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool>;

    /// Get multiple values at once (optional optimization)
    async fn get_many(&self, keys: &[&str]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    /// Put multiple values at once (optional optimization)
    async fn put_many(&self, entries: &[(&str, Vec<u8>, Option<Duration>)]) -> CacheResult<()> {
        for (key, value, ttl) in entries {
            self.put(key, value.clone(), *ttl).await?;
        }
        Ok(())
    }
}

/// High-level cache handle with type-safe operations.
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Option<Duration>,
}

impl Cache {
    /// Create a new cache handle over the given backend
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            default_ttl: None,
        }
    }

    /// Create a new cache handle with a default TTL
    pub fn with_default_ttl(backend: impl CacheBackend + 'static, ttl: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            default_ttl: Some(ttl),
        }
    }

    /// Access the underlying backend
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Get a typed value from the cache
    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Put a typed value in the cache
    pub async fn put<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, bytes, Some(ttl)).await
    }

    /// Put a typed value using the handle's default TTL
    pub async fn put_default<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, bytes, self.default_ttl).await
    }

    /// Remove a value from the cache
    pub async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.backend.forget(key).await
    }

    /// Check if a key exists
    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.backend.exists(key).await
    }

    /// Clear all cache entries
    pub async fn flush(&self) -> CacheResult<()> {
        self.backend.flush().await
    }

    /// Atomically adjust a counter, see [`CacheBackend::increment`]
    pub async fn increment(
        &self,
        key: &str,
        delta: i64,
        create_missing: bool,
    ) -> CacheResult<Option<i64>> {
        self.backend.increment(key, delta, create_missing).await
    }

    /// Set a marker key only if absent. Returns whether the marker was placed.
    pub async fn add_marker(&self, key: &str, ttl: Option<Duration>) -> CacheResult<bool> {
        self.backend.add(key, vec![1], ttl).await
    }

    /// Remember pattern: get from cache or compute and store
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }

        let value = compute().await;
        self.put(key, &value, ttl).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> Cache {
        Cache::new(MemoryBackend::new(CacheConfig::default()))
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let cache = cache();
        cache
            .put("greeting", &"hello".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let value: Option<String> = cache.get("greeting").await.unwrap();
        assert_eq!(value, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = cache();
        let value: Option<String> = cache.get("missing").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_forget() {
        let cache = cache();
        cache.put("key", &42u32, Duration::from_secs(60)).await.unwrap();

        assert!(cache.forget("key").await.unwrap());
        assert!(!cache.forget("key").await.unwrap());

        let value: Option<u32> = cache.get("key").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_remember_computes_once() {
        let cache = cache();

        let first = cache
            .remember("expensive", Duration::from_secs(60), || async { 7u32 })
            .await
            .unwrap();
        assert_eq!(first, 7);

        // Second call must come from the cache, not the closure.
        let second = cache
            .remember("expensive", Duration::from_secs(60), || async { 99u32 })
            .await
            .unwrap();
        assert_eq!(second, 7);
    }

    #[tokio::test]
    async fn test_increment_create_semantics() {
        let cache = cache();

        assert_eq!(cache.increment("hits", 1, false).await.unwrap(), None);
        assert_eq!(cache.increment("hits", 1, true).await.unwrap(), Some(1));
        assert_eq!(cache.increment("hits", 2, false).await.unwrap(), Some(3));
        assert_eq!(cache.increment("hits", -3, false).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_add_marker_only_once() {
        let cache = cache();

        assert!(cache.add_marker("guard", None).await.unwrap());
        assert!(!cache.add_marker("guard", None).await.unwrap());

        cache.forget("guard").await.unwrap();
        assert!(cache.add_marker("guard", None).await.unwrap());
    }
}
