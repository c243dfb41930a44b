//! Namespace-token key versioning.
//!
//! Every namespaced key embeds the namespace's current version counter, so
//! bumping the counter orphans the whole key family at once. Orphaned entries
//! age out through TTL and eviction; nothing has to enumerate them.

use crate::{Cache, CacheResult};

impl Cache {
    /// Resolve the current version token for a namespace, creating it at 0.
    async fn namespace_version(&self, namespace: &str) -> CacheResult<i64> {
        let token_key = format!("ns:{}", namespace);
        let version = self.increment(&token_key, 0, true).await?;
        Ok(version.unwrap_or(0))
    }

    /// Build the versioned form of a namespaced key.
    pub async fn namespaced_key(&self, namespace: &str, key: &str) -> CacheResult<String> {
        let version = self.namespace_version(namespace).await?;
        Ok(format!("ns:{}:{}:{}", namespace, version, key))
    }

    /// Get a typed value from a namespace
    pub async fn get_ns<T>(&self, namespace: &str, key: &str) -> CacheResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let key = self.namespaced_key(namespace, key).await?;
        self.get(&key).await
    }

    /// Put a typed value into a namespace
    pub async fn put_ns<T>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: std::time::Duration,
    ) -> CacheResult<()>
    where
        T: serde::Serialize,
    {
        let key = self.namespaced_key(namespace, key).await?;
        self.put(&key, value, ttl).await
    }

    /// Remove a single key from a namespace
    pub async fn forget_ns(&self, namespace: &str, key: &str) -> CacheResult<bool> {
        let key = self.namespaced_key(namespace, key).await?;
        self.forget(&key).await
    }

    /// Invalidate every key in a namespace by bumping its version token.
    pub async fn flush_ns(&self, namespace: &str) -> CacheResult<()> {
        let token_key = format!("ns:{}", namespace);
        self.increment(&token_key, 1, true).await?;
        tracing::debug!(namespace, "cache namespace flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Cache, CacheConfig, MemoryBackend};
    use std::time::Duration;

    fn cache() -> Cache {
        Cache::new(MemoryBackend::new(CacheConfig::default()))
    }

    #[tokio::test]
    async fn test_namespaced_round_trip() {
        let cache = cache();

        cache
            .put_ns("posts", "page:1", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();

        let page: Option<Vec<i32>> = cache.get_ns("posts", "page:1").await.unwrap();
        assert_eq!(page, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let cache = cache();

        cache
            .put_ns("posts", "k", &1u32, Duration::from_secs(60))
            .await
            .unwrap();

        let other: Option<u32> = cache.get_ns("comments", "k").await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_flush_ns_invalidates_family() {
        let cache = cache();

        cache
            .put_ns("posts", "a", &1u32, Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put_ns("posts", "b", &2u32, Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put_ns("comments", "a", &3u32, Duration::from_secs(60))
            .await
            .unwrap();

        cache.flush_ns("posts").await.unwrap();

        let a: Option<u32> = cache.get_ns("posts", "a").await.unwrap();
        let b: Option<u32> = cache.get_ns("posts", "b").await.unwrap();
        let other: Option<u32> = cache.get_ns("comments", "a").await.unwrap();
        assert!(a.is_none());
        assert!(b.is_none());
        assert_eq!(other, Some(3));
    }

    #[tokio::test]
    async fn test_forget_ns_single_key() {
        let cache = cache();

        cache
            .put_ns("posts", "a", &1u32, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.forget_ns("posts", "a").await.unwrap());

        let a: Option<u32> = cache.get_ns("posts", "a").await.unwrap();
        assert!(a.is_none());
    }
}
