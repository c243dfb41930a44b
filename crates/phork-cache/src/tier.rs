//! Tiered cache pools.
//!
//! The base tier holds data, the presentation tier holds rendered output.
//! Keeping them as separate pools lets either be flushed without touching
//! the other.

use crate::{Cache, CacheResult};

/// An isolated cache pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Data records and query results
    Base,
    /// Rendered output
    Presentation,
}

/// A pair of independently flushable cache pools.
#[derive(Clone)]
pub struct TieredCache {
    base: Cache,
    presentation: Cache,
}

impl TieredCache {
    pub fn new(base: Cache, presentation: Cache) -> Self {
        Self { base, presentation }
    }

    /// Access one tier's cache handle
    pub fn tier(&self, tier: CacheTier) -> &Cache {
        match tier {
            CacheTier::Base => &self.base,
            CacheTier::Presentation => &self.presentation,
        }
    }

    /// Flush a single tier, leaving the other intact
    pub async fn flush_tier(&self, tier: CacheTier) -> CacheResult<()> {
        self.tier(tier).flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheConfig, MemoryBackend};
    use std::time::Duration;

    fn tiered() -> TieredCache {
        TieredCache::new(
            Cache::new(MemoryBackend::new(CacheConfig::default())),
            Cache::new(MemoryBackend::new(CacheConfig::default())),
        )
    }

    #[tokio::test]
    async fn test_tiers_are_isolated() {
        let cache = tiered();

        cache
            .tier(CacheTier::Base)
            .put("k", &"data".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let rendered: Option<String> = cache.tier(CacheTier::Presentation).get("k").await.unwrap();
        assert!(rendered.is_none());
    }

    #[tokio::test]
    async fn test_flush_tier_spares_other() {
        let cache = tiered();

        cache
            .tier(CacheTier::Base)
            .put("k", &1u32, Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .tier(CacheTier::Presentation)
            .put("k", &2u32, Duration::from_secs(60))
            .await
            .unwrap();

        cache.flush_tier(CacheTier::Presentation).await.unwrap();

        let base: Option<u32> = cache.tier(CacheTier::Base).get("k").await.unwrap();
        let pres: Option<u32> = cache.tier(CacheTier::Presentation).get("k").await.unwrap();
        assert_eq!(base, Some(1));
        assert!(pres.is_none());
    }
}
