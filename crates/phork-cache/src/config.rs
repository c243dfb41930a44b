//! Cache configuration

use std::time::Duration;

/// Configuration shared by cache backends.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when a write supplies none
    pub default_ttl: Option<Duration>,
    /// Upper bound on stored entries; oldest entries are evicted past it
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self {
            default_ttl: None,
            max_entries: None,
        }
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
