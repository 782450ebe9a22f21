use async_trait::async_trait;
use harbor::domain::CachedResponse;
use harbor::ports::CacheStore;
use moka::future::Cache;
use shared::{Error, Result};
use std::fmt::Debug;
use std::time::Duration;

/// Moka-backed cache partition mapping request URLs to stored responses
pub struct MokaCache {
    cache: Cache<String, CachedResponse>,
}

impl MokaCache {
    /// Create a Moka cache from name and optional capacity
    pub fn new(name: &str, max_entries: Option<u64>, default_ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().name(name);

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        if let Some(ttl) = default_ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
        }
    }
}

#[async_trait]
impl CacheStore for MokaCache {
    async fn put(&self, url: String, response: CachedResponse) -> Result<()> {
        self.cache.insert(url, response).await;
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<CachedResponse> {
        self.cache.get(url).await.ok_or(Error::NotFound)
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        Ok(self.cache.remove(url).await.is_some())
    }

    async fn entry_count(&self) -> u64 {
        // Moka applies inserts and evictions lazily
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl Debug for MokaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache")
            .field("name", &self.cache.name())
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}
