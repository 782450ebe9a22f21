#![deny(clippy::all)]

use crate::domain::{CacheConfig, CachedResponse, FetchRequest, PendingAction};
use async_trait::async_trait;
use shared::Result;
use std::sync::Arc;

// Ports are the pluggable extension points for cache backends, the network and the sync queue

/// Port for creating cache storage from configuration
pub trait StorageFactory: Send + Sync + 'static {
    fn create_from_config(&self, config: &CacheConfig) -> Arc<dyn CacheStore>;
}

/// Port for one named cache partition, keyed by request URL
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn put(&self, url: String, response: CachedResponse) -> Result<()>;
    /// `Err(Error::NotFound)` on a miss
    async fn get(&self, url: &str) -> Result<CachedResponse>;
    async fn delete(&self, url: &str) -> Result<bool>;
    async fn entry_count(&self) -> u64;
}

/// Port for the real network
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Any HTTP response is `Ok`, only an unreachable origin is `Err(Error::Network)`
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse>;
}

/// Port for the durable queue of mutating requests awaiting background sync
#[async_trait]
pub trait PendingActionStore: Send + Sync + 'static {
    async fn enqueue(&self, request: &FetchRequest) -> Result<PendingAction>;
    /// Oldest first
    async fn list(&self) -> Result<Vec<PendingAction>>;
    async fn remove(&self, id: u64) -> Result<bool>;
}
