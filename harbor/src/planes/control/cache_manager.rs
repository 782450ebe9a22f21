use crate::domain::{CacheConfig, CacheInfo, CachedResponse};
use crate::ports::{CacheStore, StorageFactory};
use async_trait::async_trait;
use shared::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Entry containing both cache configuration and storage implementation
pub struct CacheMetadata {
    pub config: CacheConfig,
    pub store: Arc<dyn CacheStore>,
}

/// Management operations over the set of named caches
#[async_trait]
pub trait AdminOperations: Send + Sync + 'static {
    /// Open a cache by name, creating it when missing
    async fn open_cache(&self, name: &str) -> Arc<dyn CacheStore>;
    async fn drop_cache(&self, name: &str) -> bool;
    async fn list_caches(&self) -> Vec<CacheInfo>;
    async fn describe_cache(&self, name: &str) -> Result<CacheInfo>;
}

/// CacheManager keeps the registry of named caches, backed by an injected storage factory
#[derive(Clone)]
pub struct CacheManager {
    // Maps cache name -> cache metadata (config + storage implementation)
    cache_registry: Arc<RwLock<BTreeMap<String, CacheMetadata>>>,
    factory: Arc<dyn StorageFactory>,
    max_entries: Option<u64>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("caches", &"<RwLock<BTreeMap>>")
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl CacheManager {
    pub fn new(factory: Arc<dyn StorageFactory>) -> Self {
        Self {
            cache_registry: Arc::new(RwLock::new(BTreeMap::new())),
            factory,
            max_entries: None,
        }
    }

    /// Bound every cache created from now on
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Get a cache store by name without creating it
    pub async fn get_cache_store(&self, name: &str) -> Option<Arc<dyn CacheStore>> {
        let caches = self.cache_registry.read().await;
        caches.get(name).map(|entry| entry.store.clone())
    }

    pub async fn cache_names(&self) -> Vec<String> {
        self.cache_registry.read().await.keys().cloned().collect()
    }

    /// Look `url` up across every cache, in name order
    pub async fn match_any(&self, url: &str) -> Option<CachedResponse> {
        let stores: Vec<Arc<dyn CacheStore>> = {
            let caches = self.cache_registry.read().await;
            caches.values().map(|entry| entry.store.clone()).collect()
        };

        for store in stores {
            match store.get(url).await {
                Ok(response) => return Some(response),
                Err(Error::NotFound) => continue,
                Err(e) => {
                    tracing::warn!("Cache lookup for '{}' failed: {}", url, e);
                }
            }
        }
        None
    }
}

#[async_trait]
impl AdminOperations for CacheManager {
    async fn open_cache(&self, name: &str) -> Arc<dyn CacheStore> {
        if let Some(store) = self.get_cache_store(name).await {
            return store;
        }

        let mut caches = self.cache_registry.write().await;
        // Another task may have created it while we waited for the write lock
        if let Some(entry) = caches.get(name) {
            return entry.store.clone();
        }

        let config = CacheConfig {
            name: name.to_string(),
            max_entries: self.max_entries,
        };
        let store = self.factory.create_from_config(&config);
        tracing::debug!("Created cache '{}'", name);
        caches.insert(
            name.to_string(),
            CacheMetadata {
                config,
                store: store.clone(),
            },
        );
        store
    }

    async fn drop_cache(&self, name: &str) -> bool {
        let mut caches = self.cache_registry.write().await;
        caches.remove(name).is_some()
    }

    async fn list_caches(&self) -> Vec<CacheInfo> {
        let entries: Vec<(CacheConfig, Arc<dyn CacheStore>)> = {
            let caches = self.cache_registry.read().await;
            caches
                .values()
                .map(|entry| (entry.config.clone(), entry.store.clone()))
                .collect()
        };

        let mut infos = Vec::with_capacity(entries.len());
        for (config, store) in entries {
            infos.push(CacheInfo {
                config,
                entries: store.entry_count().await,
            });
        }
        infos
    }

    async fn describe_cache(&self, name: &str) -> Result<CacheInfo> {
        let (config, store) = {
            let caches = self.cache_registry.read().await;
            let entry = caches
                .get(name)
                .ok_or_else(|| Error::CacheNotFound(name.to_string()))?;
            (entry.config.clone(), entry.store.clone())
        };

        Ok(CacheInfo {
            config,
            entries: store.entry_count().await,
        })
    }
}
