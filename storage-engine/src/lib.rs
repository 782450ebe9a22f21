pub mod moka_cache;

use harbor::domain::CacheConfig;
use harbor::ports::{CacheStore, StorageFactory};
use std::sync::Arc;

pub use moka_cache::MokaCache;

/// Builds every cache partition on Moka
#[derive(Clone, Debug, Default)]
pub struct MokaStorageFactory;

impl StorageFactory for MokaStorageFactory {
    fn create_from_config(&self, config: &CacheConfig) -> Arc<dyn CacheStore> {
        tracing::debug!(
            "Creating Moka cache '{}' (max entries: {:?})",
            config.name,
            config.max_entries
        );
        Arc::new(MokaCache::new(&config.name, config.max_entries, None))
    }
}
