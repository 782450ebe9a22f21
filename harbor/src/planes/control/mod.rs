pub mod cache_manager;

pub use cache_manager::{AdminOperations, CacheManager, CacheMetadata};
