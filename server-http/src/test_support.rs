//! Fixtures shared by handler tests.

use crate::state::AppState;
use async_trait::async_trait;
use harbor::domain::{CachedResponse, FetchRequest};
use harbor::errors::ErrorHandler;
use harbor::persistence::MemoryPendingStore;
use harbor::planes::control::CacheManager;
use harbor::ports::Network;
use harbor::worker::WorkerOptions;
use shared::{Error, Result};
use std::sync::Arc;
use storage_engine::MokaStorageFactory;
use tokio::sync::broadcast;

/// An origin that can never be reached
pub struct Unreachable;

#[async_trait]
impl Network for Unreachable {
    async fn fetch(&self, _request: &FetchRequest) -> Result<CachedResponse> {
        Err(Error::Network("connection refused".to_string()))
    }
}

pub fn offline_state(pending: Arc<MemoryPendingStore>) -> AppState {
    let (tx, _rx) = broadcast::channel(16);
    AppState::from_parts(
        CacheManager::new(Arc::new(MokaStorageFactory)),
        Arc::new(Unreachable),
        pending,
        WorkerOptions::new("test", "v1"),
        ErrorHandler::default(),
        tx,
    )
}
