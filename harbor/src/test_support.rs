//! In-memory port implementations for unit tests.

use crate::domain::{CacheConfig, CachedResponse, FetchRequest};
use crate::ports::{CacheStore, Network, StorageFactory};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use shared::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn ok_response(body: &'static str) -> CachedResponse {
    CachedResponse::new(200, Vec::new(), body)
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CachedResponse>>,
    puts: Arc<AtomicUsize>,
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn put(&self, url: String, response: CachedResponse) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(url, response);
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<CachedResponse> {
        self.entries.lock().get(url).cloned().ok_or(Error::NotFound)
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(url).is_some())
    }

    async fn entry_count(&self) -> u64 {
        self.entries.lock().len() as u64
    }
}

/// Creates [`MemoryStore`]s and counts cache writes across all of them
#[derive(Default)]
pub struct MemoryStorageFactory {
    puts: Arc<AtomicUsize>,
}

impl MemoryStorageFactory {
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl StorageFactory for MemoryStorageFactory {
    fn create_from_config(&self, _config: &CacheConfig) -> Arc<dyn CacheStore> {
        Arc::new(MemoryStore {
            entries: Mutex::new(HashMap::new()),
            puts: self.puts.clone(),
        })
    }
}

/// Scripted network: canned responses per URL, 404 for anything else,
/// and a switch to simulate losing connectivity
#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, CachedResponse>>,
    calls: Mutex<HashMap<String, usize>>,
    bodies: Mutex<HashMap<String, Bytes>>,
    offline: AtomicBool,
    yielding: AtomicBool,
}

impl MockNetwork {
    pub fn respond(&self, url: &str, response: CachedResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Suspend once in every fetch so concurrent callers interleave
    pub fn yield_before_responding(&self) {
        self.yielding.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn last_body(&self, url: &str) -> Option<Bytes> {
        self.bodies.lock().get(url).cloned()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse> {
        if self.yielding.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        *self.calls.lock().entry(request.url.clone()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }

        if let Some(body) = &request.body {
            self.bodies.lock().insert(request.url.clone(), body.clone());
        }

        Ok(self
            .responses
            .lock()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| CachedResponse::text(404, "Not found")))
    }
}
