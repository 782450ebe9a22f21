use crate::domain::{FetchRequest, PendingAction};
use crate::ports::PendingActionStore;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared::Result;
use std::collections::BTreeMap;

/// In-memory pending queue, used when the durable store can't be opened
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    inner: Mutex<(u64, BTreeMap<u64, PendingAction>)>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingActionStore for MemoryPendingStore {
    async fn enqueue(&self, request: &FetchRequest) -> Result<PendingAction> {
        let mut inner = self.inner.lock();
        inner.0 += 1;
        let action = PendingAction {
            id: inner.0,
            method: request.method.to_string(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.as_ref().map(|b| b.to_vec()).unwrap_or_default(),
            queued_at: Utc::now(),
        };
        inner.1.insert(action.id, action.clone());
        Ok(action)
    }

    async fn list(&self) -> Result<Vec<PendingAction>> {
        Ok(self.inner.lock().1.values().cloned().collect())
    }

    async fn remove(&self, id: u64) -> Result<bool> {
        Ok(self.inner.lock().1.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let store = MemoryPendingStore::new();
        for url in ["/api/v1/a", "/api/v1/b", "/api/v1/c"] {
            store
                .enqueue(&FetchRequest::get(url).with_method(Method::POST))
                .await
                .unwrap();
        }

        let urls: Vec<String> = store.list().await.unwrap().into_iter().map(|a| a.url).collect();
        assert_eq!(urls, vec!["/api/v1/a", "/api/v1/b", "/api/v1/c"]);

        assert!(store.remove(2).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
