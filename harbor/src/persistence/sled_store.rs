use crate::domain::{FetchRequest, PendingAction};
use crate::ports::PendingActionStore;
use async_trait::async_trait;
use chrono::Utc;
use shared::{Error, Result};
use std::path::Path;

/// Sled-based durable queue of requests awaiting background sync
pub struct SledPendingStore {
    db: sled::Db,
}

impl SledPendingStore {
    /// Create a new Sled queue
    /// Creates the parent directory if it doesn't exist
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open Sled database: {}", e)))?;

        Ok(Self { db })
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl PendingActionStore for SledPendingStore {
    async fn enqueue(&self, request: &FetchRequest) -> Result<PendingAction> {
        // Monotonic ids keep big-endian keys in FIFO order
        let id = self
            .db
            .generate_id()
            .map_err(|e| Error::Storage(format!("Failed to generate id: {}", e)))?;

        let action = PendingAction {
            id,
            method: request.method.to_string(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.as_ref().map(|b| b.to_vec()).unwrap_or_default(),
            queued_at: Utc::now(),
        };

        let value = serde_json::to_vec(&action)
            .map_err(|e| Error::Internal(format!("Failed to serialize action: {}", e)))?;
        self.db
            .insert(id.to_be_bytes(), value)
            .map_err(|e| Error::Storage(format!("Failed to save action: {}", e)))?;
        self.flush()?;

        Ok(action)
    }

    async fn list(&self) -> Result<Vec<PendingAction>> {
        let mut actions = Vec::new();

        for result in self.db.iter() {
            let (_, value) = result
                .map_err(|e| Error::Storage(format!("Failed to iterate database: {}", e)))?;

            let action: PendingAction = serde_json::from_slice(&value)
                .map_err(|e| Error::Internal(format!("Failed to deserialize action: {}", e)))?;

            actions.push(action);
        }

        Ok(actions)
    }

    async fn remove(&self, id: u64) -> Result<bool> {
        let removed = self
            .db
            .remove(id.to_be_bytes())
            .map_err(|e| Error::Storage(format!("Failed to delete action: {}", e)))?
            .is_some();

        self.flush()?;

        Ok(removed)
    }
}
