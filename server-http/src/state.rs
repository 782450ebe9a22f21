use harbor::errors::{ApiError, ErrorHandler, RetryPolicy};
use harbor::network::HttpNetwork;
use harbor::persistence::{MemoryPendingStore, SledPendingStore};
use harbor::planes::control::CacheManager;
use harbor::ports::{Network, PendingActionStore};
use harbor::worker::{OfflineWorker, WorkerOptions};
use shared::config::Config;
use std::sync::Arc;
use storage_engine::MokaStorageFactory;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 1000;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<OfflineWorker>,
    pub errors: ErrorHandler,
    pub event_channel: broadcast::Sender<ApiError>,
}

impl AppState {
    pub fn new(config: &Config) -> shared::Result<Self> {
        let (event_tx, _event_rx) = broadcast::channel(EVENT_BUFFER);
        let errors =
            ErrorHandler::with_event_broadcaster(RetryPolicy::from(&config.retry), event_tx.clone());
        errors.on_error(|e| {
            tracing::warn!("Upstream error [{}]: {}", e.kind.as_str(), e.message);
        });

        let network: Arc<dyn Network> = Arc::new(
            HttpNetwork::new(
                config.upstream_url.clone(),
                config.request_timeout,
                config.connect_timeout,
            )?
            .with_error_handler(errors.clone()),
        );

        let pending = match Self::init_pending_store(config) {
            Ok(store) => {
                tracing::info!("Pending action queue persisted under {}", config.data_dir);
                store
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to open pending action queue: {}. Queued actions will not survive a restart.",
                    e
                );
                Arc::new(MemoryPendingStore::new()) as Arc<dyn PendingActionStore>
            }
        };

        let mut caches = CacheManager::new(Arc::new(MokaStorageFactory));
        if let Some(max_entries) = config.worker.max_entries {
            caches = caches.with_max_entries(max_entries);
        }

        Ok(Self::from_parts(
            caches,
            network,
            pending,
            WorkerOptions::from_config(&config.worker),
            errors,
            event_tx,
        ))
    }

    pub fn from_parts(
        caches: CacheManager,
        network: Arc<dyn Network>,
        pending: Arc<dyn PendingActionStore>,
        options: WorkerOptions,
        errors: ErrorHandler,
        event_channel: broadcast::Sender<ApiError>,
    ) -> Self {
        Self {
            worker: Arc::new(OfflineWorker::new(caches, network, pending, options)),
            errors,
            event_channel,
        }
    }

    fn init_pending_store(config: &Config) -> shared::Result<Arc<dyn PendingActionStore>> {
        let path = std::path::Path::new(&config.data_dir).join("pending.sled");
        Ok(Arc::new(SledPendingStore::new(path)?))
    }
}
