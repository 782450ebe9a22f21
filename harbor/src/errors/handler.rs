use super::{ApiError, RawError, RetryPolicy, classify};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

pub type ErrorListener = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Handle returned by [`ErrorHandler::on_error`], used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Classifies failures, retries transient ones and fans errors out to listeners.
///
/// One instance is created at the application root and passed down; clones share
/// the same listener list.
#[derive(Clone)]
pub struct ErrorHandler {
    listeners: Arc<RwLock<Vec<(ListenerId, ErrorListener)>>>,
    next_id: Arc<AtomicU64>,
    policy: RetryPolicy,
    event_broadcaster: Option<broadcast::Sender<ApiError>>,
}

impl ErrorHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            policy,
            event_broadcaster: None,
        }
    }

    pub fn with_event_broadcaster(
        policy: RetryPolicy,
        broadcaster: broadcast::Sender<ApiError>,
    ) -> Self {
        Self {
            event_broadcaster: Some(broadcaster),
            ..Self::new(policy)
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// A handle with a different retry policy that still notifies this
    /// handler's listeners and broadcaster
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub fn on_error<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(callback)));
        id
    }

    /// Returns false if the listener was already gone
    pub fn off_error(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Classify `raw` and notify every listener with the result
    pub fn handle_error(&self, raw: &RawError, context: Option<&str>) -> ApiError {
        let error = classify(raw);
        tracing::debug!(
            "{} error{}: {} ({})",
            error.kind.as_str(),
            context.map(|c| format!(" in {c}")).unwrap_or_default(),
            error.message,
            raw
        );
        self.notify(&error);
        error
    }

    fn notify(&self, error: &ApiError) {
        // Snapshot so a listener may subscribe or unsubscribe without deadlocking
        let listeners: Vec<ErrorListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(error);
        }

        if let Some(ref broadcaster) = self.event_broadcaster {
            match broadcaster.send(error.clone()) {
                Ok(subscriber_count) => {
                    tracing::debug!(
                        "Broadcasted {} error to {} subscriber(s)",
                        error.kind.as_str(),
                        subscriber_count
                    );
                }
                Err(_) => {
                    tracing::trace!("No subscribers for {} error", error.kind.as_str());
                }
            }
        }
    }

    /// Run `operation`, retrying retryable failures under the configured policy.
    ///
    /// Attempts run strictly one after another. Intermediate failures are only
    /// classified; the final one is returned and broadcast through [`handle_error`].
    ///
    /// [`handle_error`]: ErrorHandler::handle_error
    pub async fn with_retry<T, F, Fut>(
        &self,
        context: Option<&str>,
        mut operation: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        let mut retries = 0;
        loop {
            let raw = match operation().await {
                Ok(value) => return Ok(value),
                Err(raw) => raw,
            };

            let classified = classify(&raw);
            if !classified.retryable || retries >= self.policy.max_retries {
                return Err(self.handle_error(&raw, context));
            }

            retries += 1;
            let delay = self.policy.delay_for(retries);
            tracing::info!(
                "Retrying{} after {} error (attempt {}/{}, delay {:?})",
                context.map(|c| format!(" {c}")).unwrap_or_default(),
                classified.kind.as_str(),
                retries + 1,
                self.policy.max_retries + 1,
                delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("listeners", &self.listener_count())
            .field("policy", &self.policy)
            .finish()
    }
}
