use super::{ApiError, ErrorKind};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// How long a notification stays visible
pub const NOTIFICATION_TTL_SECS: i64 = 5;

/// The single active error of one form or view; a new error replaces the old one
#[derive(Debug, Default)]
pub struct ErrorState {
    current: Mutex<Option<ApiError>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active error, returning the one it displaced
    pub fn set(&self, error: ApiError) -> Option<ApiError> {
        self.current.lock().replace(error)
    }

    pub fn clear(&self) -> Option<ApiError> {
        self.current.lock().take()
    }

    pub fn current(&self) -> Option<ApiError> {
        self.current.lock().clone()
    }

    /// First message for a form field, if the active error is a validation error
    pub fn field_message(&self, field: &str) -> Option<String> {
        let current = self.current.lock();
        let error = current.as_ref().filter(|e| e.kind == ErrorKind::Validation)?;

        if let Some(msg) = error
            .validation
            .as_ref()
            .and_then(|fields| fields.get(field))
            .and_then(|errors| errors.first())
        {
            return Some(msg.to_string());
        }

        (error.field.as_deref() == Some(field)).then(|| error.message.clone())
    }
}

#[derive(Clone, Debug)]
struct Toast {
    error: ApiError,
    expires_at: DateTime<Utc>,
}

/// Transient error notifications, each dismissed after [`NOTIFICATION_TTL_SECS`]
#[derive(Debug)]
pub struct NotificationCenter {
    toasts: Mutex<Vec<Toast>>,
    ttl: Duration,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(NOTIFICATION_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            toasts: Mutex::new(Vec::new()),
            ttl,
        }
    }

    /// Returns false when an error with the same timestamp is already showing
    pub fn push(&self, error: ApiError) -> bool {
        self.push_at(error, Utc::now())
    }

    pub fn push_at(&self, error: ApiError, now: DateTime<Utc>) -> bool {
        let mut toasts = self.toasts.lock();
        if toasts.iter().any(|t| t.error.timestamp == error.timestamp) {
            return false;
        }
        toasts.push(Toast {
            error,
            expires_at: now + self.ttl,
        });
        true
    }

    pub fn dismiss(&self, timestamp: &str) -> bool {
        let mut toasts = self.toasts.lock();
        let before = toasts.len();
        toasts.retain(|t| t.error.timestamp != timestamp);
        toasts.len() != before
    }

    /// Drop expired notifications, returning how many were removed
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut toasts = self.toasts.lock();
        let before = toasts.len();
        toasts.retain(|t| t.expires_at > now);
        before - toasts.len()
    }

    /// Notifications still visible at `now`, oldest first
    pub fn active(&self, now: DateTime<Utc>) -> Vec<ApiError> {
        self.toasts
            .lock()
            .iter()
            .filter(|t| t.expires_at > now)
            .map(|t| t.error.clone())
            .collect()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
