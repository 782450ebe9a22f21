//! Error taxonomy for API calls: classification, retry and listener fan-out.

pub mod classify;
pub mod handler;
pub mod retry;
pub mod state;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub use classify::classify;
pub use handler::{ErrorHandler, ListenerId};
pub use retry::RetryPolicy;
pub use state::{ErrorState, NotificationCenter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Validation,
    Auth,
    Server,
    Unknown,
}

impl ErrorKind {
    /// Only transient failures are worth another attempt
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Auth => "AUTH",
            ErrorKind::Server => "SERVER",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    pub(crate) fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Unable to reach the server. Check your connection and try again.",
            ErrorKind::Validation => "Please correct the highlighted fields.",
            ErrorKind::Auth => "Your session has expired. Please sign in again.",
            ErrorKind::Server => "The server encountered an error. Please try again.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NETWORK" => Ok(ErrorKind::Network),
            "VALIDATION" => Ok(ErrorKind::Validation),
            "AUTH" => Ok(ErrorKind::Auth),
            "SERVER" => Ok(ErrorKind::Server),
            "UNKNOWN" => Ok(ErrorKind::Unknown),
            other => Err(format!("unknown error kind '{other}'")),
        }
    }
}

/// Messages for one form field
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldErrors {
    One(String),
    Many(Vec<String>),
}

impl FieldErrors {
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldErrors::One(msg) => Some(msg),
            FieldErrors::Many(msgs) => msgs.first().map(String::as_str),
        }
    }
}

/// The normalized error every failed API call ends up as
#[derive(Clone, Debug, Error, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<BTreeMap<String, FieldErrors>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub timestamp: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            field: None,
            validation: None,
            status: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            retryable: kind.is_retryable(),
        }
    }
}

/// A failure as it comes out of the transport, before classification
#[derive(Debug, Error)]
pub enum RawError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Status {
        status: u16,
        body: Option<serde_json::Value>,
    },

    #[error("validation failed")]
    Validation(serde_json::Value),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for RawError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            RawError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            RawError::Status {
                status: status.as_u16(),
                body: None,
            }
        } else {
            RawError::Other(err.to_string())
        }
    }
}

impl From<shared::Error> for RawError {
    fn from(err: shared::Error) -> Self {
        match err {
            shared::Error::Network(msg) => RawError::Network(msg),
            other => RawError::Other(other.to_string()),
        }
    }
}
