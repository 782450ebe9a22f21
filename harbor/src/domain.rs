use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// How the browser issued the request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestMode {
    /// Full-page load
    Navigate,
    /// Anything else: XHR/fetch, subresources
    Other,
}

/// A request intercepted by the offline worker
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub method: Method,
    /// Path plus optional query string, e.g. `/api/v1/invoices?page=2`
    pub url: String,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            mode: RequestMode::Other,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The path without its query string
    pub fn path(&self) -> &str {
        self.url.split(['?', '#']).next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response as stored in a cache or returned to the page
#[derive(Clone, Debug, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(
            status,
            vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body,
        )
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(
            status,
            vec![("content-type".to_string(), "application/json".to_string())],
            value.to_string(),
        )
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Configuration of one named cache partition
#[derive(Clone, Debug, Serialize)]
pub struct CacheConfig {
    pub name: String,
    pub max_entries: Option<u64>,
}

impl CacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_entries: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CacheInfo {
    pub config: CacheConfig,
    pub entries: u64,
}

/// The versioned names of the two live cache partitions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheNames {
    pub version: String,
    pub static_cache: String,
    pub dynamic_cache: String,
}

impl CacheNames {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            version: version.to_string(),
            static_cache: format!("{prefix}-static-{version}"),
            dynamic_cache: format!("{prefix}-dynamic-{version}"),
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }
}

/// A mutating request that failed while offline and waits for replay
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: u64,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    pub queued_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn to_request(&self) -> FetchRequest {
        let method = Method::from_bytes(self.method.as_bytes()).unwrap_or(Method::POST);
        FetchRequest {
            method,
            url: self.url.clone(),
            mode: RequestMode::Other,
            headers: self.headers.clone(),
            body: (!self.body.is_empty()).then(|| Bytes::from(self.body.clone())),
        }
    }
}

/// Push message body as delivered by the push service
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub primary_key: Option<serde_json::Value>,
}

/// What gets displayed for a push message
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub primary_key: Option<String>,
}
