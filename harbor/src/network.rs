//! reqwest-backed [`Network`] that forwards worker requests to the origin.

use crate::domain::{CachedResponse, FetchRequest};
use crate::errors::{ErrorHandler, RawError};
use crate::ports::Network;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use shared::{Error, Result};
use std::time::Duration;

/// Headers that describe one hop, not the resource
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct HttpNetwork {
    client: reqwest::Client,
    origin: String,
    errors: Option<ErrorHandler>,
}

impl HttpNetwork {
    pub fn new(
        origin: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = build_client(
            reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(connect_timeout)
                .redirect(reqwest::redirect::Policy::none()),
        )?;

        Ok(Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
            errors: None,
        })
    }

    /// Report unreachable-origin failures to `handler`'s listeners
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.errors = Some(handler);
        self
    }

    fn url_for(&self, request: &FetchRequest) -> String {
        format!("{}{}", self.origin, request.url)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse> {
        let url = self.url_for(request);
        let mut builder = self.client.request(request.method.clone(), &url);

        for (name, value) in &request.headers {
            if is_hop_by_hop(name) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::debug!("Dropping invalid header '{}'", name),
            }
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("{} {} unreachable: {}", request.method, url, e);
                let message = e.to_string();
                if let Some(handler) = &self.errors {
                    handler.handle_error(&RawError::from(e), Some(&request.url));
                }
                return Err(Error::Network(message));
            }
        };

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read body from {url}: {e}")))?;

        tracing::debug!("{} {} -> {}", request.method, url, status);
        Ok(CachedResponse::new(status, headers, body))
    }
}

/// Build a configured client. A failure is returned rather than falling back
/// to a default client without the configured timeouts.
pub(crate) fn build_client(builder: reqwest::ClientBuilder) -> Result<reqwest::Client> {
    builder
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}
