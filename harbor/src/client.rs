//! JSON API client whose calls run through the retry pipeline.

use crate::errors::{ApiError, ErrorHandler, RawError, RetryPolicy};
use crate::network::build_client;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Standard response wrapper of the backend: `{ "success": bool, "data": ... }`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

fn default_success() -> bool {
    true
}

impl<T> Envelope<T> {
    /// Unwrap `data`, turning `success: false` bodies into raw errors
    pub fn into_result(self) -> Result<Option<T>, RawError> {
        if self.success {
            return Ok(self.data);
        }

        let payload = Value::Object(self.rest);
        if ["validation", "errors", "field"]
            .iter()
            .any(|key| payload.get(key).is_some())
        {
            return Err(RawError::Validation(payload));
        }

        let message = ["error", "message", "detail"]
            .iter()
            .find_map(|key| payload.get(key).and_then(Value::as_str))
            .unwrap_or("Request was not successful")
            .to_string();
        Err(RawError::Other(message))
    }
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    handler: ErrorHandler,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        handler: ErrorHandler,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> shared::Result<Self> {
        let client = build_client(
            reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(connect_timeout),
        )?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            handler,
        })
    }

    pub fn handler(&self) -> &ErrorHandler {
        &self.handler
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        self.handler
            .with_retry(Some(path), || self.send::<(), T>(Method::GET, path, None))
            .await
    }

    /// POST under the handler's retry policy. A write that reached the server
    /// before the connection dropped can be applied twice; use [`Self::post_once`]
    /// for endpoints that are not idempotent.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        self.handler
            .with_retry(Some(path), || self.send(Method::POST, path, Some(body)))
            .await
    }

    /// POST exactly once. Failures are still classified and reported to listeners.
    pub async fn post_once<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        self.handler
            .with_policy(RetryPolicy::none())
            .with_retry(Some(path), || self.send(Method::POST, path, Some(body)))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        self.handler
            .with_retry(Some(path), || self.send::<(), T>(Method::DELETE, path, None))
            .await
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>, RawError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(RawError::Status {
                status: status.as_u16(),
                body: serde_json::from_str(&text).ok(),
            });
        }

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|e| RawError::Other(format!("Failed to parse response from {path}: {e}")))?;
        envelope.into_result()
    }
}
