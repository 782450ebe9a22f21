use crate::domain::{CachedResponse, FetchRequest};
use crate::planes::control::{AdminOperations, CacheManager};
use crate::ports::Network;
use serde_json::json;
use std::sync::Arc;

/// Request headers that make a response specific to one caller
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "cookie"];

/// What to answer when neither the network nor any cache can
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fallback {
    /// 503 JSON body for API callers
    Json,
    /// Cached offline document, else plain 404
    OfflinePage(String),
    /// Plain 404
    NotFound,
}

/// The two caching strategies, shared by every route
#[derive(Clone)]
pub struct FetchStrategies {
    caches: CacheManager,
    network: Arc<dyn Network>,
}

impl FetchStrategies {
    pub fn new(caches: CacheManager, network: Arc<dyn Network>) -> Self {
        Self { caches, network }
    }

    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Serve from cache when present, otherwise fetch and populate `cache_name`
    pub async fn cache_first(&self, request: &FetchRequest, cache_name: &str) -> CachedResponse {
        if let Some(cached) = self.caches.match_any(&request.url).await {
            tracing::debug!("cache hit: {}", request.url);
            return cached;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(cache_name, request, &response).await;
                response
            }
            Err(e) => {
                tracing::warn!("Static asset {} unavailable: {}", request.url, e);
                not_found()
            }
        }
    }

    /// Try the network, keep a copy in `cache_name`, fall back to any cached match
    pub async fn network_first(
        &self,
        request: &FetchRequest,
        cache_name: &str,
        fallback: &Fallback,
    ) -> CachedResponse {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(cache_name, request, &response).await;
                return response;
            }
            Err(e) => {
                tracing::info!("Network failed for {}, trying cache: {}", request.url, e);
            }
        }

        if let Some(cached) = self.caches.match_any(&request.url).await {
            return cached;
        }

        match fallback {
            Fallback::Json => offline_json(),
            Fallback::OfflinePage(page) => match self.caches.match_any(page).await {
                Some(offline) => offline,
                None => {
                    tracing::warn!("No cached offline page at {}", page);
                    not_found()
                }
            },
            Fallback::NotFound => not_found(),
        }
    }

    async fn store(&self, cache_name: &str, request: &FetchRequest, response: &CachedResponse) {
        let Some(copy) = shareable_copy(request, response) else {
            tracing::debug!("Not caching {} ({})", request.url, response.status);
            return;
        };

        let cache = self.caches.open_cache(cache_name).await;
        if let Err(e) = cache.put(request.url.clone(), copy).await {
            tracing::warn!("Failed to cache {} in '{}': {}", request.url, cache_name, e);
        }
    }
}

/// The copy of `response` that may be served to any client, or `None` when it
/// must not be stored.
///
/// Only 2xx responses are kept. `no-store` and `private` responses are never
/// kept, and neither are answers to credentialed requests unless the origin
/// marked them `public`. `set-cookie` is always dropped.
pub(crate) fn shareable_copy(
    request: &FetchRequest,
    response: &CachedResponse,
) -> Option<CachedResponse> {
    if !response.is_ok() {
        return None;
    }

    let directives = cache_control(response);
    if directives
        .iter()
        .any(|d| d == "no-store" || d == "private")
    {
        return None;
    }

    let credentialed = CREDENTIAL_HEADERS
        .iter()
        .any(|name| request.header(name).is_some());
    if credentialed && !directives.iter().any(|d| d == "public") {
        return None;
    }

    let headers = response
        .headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("set-cookie"))
        .cloned()
        .collect();
    Some(CachedResponse::new(
        response.status,
        headers,
        response.body.clone(),
    ))
}

/// Lowercased `Cache-Control` directive names, arguments dropped
fn cache_control(response: &CachedResponse) -> Vec<String> {
    response
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("cache-control"))
        .flat_map(|(_, value)| value.split(','))
        .filter_map(|directive| directive.split('=').next())
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

pub(crate) fn not_found() -> CachedResponse {
    CachedResponse::text(404, "Not found")
}

pub(crate) fn offline_json() -> CachedResponse {
    CachedResponse::json(
        503,
        &json!({
            "success": false,
            "error": "offline",
            "message": "You are offline and this data is not cached.",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(headers: &[(&str, &str)]) -> CachedResponse {
        CachedResponse::new(
            200,
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            "{}",
        )
    }

    #[test]
    fn test_cache_control_directives() {
        let response = response_with(&[("Cache-Control", "max-age=60, Private=\"x\"")]);
        assert_eq!(cache_control(&response), vec!["max-age", "private"]);
    }

    #[test]
    fn test_shareable_copy_rules() {
        let anonymous = FetchRequest::get("/api/v1/rates");
        let signed_in = FetchRequest::get("/api/v1/rates").with_header("Cookie", "session=a");

        assert!(shareable_copy(&anonymous, &response_with(&[])).is_some());
        assert!(shareable_copy(&anonymous, &CachedResponse::text(500, "boom")).is_none());
        assert!(
            shareable_copy(&anonymous, &response_with(&[("cache-control", "no-store")])).is_none()
        );
        assert!(shareable_copy(&signed_in, &response_with(&[])).is_none());

        let public = shareable_copy(
            &signed_in,
            &response_with(&[("cache-control", "public, max-age=300"), ("Set-Cookie", "s=1")]),
        )
        .unwrap();
        assert_eq!(public.header("set-cookie"), None);
        assert_eq!(public.header("cache-control"), Some("public, max-age=300"));
    }
}
