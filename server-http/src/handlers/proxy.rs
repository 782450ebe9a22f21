use crate::state::AppState;
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use harbor::domain::{CachedResponse, FetchRequest, RequestMode};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Every request outside `/__harbor` goes through the offline worker
pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    let fetch = match into_fetch_request(request).await {
        Ok(fetch) => fetch,
        Err(status) => return status.into_response(),
    };

    tracing::debug!(
        "FETCH: {} {} -> {:?}",
        fetch.method,
        fetch.url,
        state.worker.route(&fetch)
    );
    into_response(state.worker.handle_fetch(&fetch).await)
}

pub(crate) async fn into_fetch_request(request: Request) -> Result<FetchRequest, StatusCode> {
    let (parts, body) = request.into_parts();

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let mode = match parts.headers.get("sec-fetch-mode") {
        Some(value) if value.as_bytes().eq_ignore_ascii_case(b"navigate") => {
            RequestMode::Navigate
        }
        _ => RequestMode::Other,
    };

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    Ok(FetchRequest {
        method: parts.method,
        url,
        mode,
        headers,
        body: (!body.is_empty()).then_some(body),
    })
}

pub(crate) fn into_response(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &cached.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!("Dropping invalid response header '{}'", name),
        }
    }
    response
}
