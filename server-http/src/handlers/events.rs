use crate::state::AppState;
use axum::{
    extract::State,
    http::Uri,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use harbor::errors::{ApiError, ErrorKind};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    kind: Vec<ErrorKind>,
    retryable: Option<bool>,
}

impl EventFilter {
    /// Parse query string with CSV support for multiple values
    /// Examples: ?kind=network,server&retryable=true
    fn from_query_string(query: &str) -> Self {
        let mut filter = Self::default();

        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                match key {
                    "kind" => {
                        for raw in value.split(',') {
                            match raw.parse::<ErrorKind>() {
                                Ok(kind) => filter.kind.push(kind),
                                Err(e) => tracing::debug!("Ignoring filter: {}", e),
                            }
                        }
                    }
                    "retryable" => filter.retryable = value.trim().parse().ok(),
                    _ => {}
                }
            }
        }

        filter
    }

    fn matches(&self, error: &ApiError) -> bool {
        if !self.kind.is_empty() && !self.kind.contains(&error.kind) {
            return false;
        }
        self.retryable.is_none_or(|r| r == error.retryable)
    }
}

/// SSE endpoint that streams classified errors to clients
pub async fn stream_events(
    State(state): State<AppState>,
    uri: Uri,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = uri
        .query()
        .map(EventFilter::from_query_string)
        .unwrap_or_default();

    tracing::info!(
        "New SSE client connected. Filters: kind={:?}, retryable={:?}",
        filter.kind,
        filter.retryable
    );

    let rx = state.event_channel.subscribe();
    let stream = BroadcastStream::new(rx);

    let filtered_stream = stream.filter_map(move |result| {
        let filter = filter.clone();
        async move {
            match result {
                Ok(error) if filter.matches(&error) => Some(Ok(to_sse_event(&error))),
                Ok(_) => None,
                Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                    Some(Ok(Event::default()
                        .event("lagged")
                        .data(format!("Lagged by {} events", n))))
                }
            }
        }
    });

    Sse::new(filtered_stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// `error.network`, `error.server`, ...
fn to_sse_event(error: &ApiError) -> Event {
    let name = format!("error.{}", error.kind.as_str().to_ascii_lowercase());
    Event::default()
        .event(name)
        .json_data(error)
        .unwrap_or_else(|_| Event::default().event("error").data(error.message.clone()))
}
