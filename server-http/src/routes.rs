use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build and configure the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/__harbor/health", get(handlers::health_check))
        // SSE error stream
        .route("/__harbor/events", get(handlers::stream_events))
        // Worker control
        .route("/__harbor/caches", get(handlers::list_caches))
        .route("/__harbor/activate", post(handlers::activate))
        .route("/__harbor/sync", post(handlers::sync))
        .route("/__harbor/push", post(handlers::push))
        // Everything else is answered by the offline worker
        .fallback(handlers::proxy)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
