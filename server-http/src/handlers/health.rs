use crate::state::AppState;
use axum::{Json, extract::State};
use harbor::worker::WorkerState;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: String,
    pub version: String,
    pub state: WorkerState,
    pub error_listeners: usize,
    pub event_subscribers: usize,
}

/// GET /__harbor/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "OK".into(),
        version: state.worker.names().version.clone(),
        state: state.worker.state(),
        error_listeners: state.errors.listener_count(),
        event_subscribers: state.event_channel.receiver_count(),
    })
}
