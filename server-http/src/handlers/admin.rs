use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use bytes::Bytes;
use harbor::domain::{CacheInfo, Notification, PushPayload};
use harbor::planes::control::AdminOperations;
use harbor::worker::{SYNC_TAG, SyncReport};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub deleted: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    pub tag: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub notification: Notification,
    pub open_url: String,
}

/// GET /__harbor/caches
pub async fn list_caches(State(state): State<AppState>) -> Json<Vec<CacheInfo>> {
    Json(state.worker.caches().list_caches().await)
}

/// POST /__harbor/activate
pub async fn activate(State(state): State<AppState>) -> Json<ActivateResponse> {
    let deleted = state.worker.activate().await;
    info!("ACTIVATE: deleted {} stale cache(s)", deleted.len());
    Json(ActivateResponse { deleted })
}

/// POST /__harbor/sync?tag=sync-pending-actions
pub async fn sync(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncReport>, StatusCode> {
    let tag = params.tag.as_deref().unwrap_or(SYNC_TAG);
    info!("SYNC: tag={}", tag);

    state.worker.sync(tag).await.map(Json).map_err(|e| {
        tracing::error!("Background sync failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// POST /__harbor/push
///
/// An empty body is a push without payload.
pub async fn push(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PushResponse>, StatusCode> {
    let payload = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice::<PushPayload>(&body).map_err(|e| {
            tracing::debug!("Rejecting push payload: {}", e);
            StatusCode::BAD_REQUEST
        })?)
    };

    let notification = state.worker.push(payload);
    let open_url = state.worker.notification_click(&notification);
    Ok(Json(PushResponse {
        notification,
        open_url,
    }))
}
