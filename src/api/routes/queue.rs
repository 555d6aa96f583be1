//! Queue-wide operation handlers: manual enqueue, cancel-all, status.

use super::{QueueManualRequest, QueueManualResponse};
use crate::api::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// `POST /api/queue` - enqueue a manual fetch for one artist.
#[utoipa::path(
    post,
    path = "/api/queue",
    tag = "queue",
    request_body = QueueManualRequest,
    responses(
        (status = 200, description = "Enqueue result", body = QueueManualResponse),
    )
)]
pub async fn queue_manual(
    State(state): State<AppState>,
    Json(request): Json<QueueManualRequest>,
) -> impl IntoResponse {
    let enqueued = state
        .fetcher
        .scheduler()
        .queue_manual(request.artist_id, request.from_date, request.until_date)
        .await;
    Json(QueueManualResponse { enqueued })
}

/// `POST /api/queue/cancel` - cancel every queued and in-flight task.
#[utoipa::path(
    post,
    path = "/api/queue/cancel",
    tag = "queue",
    responses(
        (status = 204, description = "Cancellation requested and drained"),
    )
)]
pub async fn cancel_queue(State(state): State<AppState>) -> impl IntoResponse {
    state.fetcher.cancel_all().await;
    StatusCode::NO_CONTENT
}

/// `GET /api/queue` - current queue depth, running count, and completed-history length.
#[utoipa::path(
    get,
    path = "/api/queue",
    tag = "queue",
    responses(
        (status = 200, description = "Queue status", body = crate::types::QueueStatus),
    )
)]
pub async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.fetcher.scheduler().status().await)
}
