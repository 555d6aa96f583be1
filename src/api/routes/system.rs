//! System handlers: health check, OpenAPI spec, SSE event stream.

use crate::api::AppState;
use crate::types::Event;
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// `GET /api/health` - liveness probe.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is up"),
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// `GET /openapi.json` - the OpenAPI 3 specification for this surface.
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification"),
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::TaskQueued { .. } => "task_queued",
        Event::TaskStarted { .. } => "task_started",
        Event::TaskFinished { .. } => "task_finished",
        Event::DownloadStarted { .. } => "download_started",
        Event::DownloadProgress { .. } => "download_progress",
        Event::DownloadComplete { .. } => "download_complete",
        Event::CancelRequested => "cancel_requested",
        Event::CancelDrained { .. } => "cancel_drained",
    }
}

/// `GET /api/events` - server-sent stream of task and download lifecycle events.
///
/// Lagging clients receive a synthetic `error` event reporting how many events were skipped,
/// then resume from the next live event; the broadcast channel never blocks a producer.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent event stream", content_type = "text/event-stream"),
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.fetcher.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(data) => Some(Ok(SseEvent::default().event(event_name(&event)).data(data))),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize event for SSE");
                None
            }
        },
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged, dropping oldest events");
            Some(Ok(SseEvent::default()
                .event("error")
                .data(format!(r#"{{"error":"lagged","skipped":{skipped}}}"#))))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
