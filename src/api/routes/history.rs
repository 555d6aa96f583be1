//! Command history handler.

use super::HistoryQuery;
use crate::api::AppState;
use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

const DEFAULT_LIMIT: usize = 50;

/// `GET /api/history` - recent command history, newest first.
#[utoipa::path(
    get,
    path = "/api/history",
    tag = "history",
    params(("limit" = Option<usize>, Query, description = "Maximum number of records to return (default 50)")),
    responses(
        (status = 200, description = "Recent history records", body = Vec<crate::types::HistoryRecord>),
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(state.fetcher.storage().recent_history(limit).await)
}
