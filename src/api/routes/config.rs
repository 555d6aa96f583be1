//! Global configuration handlers.

use crate::api::AppState;
use crate::config::Config;
use crate::error::Error;
use axum::{Json, extract::State, response::IntoResponse};

/// `GET /api/config` - the current global configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    responses(
        (status = 200, description = "Current configuration", body = inline(Object)),
    )
)]
pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.fetcher.storage().load_config().await)
}

/// `PUT /api/config` - replace the global configuration.
///
/// Persisted through the same [`crate::storage::Storage::save_config`] call the rest of the
/// core uses; there is no parallel write path for config.
#[utoipa::path(
    put,
    path = "/api/config",
    tag = "config",
    request_body(content = inline(Object), description = "Full replacement configuration"),
    responses(
        (status = 200, description = "Configuration stored", body = inline(Object)),
    )
)]
pub async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<Config>,
) -> Result<impl IntoResponse, Error> {
    state.fetcher.storage().save_config(config.clone()).await?;
    Ok(Json(config))
}
