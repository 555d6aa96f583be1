//! Artist CRUD handlers.

use crate::api::AppState;
use crate::error::Error;
use crate::types::Artist;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// `GET /api/artists` - list every known artist.
#[utoipa::path(
    get,
    path = "/api/artists",
    tag = "artists",
    responses(
        (status = 200, description = "All known artists", body = inline(Object)),
    )
)]
pub async fn list_artists(State(state): State<AppState>) -> impl IntoResponse {
    let artists = state.fetcher.storage().list_artists().await;
    Json(artists)
}

/// `GET /api/artists/{id}` - fetch a single artist.
#[utoipa::path(
    get,
    path = "/api/artists/{id}",
    tag = "artists",
    params(("id" = String, Path, description = "Artist id, e.g. `patreon_12345`")),
    responses(
        (status = 200, description = "The artist", body = inline(Object)),
        (status = 404, description = "No artist with that id"),
    )
)]
pub async fn get_artist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Artist>, Error> {
    state
        .fetcher
        .storage()
        .get_artist(&id)
        .await
        .map(Json)
        .ok_or_else(|| Error::RemoteNotFound(id))
}

/// `PUT /api/artists/{id}` - create or replace an artist record.
///
/// The path id and the body's `id` field must agree; mismatches are rejected rather than
/// silently preferring one over the other.
#[utoipa::path(
    put,
    path = "/api/artists/{id}",
    tag = "artists",
    params(("id" = String, Path, description = "Artist id")),
    request_body(content = inline(Object), description = "Full artist record"),
    responses(
        (status = 200, description = "Artist stored", body = inline(Object)),
        (status = 400, description = "Path id and body id disagree"),
    )
)]
pub async fn upsert_artist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(artist): Json<Artist>,
) -> Result<impl IntoResponse, Error> {
    if artist.id != id {
        return Err(Error::config_invalid_key(
            "path id and body id must match",
            "id",
        ));
    }
    state.fetcher.storage().save_artist(artist.clone()).await?;
    Ok((StatusCode::OK, Json(artist)))
}

/// `DELETE /api/artists/{id}` - remove an artist record.
#[utoipa::path(
    delete,
    path = "/api/artists/{id}",
    tag = "artists",
    params(("id" = String, Path, description = "Artist id")),
    responses(
        (status = 204, description = "Artist removed (idempotent)"),
    )
)]
pub async fn delete_artist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    state.fetcher.storage().remove_artist(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
