//! OpenAPI specification for the REST API surface.

use utoipa::OpenApi;

/// OpenAPI 3 documentation for kemono-fetch's REST API.
///
/// Served as JSON from `GET /openapi.json`, and rendered interactively at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "kemono-fetch REST API",
        version = "0.1.0",
        description = "Thin REST contract over the artist/queue/config/history core",
        license(name = "MIT OR Apache-2.0")
    ),
    paths(
        crate::api::routes::list_artists,
        crate::api::routes::get_artist,
        crate::api::routes::upsert_artist,
        crate::api::routes::delete_artist,
        crate::api::routes::queue_manual,
        crate::api::routes::cancel_queue,
        crate::api::routes::queue_status,
        crate::api::routes::get_config,
        crate::api::routes::update_config,
        crate::api::routes::get_history,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::TaskKind,
        crate::types::TaskStatus,
        crate::types::ArtistRunResult,
        crate::types::DownloadTask,
        crate::types::QueueStatus,
        crate::types::HistoryRecord,
        crate::error::ErrorStatus,
        crate::api::routes::HistoryQuery,
        crate::api::routes::QueueManualRequest,
        crate::api::routes::QueueManualResponse,
    )),
    tags(
        (name = "artists", description = "Artist records"),
        (name = "queue", description = "Scheduler queue"),
        (name = "config", description = "Global configuration"),
        (name = "history", description = "Command history"),
        (name = "system", description = "Health, spec, events"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_has_components_and_tags() {
        let spec = ApiDoc::openapi();
        assert!(spec.components.is_some());
        let tags = spec.tags.expect("tags");
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"artists"));
        assert!(names.contains(&"queue"));
    }

    #[test]
    fn spec_serializes_to_json() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_string(&spec).expect("serialize");
        assert!(!json.is_empty());
    }
}
