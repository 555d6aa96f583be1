//! Thin REST API surface over the core: artists, queue, config, history, and an SSE event feed.
//!
//! No business logic lives in a route handler beyond translating a request into a call on
//! [`crate::Fetcher`] and its result back into a response; the handlers in [`routes`] are
//! deliberately thin.

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

use crate::error::Result;
use crate::Fetcher;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the router. Does not bind a listener; see [`start_api_server`] for that.
pub fn create_router(fetcher: Arc<Fetcher>) -> Router {
    let state = AppState::new(fetcher);

    let router = Router::new()
        .route("/api/artists", get(routes::list_artists))
        .route("/api/artists/:id", get(routes::get_artist))
        .route("/api/artists/:id", put(routes::upsert_artist))
        .route("/api/artists/:id", delete(routes::delete_artist))
        .route("/api/queue", get(routes::queue_status))
        .route("/api/queue", post(routes::queue_manual))
        .route("/api/queue/cancel", post(routes::cancel_queue))
        .route("/api/config", get(routes::get_config))
        .route("/api/config", put(routes::update_config))
        .route("/api/history", get(routes::get_history))
        .route("/api/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/api/events", get(routes::event_stream))
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    router
}

/// Bind `bind` and serve the REST API until the process is terminated.
pub async fn start_api_server(fetcher: Arc<Fetcher>, bind: SocketAddr) -> Result<()> {
    tracing::info!(address = %bind, "starting REST API server");

    let app = create_router(fetcher);
    let listener = TcpListener::bind(bind).await?;

    tracing::info!(address = %bind, "REST API server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::Internal(e.to_string()))?;

    tracing::info!("REST API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests;
