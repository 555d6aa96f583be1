use super::test_app;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

#[tokio::test]
async fn get_config_returns_current_config() {
    let (app, _fetcher, _dir) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/config")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let config: crate::config::Config = serde_json::from_slice(&body).unwrap();
    assert_eq!(config.base_url, "https://kemono.cr");
}

#[tokio::test]
async fn put_config_persists_changes() {
    let (app, fetcher, _dir) = test_app().await;
    let mut config = fetcher.storage().load_config().await;
    config.download.max_concurrent_artists = 7;
    let body = serde_json::to_vec(&config).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/config")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let reloaded = fetcher.storage().load_config().await;
    assert_eq!(reloaded.download.max_concurrent_artists, 7);
}
