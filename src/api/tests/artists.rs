use super::test_app;
use crate::types::Artist;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

fn sample_artist(id: &str) -> Artist {
    Artist {
        id: id.to_string(),
        service: "patreon".to_string(),
        user_id: "12345".to_string(),
        name: "Example Artist".to_string(),
        alias: String::new(),
        url: String::new(),
        last_date: None,
        ignore: false,
        completed: false,
        timer: None,
        config: Default::default(),
        filter: Default::default(),
    }
}

#[tokio::test]
async fn get_unknown_artist_is_404() {
    let (app, _fetcher, _dir) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/artists/patreon_999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upsert_then_list_then_delete() {
    let (app, fetcher, _dir) = test_app().await;
    let artist = sample_artist("patreon_12345");
    let body = serde_json::to_vec(&artist).unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/artists/patreon_12345")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = fetcher.storage().get_artist("patreon_12345").await;
    assert!(stored.is_some());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/artists")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/artists/patreon_12345")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(fetcher.storage().get_artist("patreon_12345").await.is_none());
}

#[tokio::test]
async fn upsert_rejects_mismatched_id() {
    let (app, _fetcher, _dir) = test_app().await;
    let artist = sample_artist("patreon_12345");
    let body = serde_json::to_vec(&artist).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/artists/patreon_other")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
