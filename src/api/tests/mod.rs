// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::Fetcher;
use axum::Router;
use std::sync::Arc;
use tempfile::TempDir;

mod artists;
mod config;
mod history;
mod system;

async fn test_app() -> (Router, Arc<Fetcher>, TempDir) {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let cache_dir = tempfile::tempdir().expect("tempdir");
    let fetcher = Fetcher::open(data_dir.path(), cache_dir.path())
        .await
        .expect("open fetcher");
    let router = super::create_router(fetcher.clone());
    (router, fetcher, data_dir)
}

#[tokio::test]
async fn health_check_returns_ok() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let (app, _fetcher, _dir) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cors_headers_present() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let (app, _fetcher, _dir) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn openapi_json_is_served() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let (app, _fetcher, _dir) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
