use super::test_app;
use crate::types::HistoryRecord;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

#[tokio::test]
async fn history_reflects_appended_records() {
    let (app, fetcher, _dir) = test_app().await;
    fetcher
        .storage()
        .append_history(HistoryRecord {
            command: "queue_manual".to_string(),
            timestamp: Utc::now(),
            success: true,
            artist_id: Some("patreon_12345".to_string()),
            params: Default::default(),
            note: None,
        })
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let records: Vec<HistoryRecord> = serde_json::from_slice(&body).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].command, "queue_manual");
}

#[tokio::test]
async fn history_limit_is_respected() {
    let (app, fetcher, _dir) = test_app().await;
    for i in 0..5 {
        fetcher
            .storage()
            .append_history(HistoryRecord {
                command: format!("cmd_{i}"),
                timestamp: Utc::now(),
                success: true,
                artist_id: None,
                params: Default::default(),
                note: None,
            })
            .await
            .unwrap();
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/history?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let records: Vec<HistoryRecord> = serde_json::from_slice(&body).unwrap();
    assert_eq!(records.len(), 2);
}
