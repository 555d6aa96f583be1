use super::test_app;
use crate::types::Event;
use std::time::Duration;

#[tokio::test]
async fn fetcher_subscribers_receive_queue_events() {
    let (_app, fetcher, _dir) = test_app().await;
    let mut receiver = fetcher.subscribe();

    fetcher
        .scheduler()
        .queue_manual("patreon_12345", None, None)
        .await;

    let event = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .expect("event within timeout")
        .expect("channel alive");
    assert!(matches!(event, Event::TaskQueued { artist_id } if artist_id == "patreon_12345"));
}
