//! Retry-forever wrapper paired with cooperative cancellation.
//!
//! Unbounded retry is only safe when paired with a way to stop: [`retry_forever`] checks
//! `cancel.is_cancelled()` before every attempt and turns a network/timeout/transport failure
//! observed while cancelled into [`Error::Cancelled`] rather than retrying it. Non-network
//! errors (remote-not-found, malformed JSON, local I/O, config) propagate on the first attempt —
//! only [`Error::Network`] is retried.

use crate::error::Error;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry `operation` indefinitely on [`Error::Network`], with a fixed `delay` between attempts,
/// checking `cancel` before each attempt. Any other error variant propagates immediately.
///
/// Cancellation wins over any sleep: the wait between attempts races the cancellation token, so
/// a `cancel_all` issued mid-backoff is observed promptly rather than after the full delay.
pub async fn retry_forever<F, Fut, T>(
    cancel: &CancellationToken,
    delay: Duration,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(Error::Network(e)) => {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                attempt += 1;
                tracing::warn!(error = %e, attempt, "network error, retrying after delay");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            Err(other) => return Err(other),
        }
    }
}
