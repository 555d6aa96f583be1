//! Optional external-facing progress notifications, independent of the structured tracing log.
//!
//! The log (via `tracing`) is the system of record; the notifier exists for an interactively-
//! attached operator who wants a human-readable progress line without grepping logs. Default
//! implementation is a no-op; [`ConsoleNotifier`] prints download start/progress (throttled to
//! roughly every 25% of a file) and stays silent on boundary events already covered by logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::http_client::DownloadCallbacks;

/// Human-facing progress reporter. Constructed disabled unless the caller opts in.
pub trait Notifier: Send + Sync {
    /// A post finished downloading (successfully or not).
    fn post_finished(&self, artist_id: &str, post_id: &str, success: bool);
    /// An artist run finished.
    fn artist_finished(&self, artist_id: &str, posts_downloaded: u64, posts_failed: u64);
}

/// Default, silent notifier.
#[derive(Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn post_finished(&self, _artist_id: &str, _post_id: &str, _success: bool) {}
    fn artist_finished(&self, _artist_id: &str, _posts_downloaded: u64, _posts_failed: u64) {}
}

/// Prints throttled progress to stdout. Opt-in: construct explicitly, never the default.
#[derive(Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn post_finished(&self, artist_id: &str, post_id: &str, success: bool) {
        if !success {
            println!("[{artist_id}] post {post_id} failed");
        }
    }

    fn artist_finished(&self, artist_id: &str, posts_downloaded: u64, posts_failed: u64) {
        println!(
            "[{artist_id}] done: {posts_downloaded} downloaded, {posts_failed} failed"
        );
    }
}

/// Adapts a [`Notifier`] into [`DownloadCallbacks`] for one file, throttling progress prints to
/// roughly every 25% of the file's size. Silent on start/complete — those are per-file noise the
/// tracing log already carries; only meaningfully-spaced progress ticks reach the console.
pub struct ThrottledFileProgress<'a> {
    name: String,
    last_reported_bucket: AtomicU64,
    println_fn: Mutex<Box<dyn FnMut(&str) + Send + 'a>>,
}

impl<'a> ThrottledFileProgress<'a> {
    /// Build a throttled callback adapter for one file download, given a sink for the
    /// formatted progress line (e.g. `|line| println!("{line}")`).
    pub fn new(name: impl Into<String>, sink: impl FnMut(&str) + Send + 'a) -> Self {
        Self {
            name: name.into(),
            last_reported_bucket: AtomicU64::new(0),
            println_fn: Mutex::new(Box::new(sink)),
        }
    }
}

impl DownloadCallbacks for ThrottledFileProgress<'_> {
    fn on_progress(&self, _name: &str, downloaded: u64, size: Option<u64>) {
        let Some(size) = size.filter(|s| *s > 0) else {
            return;
        };
        let bucket = (downloaded * 4 / size).min(4);
        let previous = self.last_reported_bucket.swap(bucket, Ordering::Relaxed);
        if bucket > previous {
            let pct = bucket * 25;
            if let Ok(mut sink) = self.println_fn.lock() {
                sink(&format!("{}: {pct}%", self.name));
            }
        }
    }
}
