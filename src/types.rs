//! Core data types shared across the crate.
//!
//! These mirror the persisted JSON shapes directly: [`Artist`] and [`Config`] live in
//! [`crate::storage`], [`Post`] and [`Profile`] live in [`crate::cache`], and [`DownloadTask`]/
//! [`QueueStatus`] are in-memory only, owned by [`crate::scheduler`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use utoipa::ToSchema;

/// A single attached or principal file reference on a post, as returned by the remote API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Display name of the file. Falls back to `"file"` (principal) or `"attachment"`
    /// (additional) when the remote omits it.
    pub name: String,
    /// Path or absolute URL to the file, as returned by the remote. Relative paths are
    /// resolved against the host's base URL at extraction time.
    pub path: String,
}

/// Tri-state content marker.
///
/// Avoids re-fetching a post's body once we know for certain the remote has nothing to say:
/// `Unfetched` means we have never asked, `Empty` means we asked and the remote returned
/// nothing, and `Text` holds the body we already have.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text")]
pub enum ContentSentinel {
    /// Never fetched.
    #[default]
    Unfetched,
    /// Fetched; the remote returned an empty body.
    Empty,
    /// Fetched; holds the body text.
    Text(String),
}

impl ContentSentinel {
    /// True if this sentinel represents a body we should not re-fetch.
    pub fn is_fetched(&self) -> bool {
        !matches!(self, ContentSentinel::Unfetched)
    }

    /// Borrow the text, if any was fetched and non-empty.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentSentinel::Text(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A tracked creator identity on the remote service.
///
/// Persisted by [`crate::storage::Storage`], conventionally keyed by `id = "{service}_{user_id}"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    /// Primary key, conventionally `service_userId`.
    pub id: String,
    /// Remote service name (e.g. `"patreon"`, `"fanbox"`).
    pub service: String,
    /// Remote user id within `service`.
    pub user_id: String,
    /// Display name as reported by the remote.
    pub name: String,
    /// Operator-chosen alias; falls back to `name` when empty in path rendering.
    #[serde(default)]
    pub alias: String,
    /// Remote profile URL, if known.
    #[serde(default)]
    pub url: String,
    /// Resume watermark: posts published at or before this instant are treated as already
    /// handled for a newly-adopted artist. `None` means no watermark has been established.
    #[serde(default)]
    pub last_date: Option<DateTime<Utc>>,
    /// Excluded from scheduled (timer-driven) runs.
    #[serde(default)]
    pub ignore: bool,
    /// Excluded from all runs, manual or scheduled.
    #[serde(default)]
    pub completed: bool,
    /// Per-artist recurring schedule; overrides the global timer when present.
    #[serde(default)]
    pub timer: Option<TimerSchedule>,
    /// Per-artist template/behavior overrides, merged key-by-key over the global config.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    /// Per-artist filter predicate overrides, merged key-by-key over the global filter.
    #[serde(default)]
    pub filter: HashMap<String, serde_json::Value>,
}

/// A recurring schedule attached to an artist or the global config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimerSchedule {
    /// Fires once a day at `time`.
    Daily {
        /// `HH:MM`, 24-hour, local time.
        #[serde(with = "crate::path_engine::hhmm")]
        time: chrono::NaiveTime,
    },
    /// Fires once a week, on `day`, at `time`.
    Weekly {
        /// `HH:MM`, 24-hour, local time.
        #[serde(with = "crate::path_engine::hhmm")]
        time: chrono::NaiveTime,
        /// Day of week this rule fires on.
        day: chrono::Weekday,
    },
    /// Fires once a month, on calendar day `day`, at `time`.
    Monthly {
        /// `HH:MM`, 24-hour, local time.
        #[serde(with = "crate::path_engine::hhmm")]
        time: chrono::NaiveTime,
        /// Day of month, 1-28 to stay valid across all months.
        day: u32,
    },
}

/// Per-artist durable record of a single unit of content.
///
/// **Invariant:** `done == true` implies `failed_files` is empty. Resetting `done` to `false`
/// must also clear `failed_files`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Remote post id, unique within an artist.
    pub id: String,
    /// Remote user id (denormalized from the owning artist).
    pub user: String,
    /// Remote service name (denormalized from the owning artist).
    pub service: String,
    /// Post title.
    #[serde(default)]
    pub title: String,
    /// Post body; tri-state so we can tell "empty" from "never fetched".
    #[serde(default)]
    pub content: ContentSentinel,
    /// Publish instant, as reported by the remote.
    pub published: DateTime<Utc>,
    /// Last-edited instant, if the remote reports one.
    #[serde(default)]
    pub edited: Option<DateTime<Utc>>,
    /// Instant this record was first added to our cache.
    pub added: DateTime<Utc>,
    /// Principal attachment, if any.
    #[serde(default)]
    pub file: Option<FileRef>,
    /// Additional attachments, in remote order.
    #[serde(default)]
    pub attachments: Vec<FileRef>,
    /// Opaque embed payload, passed through unmodified.
    #[serde(default)]
    pub embed: serde_json::Value,
    /// Opaque shared-file payload, passed through unmodified.
    #[serde(default)]
    pub shared_file: serde_json::Value,
    /// True once every file on this post has been downloaded successfully.
    #[serde(default)]
    pub done: bool,
    /// Names of files whose last download attempt failed.
    #[serde(default)]
    pub failed_files: Vec<String>,
}

impl Post {
    /// Enforce the `done ⇒ failed_files = ∅` invariant after any status mutation.
    pub fn mark_done(&mut self) {
        self.done = true;
        self.failed_files.clear();
    }

    /// Reset this post's status: clears `done` and `failed_files`.
    pub fn reset_status(&mut self) {
        self.done = false;
        self.failed_files.clear();
    }

    /// True if this post still needs work: not done, or has files that previously failed.
    pub fn is_undone(&self) -> bool {
        !self.done || !self.failed_files.is_empty()
    }
}

/// Cached remote metadata for an artist, refreshed on every reconcile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Total post count as last reported by the remote.
    pub post_count: u64,
    /// Instant this profile snapshot was saved.
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
}

/// Distinguishes a user-initiated fetch from a timer-initiated one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Enqueued directly via the shell, RPC, or REST API.
    Manual,
    /// Enqueued by the Scheduler's timer loop.
    Scheduled,
}

/// Lifecycle status of a [`DownloadTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Sitting in the queue, not yet dispatched.
    Queued,
    /// Currently executing on a worker.
    Running,
    /// Finished without error (may still contain per-post failures in the result).
    Completed,
    /// Aborted by `cancel_all` before or during execution.
    Cancelled,
    /// Skipped without running (artist was `ignore`d, `completed`, or cancellation was
    /// already in effect when the worker picked it up).
    Skipped,
    /// An unexpected condition aborted the task; see `error`.
    Failed,
}

/// The outcome of a completed `download_artist` invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArtistRunResult {
    /// True iff `posts_failed == 0`.
    pub success: bool,
    /// Number of posts that completed all their file downloads this run.
    pub posts_downloaded: u64,
    /// Number of posts with at least one failed file after this run.
    pub posts_failed: u64,
    /// Ids of posts that ended this run with a non-empty `failed_files`.
    pub failed_posts: Vec<String>,
}

/// In-memory record of one queued or executing fetch job.
///
/// Equality for queue deduplication purposes is `(artist_id, from_date, until_date)`,
/// independent of `kind`, `status`, or timing — see [`DownloadTask::dedup_key`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadTask {
    /// Artist this task fetches.
    pub artist_id: String,
    /// Inclusive lower bound on `published`, if this is a date-range rerun.
    #[serde(default)]
    pub from_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `published`, if this is a date-range rerun.
    #[serde(default)]
    pub until_date: Option<DateTime<Utc>>,
    /// Who enqueued this task.
    pub kind: TaskKind,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Instant this task was enqueued.
    pub queued_at: DateTime<Utc>,
    /// Instant the worker picked this task up, if it has started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Instant this task reached a terminal status, if it has.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Populated once the task reaches `Completed`.
    #[serde(default)]
    pub result: Option<ArtistRunResult>,
    /// Populated once the task reaches `Failed`.
    #[serde(default)]
    pub error: Option<String>,
}

/// The equality key used for queue deduplication.
pub type TaskDedupKey = (String, Option<DateTime<Utc>>, Option<DateTime<Utc>>);

impl DownloadTask {
    /// Create a new, queued task.
    pub fn new(
        artist_id: impl Into<String>,
        from_date: Option<DateTime<Utc>>,
        until_date: Option<DateTime<Utc>>,
        kind: TaskKind,
    ) -> Self {
        Self {
            artist_id: artist_id.into(),
            from_date,
            until_date,
            kind,
            status: TaskStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// The `(artist_id, from_date, until_date)` key two tasks are considered duplicates on.
    pub fn dedup_key(&self) -> TaskDedupKey {
        (self.artist_id.clone(), self.from_date, self.until_date)
    }
}

/// Snapshot of queue depth, active worker count, and total completed tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueStatus {
    /// Tasks waiting to be dispatched.
    pub queued: usize,
    /// Tasks currently executing.
    pub running: usize,
    /// Tasks that have reached a terminal status (bounded history, see [`crate::scheduler`]).
    pub completed: usize,
}

/// An append-only record of an invoked command, used for shell replay and the history API.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryRecord {
    /// Command name, e.g. `"queue_manual"`.
    pub command: String,
    /// Instant the command was invoked.
    pub timestamp: DateTime<Utc>,
    /// Whether the command completed successfully.
    pub success: bool,
    /// Artist this command targeted, if any.
    #[serde(default)]
    pub artist_id: Option<String>,
    /// Raw `key=value` parameters the command was invoked with.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Free-form note (e.g. an error summary).
    #[serde(default)]
    pub note: Option<String>,
}

/// Result of downloading every file attached to one post.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostResult {
    /// True iff `failed_files` is empty.
    pub success: bool,
    /// Files successfully downloaded.
    pub files_downloaded: u64,
    /// Files that failed to download.
    pub files_failed: u64,
    /// Names of files that failed.
    pub failed_files: Vec<String>,
}

/// A post's processing outcome: either skipped as empty, or carried through the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PostOutcome {
    /// Post had no files and neither `save_content` nor `save_empty_posts` applied.
    Empty,
    /// Post was processed; see the embedded [`PostResult`].
    Downloaded(PostResult),
}

/// Whether `download_artist` ran the pipeline or short-circuited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArtistOutcome {
    /// Artist was `ignore`d, `completed`, or cancellation was already in effect.
    Skipped,
    /// Pipeline ran to completion; see the embedded [`ArtistRunResult`].
    Ran(ArtistRunResult),
}

/// The shared broadcast channel [`Downloader`](crate::downloader::Downloader) and
/// [`Scheduler`](crate::scheduler::Scheduler) emit [`Event`]s onto. One sender is built at the
/// composition root and cloned into every component that raises events; `send` returning `Err`
/// (no subscribers) is not an error condition and is always ignored.
pub type EventSender = tokio::sync::broadcast::Sender<Event>;

/// Default capacity of the event broadcast channel built at the composition root.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast event emitted on the downloader's event channel.
///
/// Consumed by the REST SSE endpoint and the optional [`crate::notifier::Notifier`]; has no
/// effect on core control flow (dropped silently if nobody is subscribed).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A task was enqueued.
    TaskQueued {
        /// Artist the task targets.
        artist_id: String,
    },
    /// A task started executing.
    TaskStarted {
        /// Artist the task targets.
        artist_id: String,
    },
    /// A task reached a terminal status.
    TaskFinished {
        /// Artist the task targeted.
        artist_id: String,
        /// Terminal status reached.
        status: TaskStatus,
    },
    /// A file download started.
    DownloadStarted {
        /// File name.
        name: String,
        /// Content length, if known.
        total_size: Option<u64>,
    },
    /// A file download made progress.
    DownloadProgress {
        /// File name.
        name: String,
        /// Bytes written so far.
        downloaded: u64,
        /// Content length, if known.
        total_size: Option<u64>,
    },
    /// A file download finished, successfully or not.
    DownloadComplete {
        /// File name.
        name: String,
        /// Whether the download succeeded.
        success: bool,
    },
    /// `cancel_all` was invoked.
    CancelRequested,
    /// All active tasks drained after a cancellation (or the drain timeout elapsed).
    CancelDrained {
        /// Number of tasks still active when the drain timeout elapsed, if any.
        residual: usize,
    },
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_sentinel_default_is_unfetched() {
        assert_eq!(ContentSentinel::default(), ContentSentinel::Unfetched);
        assert!(!ContentSentinel::default().is_fetched());
    }

    #[test]
    fn content_sentinel_empty_text_has_no_as_text() {
        assert_eq!(ContentSentinel::Text(String::new()).as_text(), None);
        assert_eq!(ContentSentinel::Text("hi".into()).as_text(), Some("hi"));
    }

    #[test]
    fn post_mark_done_clears_failed_files() {
        let mut post = sample_post();
        post.failed_files = vec!["a.jpg".into()];
        post.done = false;
        post.mark_done();
        assert!(post.done);
        assert!(post.failed_files.is_empty());
    }

    #[test]
    fn post_reset_status_clears_done_and_failed_files() {
        let mut post = sample_post();
        post.done = true;
        post.failed_files = vec!["a.jpg".into()];
        post.reset_status();
        assert!(!post.done);
        assert!(post.failed_files.is_empty());
    }

    #[test]
    fn post_is_undone_when_not_done_or_has_failures() {
        let mut post = sample_post();
        post.done = false;
        post.failed_files.clear();
        assert!(post.is_undone());

        post.done = true;
        assert!(!post.is_undone());

        post.failed_files.push("a.jpg".into());
        assert!(post.is_undone());
    }

    #[test]
    fn dedup_key_ignores_kind_and_status() {
        let a = DownloadTask::new("artist_1", None, None, TaskKind::Manual);
        let b = DownloadTask::new("artist_1", None, None, TaskKind::Scheduled);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    fn sample_post() -> Post {
        Post {
            id: "p1".into(),
            user: "1".into(),
            service: "patreon".into(),
            title: "title".into(),
            content: ContentSentinel::Unfetched,
            published: Utc::now(),
            edited: None,
            added: Utc::now(),
            file: None,
            attachments: vec![],
            embed: serde_json::Value::Null,
            shared_file: serde_json::Value::Null,
            done: false,
            failed_files: vec![],
        }
    }
}
