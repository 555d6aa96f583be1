//! Bounded work queue and timer loop driving [`crate::downloader::Downloader`].
//!
//! Two ingress paths feed one queue: `queue_manual`/`queue_batch` (operator-initiated, via the
//! shell/RPC/REST surfaces) and the timer loop (one scheduled task per artist whose effective
//! timer has come due). A fixed-size worker pool (a `tokio::sync::Semaphore` sized to
//! `max_concurrent_artists`) drains the queue; `cancel_all` empties it and aborts in-flight HTTP
//! activity without tearing down the scheduler itself.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::config::SchedulerConfig;
use crate::downloader::Downloader;
use crate::http_client::HttpClient;
use crate::storage::Storage;
use crate::types::{
    ArtistOutcome, DownloadTask, Event, EventSender, QueueStatus, TaskDedupKey, TaskKind,
    TaskStatus, TimerSchedule,
};

struct SchedulerState {
    queued: VecDeque<DownloadTask>,
    running: HashMap<TaskDedupKey, DownloadTask>,
    completed: VecDeque<DownloadTask>,
    next_run: HashMap<String, DateTime<Utc>>,
}

/// Owns the task queue, the artist-level worker pool, and the timer loop.
pub struct Scheduler {
    storage: Arc<Storage>,
    downloader: Arc<Downloader>,
    http: Arc<HttpClient>,
    state: Mutex<SchedulerState>,
    semaphore: Arc<Semaphore>,
    dispatch_interval: std::time::Duration,
    cancel_drain_timeout: std::time::Duration,
    completed_history_cap: usize,
    events: EventSender,
}

impl Scheduler {
    /// Build a scheduler. `max_workers` sizes the artist-level worker pool; the rest of
    /// `scheduler_config` governs dispatch cadence, cancellation drain timeout, and how much
    /// completed-task history is retained.
    pub fn new(
        storage: Arc<Storage>,
        downloader: Arc<Downloader>,
        http: Arc<HttpClient>,
        max_workers: usize,
        scheduler_config: &SchedulerConfig,
        events: EventSender,
    ) -> Self {
        Self {
            storage,
            downloader,
            http,
            state: Mutex::new(SchedulerState {
                queued: VecDeque::new(),
                running: HashMap::new(),
                completed: VecDeque::new(),
                next_run: HashMap::new(),
            }),
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            dispatch_interval: scheduler_config.dispatch_interval,
            cancel_drain_timeout: scheduler_config.cancel_drain_timeout,
            completed_history_cap: scheduler_config.completed_history_cap,
            events,
        }
    }

    /// Enqueue a manual task for one artist. Returns `false` without enqueuing if an
    /// equal-keyed `(artist_id, from_date, until_date)` task is already queued or running.
    pub async fn queue_manual(
        &self,
        artist_id: impl Into<String>,
        from_date: Option<DateTime<Utc>>,
        until_date: Option<DateTime<Utc>>,
    ) -> bool {
        let task = DownloadTask::new(artist_id, from_date, until_date, TaskKind::Manual);
        self.enqueue(task).await
    }

    /// Enqueue a plain manual run (no date range) for every id in `artist_ids`. Returns the
    /// number actually enqueued (duplicates are silently skipped).
    pub async fn queue_batch(&self, artist_ids: Vec<String>) -> usize {
        let mut count = 0;
        for id in artist_ids {
            if self.queue_manual(id, None, None).await {
                count += 1;
            }
        }
        count
    }

    async fn enqueue(&self, task: DownloadTask) -> bool {
        let key = task.dedup_key();
        let artist_id = task.artist_id.clone();
        {
            let mut state = self.state.lock().await;
            let duplicate = state.queued.iter().any(|t| t.dedup_key() == key) || state.running.contains_key(&key);
            if duplicate {
                return false;
            }
            state.queued.push_back(task);
        }
        let _ = self.events.send(Event::TaskQueued { artist_id });
        true
    }

    /// Current queue depth, active worker count, and completed-history length.
    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            queued: state.queued.len(),
            running: state.running.len(),
            completed: state.completed.len(),
        }
    }

    /// The most recently completed/failed/skipped tasks, newest first.
    pub async fn recent_completed(&self) -> Vec<DownloadTask> {
        let state = self.state.lock().await;
        state.completed.iter().rev().cloned().collect()
    }

    /// Clear the queue, abort in-flight HTTP activity, wait up to `cancel_drain_timeout` for
    /// running tasks to finish, log any residue, then resume HTTP activity for future tasks.
    pub async fn cancel_all(&self) {
        {
            let mut state = self.state.lock().await;
            state.queued.clear();
        }
        let _ = self.events.send(Event::CancelRequested);
        self.http.stop();

        let deadline = tokio::time::Instant::now() + self.cancel_drain_timeout;
        let mut residual;
        loop {
            residual = {
                let state = self.state.lock().await;
                state.running.len()
            };
            if residual == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(residual, "cancel_all: active tasks still running after drain timeout");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        let _ = self.events.send(Event::CancelDrained { residual });

        self.http.resume();
    }

    /// Run the combined timer-check + dispatch loop forever, ticking roughly every
    /// `dispatch_interval`. Intended to be handed to `tokio::spawn` once at startup; the
    /// returned future never resolves under normal operation.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.dispatch_interval);
        loop {
            interval.tick().await;
            self.check_timers().await;
            self.dispatch_once().await;
        }
    }

    async fn check_timers(&self) {
        let config = self.storage.load_config().await;
        let artists = self.storage.list_artists().await;
        let now = Utc::now();

        let mut state = self.state.lock().await;
        for artist in artists {
            if artist.ignore || artist.completed {
                state.next_run.remove(&artist.id);
                continue;
            }
            let Some(schedule) = artist.timer.or(config.scheduler.default_timer) else {
                state.next_run.remove(&artist.id);
                continue;
            };

            let next_run = *state
                .next_run
                .entry(artist.id.clone())
                .or_insert_with(|| compute_next_run(&schedule, now));

            if now >= next_run {
                let task = DownloadTask::new(artist.id.clone(), None, None, TaskKind::Scheduled);
                let key = task.dedup_key();
                let duplicate =
                    state.queued.iter().any(|t| t.dedup_key() == key) || state.running.contains_key(&key);
                if !duplicate {
                    state.queued.push_back(task);
                }
                state.next_run.insert(artist.id.clone(), compute_next_run(&schedule, now));
            }
        }
    }

    async fn dispatch_once(self: &Arc<Self>) {
        loop {
            let task = {
                let mut state = self.state.lock().await;
                state.queued.pop_front()
            };
            let Some(mut task) = task else { break };

            let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    let mut state = self.state.lock().await;
                    state.queued.push_front(task);
                    break;
                }
            };

            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            let key = task.dedup_key();
            {
                let mut state = self.state.lock().await;
                state.running.insert(key.clone(), task.clone());
            }
            let _ = self.events.send(Event::TaskStarted {
                artist_id: task.artist_id.clone(),
            });

            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.run_task(task, permit).await;
            });
        }
    }

    async fn run_task(self: Arc<Self>, mut task: DownloadTask, _permit: OwnedSemaphorePermit) {
        let key = task.dedup_key();
        let config = self.storage.load_config().await;

        match self.storage.get_artist(&task.artist_id).await {
            None => {
                task.status = TaskStatus::Failed;
                task.error = Some(format!("unknown artist id {}", task.artist_id));
            }
            Some(artist) => {
                match self
                    .downloader
                    .download_artist(&artist, &config, task.from_date, task.until_date)
                    .await
                {
                    Ok(ArtistOutcome::Skipped) => {
                        task.status = TaskStatus::Skipped;
                    }
                    Ok(ArtistOutcome::Ran(result)) => {
                        task.status = TaskStatus::Completed;
                        task.result = Some(result);
                    }
                    Err(e) => {
                        task.status = TaskStatus::Failed;
                        task.error = Some(e.to_string());
                    }
                }
            }
        }
        task.finished_at = Some(Utc::now());

        let artist_id = task.artist_id.clone();
        let status = task.status;
        {
            let mut state = self.state.lock().await;
            state.running.remove(&key);
            state.completed.push_back(task);
            while state.completed.len() > self.completed_history_cap {
                state.completed.pop_front();
            }
        }
        let _ = self.events.send(Event::TaskFinished { artist_id, status });
    }
}

/// Compute the next instant (strictly after `now`) a recurring schedule should fire.
fn compute_next_run(schedule: &TimerSchedule, now: DateTime<Utc>) -> DateTime<Utc> {
    match *schedule {
        TimerSchedule::Daily { time } => next_daily(now, time),
        TimerSchedule::Weekly { time, day } => next_weekly(now, time, day),
        TimerSchedule::Monthly { time, day } => next_monthly(now, time, day),
    }
}

fn next_daily(now: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(time));
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

fn next_weekly(now: DateTime<Utc>, time: NaiveTime, day: Weekday) -> DateTime<Utc> {
    let mut date = now.date_naive();
    loop {
        let candidate = Utc.from_utc_datetime(&date.and_time(time));
        if candidate > now && date.weekday() == day {
            return candidate;
        }
        date += ChronoDuration::days(1);
    }
}

fn next_monthly(now: DateTime<Utc>, time: NaiveTime, day: u32) -> DateTime<Utc> {
    let mut year = now.year();
    let mut month = now.month();
    loop {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            let candidate = Utc.from_utc_datetime(&date.and_time(time));
            if candidate > now {
                return candidate;
            }
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::{Config, RetryConfig};
    use crate::notifier::NoopNotifier;
    use crate::plugin::NoopHooks;
    use crate::proxy::ProxyPool;
    use crate::types::Artist;

    fn naive_time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    #[test]
    fn daily_advances_to_tomorrow_when_time_already_passed() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let next = next_daily(now, naive_time(9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn daily_stays_today_when_time_still_ahead() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let next = next_daily(now, naive_time(9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn weekly_picks_next_matching_weekday() {
        // 2024-06-01 is a Saturday.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let next = next_weekly(now, naive_time(9, 0), Weekday::Mon);
        assert_eq!(next.weekday(), Weekday::Mon);
        assert!(next > now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap());
    }

    #[test]
    fn monthly_wraps_december_into_january() {
        let now = Utc.with_ymd_and_hms(2024, 12, 20, 12, 0, 0).unwrap();
        let next = next_monthly(now, naive_time(9, 0), 5);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 5, 9, 0, 0).unwrap());
    }

    #[test]
    fn monthly_stays_in_month_when_day_still_ahead() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let next = next_monthly(now, naive_time(9, 0), 15);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap());
    }

    async fn test_scheduler(data_dir: &std::path::Path, cache_dir: &std::path::Path, max_workers: usize) -> Scheduler {
        let storage = Arc::new(Storage::open(data_dir).await.expect("storage"));
        let cache = Arc::new(Cache::open(cache_dir).await.expect("cache"));
        let http = Arc::new(
            HttpClient::new("https://example.invalid", RetryConfig::default(), Some(Arc::new(ProxyPool::new(vec![]))))
                .expect("http client"),
        );
        let (events, _) = tokio::sync::broadcast::channel(crate::types::EVENT_CHANNEL_CAPACITY);
        let downloader = Arc::new(Downloader::new(
            storage.clone(),
            cache,
            http.clone(),
            Arc::new(NoopHooks),
            Arc::new(NoopNotifier),
            events.clone(),
        ));
        let scheduler_config = crate::config::SchedulerConfig::default();
        Scheduler::new(storage, downloader, http, max_workers, &scheduler_config, events)
    }

    fn test_artist(id: &str) -> Artist {
        Artist {
            id: id.into(),
            service: "patreon".into(),
            user_id: "1".into(),
            name: "Example".into(),
            alias: String::new(),
            url: String::new(),
            last_date: None,
            ignore: true, // avoid any real network activity in these tests
            completed: false,
            timer: None,
            config: Default::default(),
            filter: Default::default(),
        }
    }

    #[tokio::test]
    async fn queue_manual_dedups_equal_keys() {
        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let scheduler = test_scheduler(data_dir.path(), cache_dir.path(), 2).await;

        assert!(scheduler.queue_manual("patreon_1", None, None).await);
        assert!(!scheduler.queue_manual("patreon_1", None, None).await);

        let status = scheduler.status().await;
        assert_eq!(status.queued, 1);
    }

    #[tokio::test]
    async fn queue_batch_counts_only_newly_enqueued() {
        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let scheduler = test_scheduler(data_dir.path(), cache_dir.path(), 2).await;

        scheduler.queue_manual("patreon_1", None, None).await;
        let enqueued = scheduler
            .queue_batch(vec!["patreon_1".to_string(), "patreon_2".to_string()])
            .await;
        assert_eq!(enqueued, 1);
    }

    #[tokio::test]
    async fn cancel_all_clears_queue_and_leaves_http_usable() {
        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let scheduler = test_scheduler(data_dir.path(), cache_dir.path(), 2).await;

        scheduler.queue_manual("patreon_1", None, None).await;
        scheduler.cancel_all().await;

        let status = scheduler.status().await;
        assert_eq!(status.queued, 0);
        assert!(!scheduler.http.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn dispatch_runs_queued_task_and_records_it_completed() {
        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let scheduler = Arc::new(test_scheduler(data_dir.path(), cache_dir.path(), 1).await);
        scheduler
            .storage
            .save_artist(test_artist("patreon_1"))
            .await
            .expect("save artist");

        scheduler.queue_manual("patreon_1", None, None).await;
        scheduler.dispatch_once().await;

        let mut completed = Vec::new();
        for _ in 0..50 {
            completed = scheduler.recent_completed().await;
            if !completed.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, TaskStatus::Skipped);
    }
}
