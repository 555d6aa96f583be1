//! # kemono-fetch
//!
//! Resumable concurrent fetcher for a third-party content host: tracks artists, mirrors their
//! posts and files to a templated local layout, and resumes safely across restarts.
//!
//! ## Design Philosophy
//!
//! - **Idempotent by construction** — a rerun of an already-mirrored artist does no network
//!   work beyond a cheap profile check.
//! - **Structured failure, not propagation** — a dead file does not abort its post; a failed
//!   post does not abort its artist; a failed artist does not abort the run.
//! - **Library-first** — no CLI, shell, or RPC bridge baked in, purely a crate for embedding
//!   behind whatever surface the caller wants (an interactive shell, a REST API, a single-instance
//!   RPC bridge — all external collaborators, not part of this crate).
//!
//! ## Quick Start
//!
//! ```no_run
//! use kemono_fetch::{Fetcher, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = Fetcher::open("./data", "./cache").await?;
//!     fetcher.http().init().await?;
//!     fetcher.scheduler().queue_manual("patreon_12345", None, None).await;
//!
//!     let handle = fetcher.clone().spawn_background_loops();
//!     run_with_shutdown(&fetcher).await;
//!     handle.abort();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Thin REST API surface over the core (artists, queue, config, history, SSE events).
pub mod api;
/// Corpus-wide durable cache of per-artist profile/post metadata.
pub mod cache;
/// Configuration types.
pub mod config;
/// Fan-out pipeline mirroring one artist's posts and files to disk.
pub mod downloader;
/// Error types.
pub mod error;
/// Predicate-based post filtering.
pub mod filters;
/// Retrying, cancellable HTTP client for the remote host.
pub mod http_client;
/// Path-rename planning/execution when templates change.
pub mod migrator;
/// Optional human-facing progress notifications.
pub mod notifier;
/// Deterministic local-path rendering from templates.
pub mod path_engine;
/// Swappable artist/post path rewrite hooks.
pub mod plugin;
/// Round-robin upstream proxy pool.
pub mod proxy;
/// Cancellable infinite-retry wrapper for transient network failures.
pub mod retry;
/// Bounded work queue and timer loop driving the downloader.
pub mod scheduler;
/// Durable storage for artists, config, and history.
pub mod storage;
/// Core data model and events.
pub mod types;
/// Corpus-wide path-uniqueness audit.
pub mod validator;

use std::sync::Arc;

pub use cache::Cache;
pub use config::Config;
pub use downloader::Downloader;
pub use error::{Error, Result, ToHttpStatus};
pub use http_client::HttpClient;
pub use migrator::{plan_post_migration, MigrationPlan};
pub use notifier::{ConsoleNotifier, NoopNotifier, Notifier};
pub use plugin::{NoopHooks, PathHooks, PluginReloader};
pub use proxy::ProxyPool;
pub use scheduler::Scheduler;
pub use storage::Storage;
pub use types::{
    Artist, ArtistOutcome, ArtistRunResult, DownloadTask, Event, HistoryRecord, Post, PostOutcome,
    PostResult, Profile, QueueStatus, TaskKind, TaskStatus, TimerSchedule,
};
pub use validator::{ValidationReport, Validator};

/// Composition root: owns every long-lived handle and wires them together exactly once.
///
/// Construct with [`Fetcher::open`], then hand `Arc<Fetcher>` clones down to whatever surface
/// (REST API, RPC bridge, shell) needs them. There is exactly one of these per process; nothing
/// here is a module-level global.
pub struct Fetcher {
    storage: Arc<Storage>,
    cache: Arc<Cache>,
    http: Arc<HttpClient>,
    downloader: Arc<Downloader>,
    scheduler: Arc<Scheduler>,
    validator: Arc<Validator>,
    proxy: Arc<ProxyPool>,
    hooks: Arc<dyn PathHooks>,
    notifier: Arc<dyn Notifier>,
    events: types::EventSender,
}

impl Fetcher {
    /// Open (or initialize) durable state under `data_dir`/`cache_dir` and wire up every
    /// component. Does not start any background loop or issue any network request — call
    /// [`Fetcher::spawn_background_loops`] and `fetcher.http().init()` once the caller is ready.
    pub async fn open(
        data_dir: impl Into<std::path::PathBuf>,
        cache_dir: impl Into<std::path::PathBuf>,
    ) -> Result<Arc<Self>> {
        let storage = Arc::new(Storage::open(data_dir).await?);
        let cache = Arc::new(Cache::open(cache_dir).await?);
        let config = storage.load_config().await;

        let proxy = Arc::new(ProxyPool::new(config.proxy.endpoints.clone()));
        let http = Arc::new(HttpClient::new(
            config.base_url.clone(),
            config.retry.clone(),
            Some(proxy.clone()),
        )?);

        let hooks: Arc<dyn PathHooks> = Arc::new(NoopHooks);
        let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
        let (events, _) = tokio::sync::broadcast::channel(types::EVENT_CHANNEL_CAPACITY);

        let downloader = Arc::new(Downloader::new(
            storage.clone(),
            cache.clone(),
            http.clone(),
            hooks.clone(),
            notifier.clone(),
            events.clone(),
        ));

        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            downloader.clone(),
            http.clone(),
            config.download.max_concurrent_artists,
            &config.scheduler,
            events.clone(),
        ));

        let validator = Arc::new(Validator::new(storage.data_dir()));

        Ok(Arc::new(Self {
            storage,
            cache,
            http,
            downloader,
            scheduler,
            validator,
            proxy,
            hooks,
            notifier,
            events,
        }))
    }

    /// Durable artist/config/history storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Per-artist cached post metadata.
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// The shared HTTP client (also the sole owner of the cancellation token).
    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    /// The artist mirroring pipeline.
    pub fn downloader(&self) -> &Arc<Downloader> {
        &self.downloader
    }

    /// The task queue and timer loop.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The path-uniqueness auditor.
    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// The round-robin upstream proxy pool.
    pub fn proxy(&self) -> &Arc<ProxyPool> {
        &self.proxy
    }

    /// The currently-installed artist/post path rewrite hooks.
    pub fn hooks(&self) -> &Arc<dyn PathHooks> {
        &self.hooks
    }

    /// The installed progress notifier.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Subscribe to the shared [`Event`] broadcast channel (task lifecycle and per-file download
    /// progress). Intended for the REST API's SSE endpoint; lagging subscribers drop the oldest
    /// unread events rather than blocking producers.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Spawn the scheduler's timer+dispatch loop as a background task. Returns a handle the
    /// caller can `.abort()` on shutdown; dropping the handle does not stop the task (tokio
    /// `JoinHandle` semantics), so hang on to it if you want to stop cleanly.
    pub fn spawn_background_loops(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    /// Spawn the REST API server if `config.api.enabled`, on `config.api.bind`. Returns `None`
    /// without spawning anything when the surface is disabled. Matches
    /// [`Self::spawn_background_loops`]'s "caller owns the handle" contract.
    pub async fn spawn_api_server(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let config = self.storage.load_config().await;
        if !config.api.enabled {
            return None;
        }
        let fetcher = self.clone();
        let bind = config.api.bind;
        Some(tokio::spawn(async move {
            if let Err(e) = crate::api::start_api_server(fetcher, bind).await {
                tracing::error!(error = %e, "REST API server exited with an error");
            }
        }))
    }

    /// Request cancellation of all in-flight and queued work, then resume normal operation
    /// (future `queue_manual`/timer-driven tasks work again once this returns).
    pub async fn cancel_all(&self) {
        self.scheduler.cancel_all().await;
    }
}

/// Run until a termination signal arrives, then request cancellation of all in-flight work.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(fetcher: &Fetcher) {
    wait_for_signal().await;
    fetcher.cancel_all().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
