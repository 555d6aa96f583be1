//! Fan-out pipeline that mirrors one artist's posts and files to local disk.
//!
//! Three nested levels of concurrency, each independently bounded: artists (owned by
//! [`crate::scheduler`]), posts (`max_concurrent_posts`), and files within a post
//! (`max_concurrent_files`). Every level returns a structured result instead of propagating a
//! partial failure upward — a single dead file must not abort its sibling files, and a single
//! failed post must not abort its sibling posts. `?` is reserved for within-one-unit-of-work
//! errors (a malformed remote payload, a cancelled token) and for the top-level artist result.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::cache::{dedupe_by_id_stable, Cache};
use crate::config::{Config, FilterConfig};
use crate::error::{Error, Result};
use crate::filters::{apply_filters, merge_filter_config};
use crate::http_client::{DownloadCallbacks, HttpClient};
use crate::notifier::Notifier;
use crate::path_engine::{
    format_artist_folder_hooked, format_files_names, format_post_folder_hooked, ArtistParams,
    PostFolderParams,
};
use crate::plugin::PathHooks;
use crate::storage::Storage;
use crate::types::{
    Artist, ArtistOutcome, ArtistRunResult, ContentSentinel, Event, EventSender, FileRef, Post,
    PostOutcome, PostResult, Profile,
};

/// Owns the HTTP client, cache, and storage handles needed to mirror one or more artists.
///
/// Built once at the composition root and shared (behind an `Arc`) with [`crate::scheduler`].
pub struct Downloader {
    storage: Arc<Storage>,
    cache: Arc<Cache>,
    http: Arc<HttpClient>,
    hooks: Arc<dyn PathHooks>,
    notifier: Arc<dyn Notifier>,
    events: EventSender,
}

impl Downloader {
    /// Build a downloader from its already-constructed dependencies.
    pub fn new(
        storage: Arc<Storage>,
        cache: Arc<Cache>,
        http: Arc<HttpClient>,
        hooks: Arc<dyn PathHooks>,
        notifier: Arc<dyn Notifier>,
        events: EventSender,
    ) -> Self {
        Self {
            storage,
            cache,
            http,
            hooks,
            notifier,
            events,
        }
    }

    /// Mirror one artist: refresh the post list, select a working set, download it, and
    /// recompute the resume watermark.
    ///
    /// Short-circuits to [`ArtistOutcome::Skipped`] if the artist is `ignore`d, `completed`, or
    /// cancellation is already in effect — a worker that is handed a task after `cancel_all` was
    /// called should not start new network activity.
    pub async fn download_artist(
        &self,
        artist: &Artist,
        config: &Config,
        from_date: Option<DateTime<Utc>>,
        until_date: Option<DateTime<Utc>>,
    ) -> Result<ArtistOutcome> {
        if self.http.cancellation_token().is_cancelled() {
            return Ok(ArtistOutcome::Skipped);
        }
        if artist.ignore || artist.completed {
            return Ok(ArtistOutcome::Skipped);
        }

        self.update_posts_basic(artist).await?;

        let working_set = if from_date.is_some() || until_date.is_some() {
            self.cache
                .load_posts(&artist.id)
                .await
                .into_iter()
                .filter(|p| {
                    from_date.map(|d| p.published > d).unwrap_or(true)
                        && until_date.map(|d| p.published <= d).unwrap_or(true)
                })
                .collect::<Vec<_>>()
        } else {
            self.cache.get_undone(&artist.id).await
        };

        let artist_filter = parse_artist_filter(&artist.filter);
        let merged_filter = merge_filter_config(&config.filter, &artist_filter);
        let filtered: Vec<Post> = working_set
            .into_iter()
            .filter(|p| apply_filters(p, &merged_filter))
            .collect();

        let result = self.download_posts(artist, config, filtered).await?;

        let all_posts = self.cache.load_posts(&artist.id).await;
        if let Some(new_watermark) = calculate_new_last_date(&all_posts, artist.last_date) {
            let mut updated = artist.clone();
            updated.last_date = Some(new_watermark);
            self.storage.save_artist(updated).await?;
        }

        self.notifier
            .artist_finished(&artist.id, result.posts_downloaded, result.posts_failed);

        Ok(ArtistOutcome::Ran(result))
    }

    /// Refresh an artist's post list from the remote's cheap summary endpoints.
    ///
    /// Returns `false` (no work done beyond a profile stamp) when the remote's `post_count`
    /// still matches the cached list length — the common case on a re-run with nothing new.
    /// Otherwise fetches the full list, merges it against the cache (existing posts keep their
    /// `done`/`failed_files`; genuinely new posts start `done = false`, except that a brand-new
    /// artist's posts published at or before its `last_date` are pre-marked done so adoption
    /// does not re-download a creator's entire back catalog), and persists.
    pub async fn update_posts_basic(&self, artist: &Artist) -> Result<bool> {
        let profile_value = self.http.get_profile(&artist.service, &artist.user_id).await?;
        let profile = parse_profile(&profile_value)?;

        let cached_posts = self.cache.load_posts(&artist.id).await;
        let was_empty = cached_posts.is_empty();

        if profile.post_count == cached_posts.len() as u64 {
            self.cache.save_profile(&artist.id, profile).await?;
            return Ok(false);
        }

        let remote_values = self
            .http
            .get_all_posts(&artist.service, &artist.user_id)
            .await?;
        let now = Utc::now();
        let remote_posts: Vec<Post> = remote_values
            .iter()
            .filter_map(|v| parse_remote_post(v, &artist.service, &artist.user_id, now).ok())
            .collect();
        let remote_posts = dedupe_by_id_stable(remote_posts);

        if remote_posts.len() == cached_posts.len() {
            self.cache.save_profile(&artist.id, profile).await?;
            return Ok(false);
        }

        let existing_by_id: HashMap<String, Post> = cached_posts
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let merged: Vec<Post> = remote_posts
            .into_iter()
            .map(|mut post| {
                if let Some(existing) = existing_by_id.get(&post.id) {
                    post.added = existing.added;
                    post.done = existing.done;
                    post.failed_files = existing.failed_files.clone();
                } else {
                    post.done = false;
                    if was_empty {
                        if let Some(last_date) = artist.last_date {
                            if post.published <= last_date {
                                post.mark_done();
                            }
                        }
                    }
                }
                post
            })
            .collect();

        self.cache.save_posts(&artist.id, merged).await?;
        self.cache.save_profile(&artist.id, profile).await?;
        Ok(true)
    }

    /// Re-fetch every cached post individually and reconcile its file/attachment list against
    /// what is recorded locally.
    ///
    /// Local is treated as a superset: a post is only flagged changed (and reset to `done =
    /// false`) when the remote reports a `{name, path}` pair that local does not already have.
    /// A remote that dropped a file local already downloaded is not itself a change — see
    /// Design Notes on this permissiveness. Per-post fetch failures are logged and leave that
    /// post's cached copy untouched rather than aborting the whole refresh. Returns the number
    /// of posts whose file list changed.
    pub async fn update_posts_full(&self, artist: &Artist, config: &Config) -> Result<usize> {
        let posts = self.cache.load_posts(&artist.id).await;
        let max_concurrent_posts =
            effective_usize(artist, "max_concurrent_posts", config.download.max_concurrent_posts);

        let refreshed: Vec<(Post, bool)> = stream::iter(posts.into_iter().map(|post| async move {
            let post_id = post.id.clone();
            match self
                .http
                .get_post(&artist.service, &artist.user_id, &post_id)
                .await
            {
                Ok(value) => {
                    match parse_remote_post(&value, &artist.service, &artist.user_id, post.added) {
                        Ok(remote) => {
                            let changed = remote_introduces_new_file(
                                &post.file,
                                &post.attachments,
                                &remote.file,
                                &remote.attachments,
                            );
                            let mut merged = post;
                            merged.title = remote.title;
                            merged.content = remote.content;
                            merged.edited = remote.edited;
                            merged.embed = remote.embed;
                            merged.shared_file = remote.shared_file;
                            if changed {
                                merged.file = remote.file;
                                merged.attachments = remote.attachments;
                                merged.done = false;
                            }
                            (merged, changed)
                        }
                        Err(e) => {
                            tracing::warn!(post_id = %post_id, error = %e, "full refresh: malformed remote post, keeping cached copy");
                            (post, false)
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(post_id = %post_id, error = %e, "full refresh: fetch failed, keeping cached copy");
                    (post, false)
                }
            }
        }))
        .buffer_unordered(max_concurrent_posts.max(1))
        .collect()
        .await;

        let changed_count = refreshed.iter().filter(|(_, changed)| *changed).count();
        let merged_posts: Vec<Post> = refreshed.into_iter().map(|(post, _)| post).collect();
        self.cache.save_posts(&artist.id, merged_posts).await?;
        Ok(changed_count)
    }

    /// Download every post in `posts` concurrently (bounded by `max_concurrent_posts`),
    /// persisting each post's status to the cache as it finishes, and aggregate the run result.
    async fn download_posts(
        &self,
        artist: &Artist,
        config: &Config,
        posts: Vec<Post>,
    ) -> Result<ArtistRunResult> {
        let save_content = effective_bool(artist, "save_content", config.download.save_content);
        let max_concurrent_posts =
            effective_usize(artist, "max_concurrent_posts", config.download.max_concurrent_posts);

        let outcomes: Vec<(String, Result<PostOutcome>)> =
            stream::iter(posts.into_iter().map(|post| async move {
                let mut working = post;
                let needs_files = working.file.is_none() && working.attachments.is_empty();
                let needs_content = save_content && !working.content.is_fetched();
                if needs_files || needs_content {
                    let fallback = working.clone();
                    working = self
                        .refresh_post_content(artist, working, needs_files, needs_content)
                        .await
                        .unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "failed to fetch full post content before download");
                            fallback
                        });
                }
                let post_id = working.id.clone();
                let outcome = self.download_post(artist, config, &working).await;
                self.persist_post_outcome(&artist.id, &post_id, &working, &outcome)
                    .await;
                (post_id, outcome)
            }))
            .buffer_unordered(max_concurrent_posts.max(1))
            .collect()
            .await;

        let mut posts_downloaded = 0u64;
        let mut posts_failed = 0u64;
        let mut failed_posts = Vec::new();

        for (post_id, outcome) in outcomes {
            match outcome {
                Ok(PostOutcome::Empty) => {
                    posts_downloaded += 1;
                    self.notifier.post_finished(&artist.id, &post_id, true);
                }
                Ok(PostOutcome::Downloaded(result)) => {
                    if result.success {
                        posts_downloaded += 1;
                    } else {
                        posts_failed += 1;
                        failed_posts.push(post_id.clone());
                    }
                    self.notifier
                        .post_finished(&artist.id, &post_id, result.success);
                }
                Err(e) => {
                    tracing::warn!(post_id = %post_id, error = %e, "post download aborted");
                    posts_failed += 1;
                    failed_posts.push(post_id.clone());
                    self.notifier.post_finished(&artist.id, &post_id, false);
                }
            }
        }

        Ok(ArtistRunResult {
            success: posts_failed == 0,
            posts_downloaded,
            posts_failed,
            failed_posts,
        })
    }

    async fn persist_post_outcome(
        &self,
        artist_id: &str,
        post_id: &str,
        post: &Post,
        outcome: &Result<PostOutcome>,
    ) {
        let content = Some(post.content.clone());
        let update_result = match outcome {
            Ok(PostOutcome::Empty) => self.cache.update_post(artist_id, post_id, true, None, content).await,
            Ok(PostOutcome::Downloaded(result)) if result.success => {
                self.cache.update_post(artist_id, post_id, true, None, content).await
            }
            Ok(PostOutcome::Downloaded(result)) => {
                self.cache
                    .update_post(artist_id, post_id, false, Some(result.failed_files.clone()), content)
                    .await
            }
            Err(_) => Ok(()),
        };
        if let Err(e) = update_result {
            tracing::warn!(post_id = %post_id, error = %e, "failed to persist post status");
        }
    }

    /// Fetch one post's full content/file list via the single-post endpoint. `needs_files` and
    /// `needs_content` are independent triggers (either alone is enough to fetch), and each
    /// gates only the fields it names: a post missing its file list gets `file`/`attachments`
    /// applied, a post still carrying the unfetched content sentinel gets `content` applied.
    /// `embed`/`shared_file` are pass-through metadata and always refreshed once fetched.
    async fn refresh_post_content(
        &self,
        artist: &Artist,
        mut post: Post,
        needs_files: bool,
        needs_content: bool,
    ) -> Result<Post> {
        let value = self
            .http
            .get_post(&artist.service, &artist.user_id, &post.id)
            .await?;
        let remote = parse_remote_post(&value, &artist.service, &artist.user_id, post.added)?;
        if needs_files {
            post.file = remote.file;
            post.attachments = remote.attachments;
        }
        if needs_content {
            post.content = remote.content;
        }
        post.embed = remote.embed;
        post.shared_file = remote.shared_file;
        Ok(post)
    }

    /// Download one post's content and files to their rendered local paths.
    async fn download_post(&self, artist: &Artist, config: &Config, post: &Post) -> Result<PostOutcome> {
        if self.http.cancellation_token().is_cancelled() {
            return Err(Error::Cancelled);
        }

        let save_content = effective_bool(artist, "save_content", config.download.save_content);
        let save_empty_posts =
            effective_bool(artist, "save_empty_posts", config.download.save_empty_posts);
        let files = extract_files(&config.base_url, post);

        if files.is_empty() && !save_empty_posts && !save_content {
            return Ok(PostOutcome::Empty);
        }

        let templates = crate::validator::effective_templates(&config.templates, &artist.config);
        let artist_params = ArtistParams::from_artist(artist);
        let artist_folder =
            format_artist_folder_hooked(&artist_params, &templates.artist_folder, self.hooks.as_ref());
        let post_params = PostFolderParams::from_post(post);
        let post_folder = format_post_folder_hooked(
            &post_params,
            &templates.post_folder,
            &templates.date_format,
            self.hooks.as_ref(),
        );
        let post_dir = config.download.download_dir.join(&artist_folder).join(&post_folder);
        tokio::fs::create_dir_all(&post_dir).await?;

        if save_content {
            if let Some(text) = post.content.as_text() {
                tokio::fs::write(post_dir.join("content.txt"), text.as_bytes()).await?;
            }
        }

        if files.is_empty() {
            return Ok(PostOutcome::Empty);
        }

        let originals: Vec<FileRef> = files
            .iter()
            .map(|(_, name)| FileRef {
                name: name.clone(),
                path: String::new(),
            })
            .collect();
        let rendered_names = format_files_names(
            &originals,
            &templates.file_name,
            config.download.rename_images_only,
            &config.download.image_extensions,
        );

        let max_concurrent_files =
            effective_usize(artist, "max_concurrent_files", config.download.max_concurrent_files);

        let downloads: Vec<(String, Result<bool>)> = stream::iter(
            files
                .into_iter()
                .zip(rendered_names)
                .map(|((url, original_name), rendered)| {
                    let dest = post_dir.join(&rendered);
                    let callbacks = EventCallbacks::new(&self.events);
                    async move {
                        let result = self.http.download_file(&url, &dest, &callbacks).await;
                        (original_name, result)
                    }
                }),
        )
        .buffer_unordered(max_concurrent_files.max(1))
        .collect()
        .await;

        let mut files_downloaded = 0u64;
        let mut files_failed = 0u64;
        let mut failed_files = Vec::new();
        for (name, result) in downloads {
            match result {
                Ok(_) => files_downloaded += 1,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "file download failed");
                    files_failed += 1;
                    failed_files.push(name);
                }
            }
        }

        Ok(PostOutcome::Downloaded(PostResult {
            success: failed_files.is_empty(),
            files_downloaded,
            files_failed,
            failed_files,
        }))
    }
}

/// Adapts one file's [`DownloadCallbacks`] into [`Event`]s on the shared broadcast channel.
/// Mirrors [`crate::notifier::ThrottledFileProgress`] in shape but fans out to the event bus
/// instead of a console line — the two are independent consumers of the same download.
struct EventCallbacks<'a> {
    events: &'a EventSender,
}

impl<'a> EventCallbacks<'a> {
    fn new(events: &'a EventSender) -> Self {
        Self { events }
    }
}

impl DownloadCallbacks for EventCallbacks<'_> {
    fn on_start(&self, name: &str, size: Option<u64>) {
        let _ = self.events.send(Event::DownloadStarted {
            name: name.to_string(),
            total_size: size,
        });
    }

    fn on_progress(&self, name: &str, downloaded: u64, size: Option<u64>) {
        let _ = self.events.send(Event::DownloadProgress {
            name: name.to_string(),
            downloaded,
            total_size: size,
        });
    }

    fn on_complete(&self, name: &str, ok: bool) {
        let _ = self.events.send(Event::DownloadComplete {
            name: name.to_string(),
            success: ok,
        });
    }
}

/// Recompute the resume watermark by walking `posts` (sorted by `published` ascending) forward
/// from `current`, advancing through consecutive `done` posts and stopping at the first one that
/// is not. Returns `Some` only if the walk produced a value strictly greater than `current`.
fn calculate_new_last_date(posts: &[Post], current: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    let mut sorted: Vec<&Post> = posts.iter().collect();
    sorted.sort_by_key(|p| p.published);

    let mut new_watermark: Option<DateTime<Utc>> = None;
    for post in sorted {
        let after_current = current.map(|cur| post.published > cur).unwrap_or(true);
        if !after_current {
            continue;
        }
        if post.done {
            new_watermark = Some(post.published);
        } else {
            break;
        }
    }

    match (new_watermark, current) {
        (Some(new), Some(cur)) if new > cur => Some(new),
        (Some(new), None) => Some(new),
        _ => None,
    }
}

/// Extract `(url, name)` pairs for a post's principal file and attachments, in that order,
/// resolving relative paths against `base_url` and dropping entries with an empty path.
fn extract_files(base_url: &str, post: &Post) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Some(file) = &post.file {
        if !file.path.is_empty() {
            out.push((
                resolve_url(base_url, &file.path),
                if file.name.is_empty() { "file".to_string() } else { file.name.clone() },
            ));
        }
    }
    for attachment in &post.attachments {
        if !attachment.path.is_empty() {
            out.push((
                resolve_url(base_url, &attachment.path),
                if attachment.name.is_empty() {
                    "attachment".to_string()
                } else {
                    attachment.name.clone()
                },
            ));
        }
    }
    out
}

fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

/// True if `remote_file`/`remote_attachments` contains a `{name, path}` pair absent from the
/// local set. Local is a superset of remote in the common case, so this is the only direction
/// that counts as a change.
fn remote_introduces_new_file(
    local_file: &Option<FileRef>,
    local_attachments: &[FileRef],
    remote_file: &Option<FileRef>,
    remote_attachments: &[FileRef],
) -> bool {
    let local_set: HashSet<(&str, &str)> = local_file
        .iter()
        .chain(local_attachments.iter())
        .map(|f| (f.name.as_str(), f.path.as_str()))
        .collect();
    remote_file
        .iter()
        .chain(remote_attachments.iter())
        .any(|f| !local_set.contains(&(f.name.as_str(), f.path.as_str())))
}

fn effective_bool(artist: &Artist, key: &str, default: bool) -> bool {
    artist.config.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn effective_usize(artist: &Artist, key: &str, default: usize) -> usize {
    artist
        .config
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// Build a [`FilterConfig`] out of an artist's loosely-typed `filter` override map.
fn parse_artist_filter(raw: &HashMap<String, Value>) -> FilterConfig {
    FilterConfig {
        include_keywords: raw
            .get("include_keywords")
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
        exclude_keywords: raw
            .get("exclude_keywords")
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
        require_all_keywords: raw
            .get("require_all_keywords")
            .and_then(|v| serde_json::from_value(v.clone()).ok()),
        require_files: raw.get("require_files").and_then(Value::as_bool),
        require_attachments: raw.get("require_attachments").and_then(Value::as_bool),
        published_after: raw.get("published_after").and_then(|v| v.as_str().map(String::from)),
        published_before: raw.get("published_before").and_then(|v| v.as_str().map(String::from)),
    }
}

fn parse_profile(value: &Value) -> Result<Profile> {
    let post_count = value
        .get("post_count")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::RemoteMalformed("profile missing post_count".to_string()))?;
    Ok(Profile {
        post_count,
        cached_at: None,
    })
}

fn parse_file_ref(value: &Value) -> Option<FileRef> {
    if value.is_null() {
        return None;
    }
    let name = value.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let path = value.get("path").and_then(Value::as_str).unwrap_or_default().to_string();
    if name.is_empty() && path.is_empty() {
        None
    } else {
        Some(FileRef { name, path })
    }
}

fn parse_remote_datetime(value: Option<&Value>) -> Result<DateTime<Utc>> {
    let raw = value
        .and_then(Value::as_str)
        .ok_or_else(|| Error::RemoteMalformed("missing date field".to_string()))?;
    parse_datetime_str(raw)
}

fn parse_datetime_str(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Parse one remote post JSON object into a [`Post`], stamping a freshly-materialized post
/// (one not already in the cache) with `added` and defaulting `done`/`failed_files` to empty.
fn parse_remote_post(
    value: &Value,
    service: &str,
    user_id: &str,
    added: DateTime<Utc>,
) -> Result<Post> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::RemoteMalformed("post missing id".to_string()))?
        .to_string();
    let title = value.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
    let content_text = value.get("content").and_then(Value::as_str).unwrap_or_default();
    let content = if content_text.is_empty() {
        ContentSentinel::Empty
    } else {
        ContentSentinel::Text(content_text.to_string())
    };
    let published = parse_remote_datetime(value.get("published"))?;
    let edited = value
        .get("edited")
        .and_then(Value::as_str)
        .and_then(|s| parse_datetime_str(s).ok());
    let file = value.get("file").and_then(parse_file_ref);
    let attachments = value
        .get("attachments")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(parse_file_ref).collect())
        .unwrap_or_default();
    let embed = value.get("embed").cloned().unwrap_or(Value::Null);
    let shared_file = value.get("shared_file").cloned().unwrap_or(Value::Null);

    Ok(Post {
        id,
        user: value.get("user").and_then(Value::as_str).unwrap_or(user_id).to_string(),
        service: value.get("service").and_then(Value::as_str).unwrap_or(service).to_string(),
        title,
        content,
        published,
        edited,
        added,
        file,
        attachments,
        embed,
        shared_file,
        done: false,
        failed_files: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::proxy::ProxyPool;
    use crate::plugin::NoopHooks;
    use crate::notifier::NoopNotifier;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_at(id: &str, published: DateTime<Utc>, done: bool) -> Post {
        Post {
            id: id.into(),
            user: "1".into(),
            service: "patreon".into(),
            title: String::new(),
            content: ContentSentinel::Empty,
            published,
            edited: None,
            added: Utc::now(),
            file: None,
            attachments: vec![],
            embed: Value::Null,
            shared_file: Value::Null,
            done,
            failed_files: vec![],
        }
    }

    #[test]
    fn watermark_advances_through_consecutive_done_posts() {
        let base = Utc::now();
        let posts = vec![
            post_at("a", base, true),
            post_at("b", base + ChronoDuration::days(1), true),
            post_at("c", base + ChronoDuration::days(2), true),
        ];
        let new = calculate_new_last_date(&posts, None);
        assert_eq!(new, Some(base + ChronoDuration::days(2)));
    }

    #[test]
    fn watermark_stops_at_first_undone_post() {
        let base = Utc::now();
        let posts = vec![
            post_at("a", base, true),
            post_at("b", base + ChronoDuration::days(1), false),
            post_at("c", base + ChronoDuration::days(2), true),
        ];
        let new = calculate_new_last_date(&posts, None);
        assert_eq!(new, Some(base));
    }

    #[test]
    fn watermark_unchanged_when_new_post_precedes_current() {
        let base = Utc::now();
        let current = base + ChronoDuration::days(2);
        let posts = vec![
            post_at("old", base, true),
            post_at("current", current, true),
            post_at("backfilled", base - ChronoDuration::days(10), true),
        ];
        let new = calculate_new_last_date(&posts, Some(current));
        assert_eq!(new, None);
    }

    #[test]
    fn extract_files_resolves_relative_paths_and_drops_empty() {
        let mut post = post_at("p1", Utc::now(), false);
        post.file = Some(FileRef {
            name: String::new(),
            path: "/data/f1.jpg".into(),
        });
        post.attachments = vec![
            FileRef { name: "a.zip".into(), path: "/data/a.zip".into() },
            FileRef { name: "skip".into(), path: String::new() },
        ];
        let files = extract_files("https://kemono.cr", &post);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], ("https://kemono.cr/data/f1.jpg".to_string(), "file".to_string()));
        assert_eq!(files[1], ("https://kemono.cr/data/a.zip".to_string(), "a.zip".to_string()));
    }

    #[test]
    fn extract_files_keeps_absolute_urls_untouched() {
        let mut post = post_at("p1", Utc::now(), false);
        post.file = Some(FileRef {
            name: "f.jpg".into(),
            path: "https://cdn.example/f.jpg".into(),
        });
        let files = extract_files("https://kemono.cr", &post);
        assert_eq!(files[0].0, "https://cdn.example/f.jpg");
    }

    #[test]
    fn remote_introduces_new_file_detects_only_additions() {
        let local_file = Some(FileRef { name: "a".into(), path: "/a".into() });
        let local_attachments = vec![FileRef { name: "b".into(), path: "/b".into() }];

        // Remote has exactly what local has: no change.
        assert!(!remote_introduces_new_file(
            &local_file,
            &local_attachments,
            &local_file,
            &local_attachments
        ));

        // Remote dropped "b": still no change (local is the superset).
        assert!(!remote_introduces_new_file(&local_file, &local_attachments, &local_file, &[]));

        // Remote has a new attachment "c": change.
        let remote_attachments = vec![
            FileRef { name: "b".into(), path: "/b".into() },
            FileRef { name: "c".into(), path: "/c".into() },
        ];
        assert!(remote_introduces_new_file(
            &local_file,
            &local_attachments,
            &local_file,
            &remote_attachments
        ));
    }

    #[test]
    fn parse_remote_post_falls_back_to_naive_datetime() {
        let value = json!({
            "id": "123",
            "title": "Hello",
            "content": "body text",
            "published": "2024-05-01T00:00:00",
        });
        let post = parse_remote_post(&value, "patreon", "1", Utc::now()).expect("parses");
        assert_eq!(post.id, "123");
        assert_eq!(post.content, ContentSentinel::Text("body text".into()));
        assert_eq!(post.published.format("%Y-%m-%d").to_string(), "2024-05-01");
    }

    #[test]
    fn parse_remote_post_empty_content_is_empty_sentinel() {
        let value = json!({
            "id": "123",
            "published": "2024-05-01T00:00:00Z",
        });
        let post = parse_remote_post(&value, "patreon", "1", Utc::now()).expect("parses");
        assert_eq!(post.content, ContentSentinel::Empty);
    }

    #[test]
    fn parse_profile_requires_post_count() {
        assert!(parse_profile(&json!({"post_count": 5})).is_ok());
        assert!(parse_profile(&json!({})).is_err());
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
            ignore: false,
            completed: false,
            timer: None,
            config: Default::default(),
            filter: Default::default(),
        }
    }

    async fn build_downloader(base_url: String, data_dir: &std::path::Path, cache_dir: &std::path::Path) -> Downloader {
        let storage = Arc::new(Storage::open(data_dir).await.expect("storage"));
        let cache = Arc::new(Cache::open(cache_dir).await.expect("cache"));
        let http = Arc::new(
            HttpClient::new(base_url, RetryConfig::default(), Some(Arc::new(ProxyPool::new(vec![]))))
                .expect("http client"),
        );
        let (events, _) = tokio::sync::broadcast::channel(crate::types::EVENT_CHANNEL_CAPACITY);
        Downloader::new(storage, cache, http, Arc::new(NoopHooks), Arc::new(NoopNotifier), events)
    }

    #[tokio::test]
    async fn fresh_adoption_downloads_and_advances_watermark() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/patreon/user/1/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"post_count": 1})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/patreon/user/1/posts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": "p1",
                    "title": "First",
                    "content": "hello",
                    "published": "2024-05-01T00:00:00Z",
                }
            ])))
            .mount(&server)
            .await;

        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let downloader = build_downloader(server.uri(), data_dir.path(), cache_dir.path()).await;

        let mut config = Config::default();
        config.base_url = server.uri();
        config.download.download_dir = tempfile::tempdir().expect("download dir").path().to_path_buf();
        config.download.save_empty_posts = true;

        let artist = test_artist("patreon_1");
        let outcome = downloader
            .download_artist(&artist, &config, None, None)
            .await
            .expect("download_artist");

        match outcome {
            ArtistOutcome::Ran(result) => {
                assert_eq!(result.posts_downloaded, 1);
                assert_eq!(result.posts_failed, 0);
            }
            ArtistOutcome::Skipped => panic!("expected the artist to run"),
        }

        let updated = downloader.storage.get_artist("patreon_1").await.expect("artist saved");
        assert_eq!(
            updated.last_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2024-05-01".to_string())
        );
    }

    #[tokio::test]
    async fn ignored_artist_is_skipped_without_network_calls() {
        let server = MockServer::start().await;
        // Intentionally mount no handlers: any request would fail the test via a 404/500.
        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let downloader = build_downloader(server.uri(), data_dir.path(), cache_dir.path()).await;

        let mut config = Config::default();
        config.base_url = server.uri();

        let mut artist = test_artist("patreon_2");
        artist.ignore = true;

        let outcome = downloader
            .download_artist(&artist, &config, None, None)
            .await
            .expect("download_artist");
        assert_eq!(outcome, ArtistOutcome::Skipped);
    }

    #[tokio::test]
    async fn update_posts_full_detects_added_file_and_resets_done() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/patreon/user/1/post/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "post": {
                    "id": "p1",
                    "title": "First",
                    "content": "hello",
                    "published": "2024-05-01T00:00:00Z",
                    "file": {"name": "a.jpg", "path": "/data/a.jpg"},
                    "attachments": [{"name": "b.jpg", "path": "/data/b.jpg"}],
                }
            })))
            .mount(&server)
            .await;

        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let downloader = build_downloader(server.uri(), data_dir.path(), cache_dir.path()).await;

        let mut cached = post_at("p1", Utc::now(), true);
        cached.file = Some(FileRef { name: "a.jpg".into(), path: "/data/a.jpg".into() });
        downloader
            .cache
            .save_posts("patreon_1", vec![cached])
            .await
            .expect("seed cache");

        let mut config = Config::default();
        config.base_url = server.uri();
        let artist = test_artist("patreon_1");

        let changed = downloader
            .update_posts_full(&artist, &config)
            .await
            .expect("update_posts_full");
        assert_eq!(changed, 1);

        let posts = downloader.cache.load_posts("patreon_1").await;
        let post = &posts[0];
        assert!(!post.done, "a remotely-added attachment must reset done to false");
        assert_eq!(post.attachments.len(), 1);
        assert_eq!(post.attachments[0].name, "b.jpg");
    }

    #[tokio::test]
    async fn update_posts_full_ignores_remote_removed_file_local_stays_superset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/patreon/user/1/post/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "post": {
                    "id": "p1",
                    "title": "First",
                    "content": "hello",
                    "published": "2024-05-01T00:00:00Z",
                    "file": {"name": "a.jpg", "path": "/data/a.jpg"},
                }
            })))
            .mount(&server)
            .await;

        let data_dir = tempfile::tempdir().expect("data dir");
        let cache_dir = tempfile::tempdir().expect("cache dir");
        let downloader = build_downloader(server.uri(), data_dir.path(), cache_dir.path()).await;

        let mut cached = post_at("p1", Utc::now(), true);
        cached.file = Some(FileRef { name: "a.jpg".into(), path: "/data/a.jpg".into() });
        cached.attachments = vec![FileRef { name: "b.jpg".into(), path: "/data/b.jpg".into() }];
        downloader
            .cache
            .save_posts("patreon_1", vec![cached])
            .await
            .expect("seed cache");

        let mut config = Config::default();
        config.base_url = server.uri();
        let artist = test_artist("patreon_1");

        let changed = downloader
            .update_posts_full(&artist, &config)
            .await
            .expect("update_posts_full");
        assert_eq!(changed, 0, "remote dropping a locally-held file is not a change");

        let posts = downloader.cache.load_posts("patreon_1").await;
        let post = &posts[0];
        assert!(post.done, "local stays a superset; done must not be reset");
        assert_eq!(post.attachments.len(), 1);
        assert_eq!(post.attachments[0].name, "b.jpg");
    }
}
