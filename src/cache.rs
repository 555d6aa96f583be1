//! Per-artist persisted list of posts and a profile record.
//!
//! All operations take a per-cache mutex; file writes go through the same atomic
//! temp-then-rename pattern as [`crate::storage`].

use crate::error::Result;
use crate::storage::atomic_write_json;
use crate::types::{Post, Profile};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// `{total, done, pending, failed}` summary returned by [`Cache::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    /// Total posts cached for this artist.
    pub total: usize,
    /// Posts with `done == true`.
    pub done: usize,
    /// Posts with `done == false` and no failed files.
    pub pending: usize,
    /// Posts with at least one failed file.
    pub failed: usize,
}

/// Per-artist post list and profile cache.
pub struct Cache {
    cache_dir: PathBuf,
    state: Mutex<HashMap<String, (Profile, Vec<Post>)>>,
}

impl Cache {
    /// Open (and lazily create) the cache rooted at `cache_dir`.
    pub async fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        tokio::fs::create_dir_all(&cache_dir).await?;
        Ok(Self {
            cache_dir,
            state: Mutex::new(HashMap::new()),
        })
    }

    fn profile_path(&self, artist_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{artist_id}_profile.json"))
    }

    fn posts_path(&self, artist_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{artist_id}_posts.json"))
    }

    async fn ensure_loaded(&self, artist_id: &str) {
        let mut state = self.state.lock().await;
        if state.contains_key(artist_id) {
            return;
        }
        let profile = read_json_or_default(&self.profile_path(artist_id)).await;
        let posts = read_json_or_default(&self.posts_path(artist_id)).await;
        state.insert(artist_id.to_string(), (profile, posts));
    }

    /// Load the cached profile for `artist_id`, or a default (empty) one if none exists yet.
    pub async fn load_profile(&self, artist_id: &str) -> Profile {
        self.ensure_loaded(artist_id).await;
        self.state.lock().await.get(artist_id).expect("loaded").0.clone()
    }

    /// Persist `profile` for `artist_id`, stamping `cached_at` with the current time.
    pub async fn save_profile(&self, artist_id: &str, mut profile: Profile) -> Result<()> {
        self.ensure_loaded(artist_id).await;
        profile.cached_at = Some(Utc::now());
        {
            let mut state = self.state.lock().await;
            let entry = state.entry(artist_id.to_string()).or_default();
            entry.0 = profile;
        }
        let state = self.state.lock().await;
        atomic_write_json(&self.profile_path(artist_id), &state.get(artist_id).unwrap().0).await
    }

    /// Load the cached post list for `artist_id`, in stored order.
    pub async fn load_posts(&self, artist_id: &str) -> Vec<Post> {
        self.ensure_loaded(artist_id).await;
        self.state.lock().await.get(artist_id).expect("loaded").1.clone()
    }

    /// Replace the post list for `artist_id` wholesale and persist it.
    pub async fn save_posts(&self, artist_id: &str, posts: Vec<Post>) -> Result<()> {
        self.ensure_loaded(artist_id).await;
        {
            let mut state = self.state.lock().await;
            let entry = state.entry(artist_id.to_string()).or_default();
            entry.1 = posts;
        }
        let state = self.state.lock().await;
        atomic_write_json(&self.posts_path(artist_id), &state.get(artist_id).unwrap().1).await
    }

    /// Update a single post's status and optional content, then persist the whole list.
    pub async fn update_post(
        &self,
        artist_id: &str,
        post_id: &str,
        done: bool,
        failed_files: Option<Vec<String>>,
        content: Option<crate::types::ContentSentinel>,
    ) -> Result<()> {
        self.ensure_loaded(artist_id).await;
        let posts = {
            let mut state = self.state.lock().await;
            let entry = state.entry(artist_id.to_string()).or_default();
            if let Some(post) = entry.1.iter_mut().find(|p| p.id == post_id) {
                post.done = done;
                if let Some(failed) = failed_files {
                    post.failed_files = failed;
                }
                if done {
                    post.failed_files.clear();
                }
                if let Some(content) = content {
                    post.content = content;
                }
            }
            entry.1.clone()
        };
        self.save_posts(artist_id, posts).await
    }

    /// Reset one post's status (clears `done` and `failed_files`) and persist.
    pub async fn reset_post(&self, artist_id: &str, post_id: &str) -> Result<()> {
        self.ensure_loaded(artist_id).await;
        let posts = {
            let mut state = self.state.lock().await;
            let entry = state.entry(artist_id.to_string()).or_default();
            if let Some(post) = entry.1.iter_mut().find(|p| p.id == post_id) {
                post.reset_status();
            }
            entry.1.clone()
        };
        self.save_posts(artist_id, posts).await
    }

    /// Posts where `¬done ∨ failed_files≠∅`.
    pub async fn get_undone(&self, artist_id: &str) -> Vec<Post> {
        self.load_posts(artist_id)
            .await
            .into_iter()
            .filter(|p| p.is_undone())
            .collect()
    }

    /// Reset posts to `done = false, failed_files = []`: all of them if `after` is `None`,
    /// otherwise only those with `published > after`. Applied regardless of current status, so
    /// a not-done post with stale `failed_files` also gets cleared.
    pub async fn reset_after_date(&self, artist_id: &str, after: Option<DateTime<Utc>>) -> Result<()> {
        self.ensure_loaded(artist_id).await;
        let posts = {
            let mut state = self.state.lock().await;
            let entry = state.entry(artist_id.to_string()).or_default();
            for post in entry.1.iter_mut() {
                let should_reset = match after {
                    None => true,
                    Some(cutoff) => post.published > cutoff,
                };
                if should_reset {
                    post.reset_status();
                }
            }
            entry.1.clone()
        };
        self.save_posts(artist_id, posts).await
    }

    /// True if `remote_count` differs from the number of posts currently cached — a cheap
    /// signal that a full reconcile is worthwhile before fetching the whole list.
    pub async fn has_new(&self, artist_id: &str, remote_count: u64) -> bool {
        self.load_posts(artist_id).await.len() as u64 != remote_count
    }

    /// Drop later duplicates by id, preserving the first occurrence and original order.
    /// Persists the deduplicated list and returns the number of entries removed.
    pub async fn deduplicate_posts(&self, artist_id: &str) -> Result<usize> {
        let before = self.load_posts(artist_id).await;
        let deduped = dedupe_by_id_stable(before.clone());
        let removed = before.len() - deduped.len();
        if removed > 0 {
            self.save_posts(artist_id, deduped).await?;
        }
        Ok(removed)
    }

    /// `{total, done, pending, failed}` summary for `artist_id`.
    pub async fn stats(&self, artist_id: &str) -> CacheStats {
        let posts = self.load_posts(artist_id).await;
        let mut stats = CacheStats {
            total: posts.len(),
            ..Default::default()
        };
        for post in &posts {
            if !post.failed_files.is_empty() {
                stats.failed += 1;
            } else if post.done {
                stats.done += 1;
            } else {
                stats.pending += 1;
            }
        }
        stats
    }
}

/// Drop later duplicates by id, keeping first occurrence and original order.
pub fn dedupe_by_id_stable(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = std::collections::HashSet::new();
    posts
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

async fn read_json_or_default<T: Default + serde::de::DeserializeOwned>(path: &PathBuf) -> T {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => T::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentSentinel;

    fn sample_post(id: &str, published: DateTime<Utc>) -> Post {
        Post {
            id: id.to_string(),
            user: "1".to_string(),
            service: "patreon".to_string(),
            title: "t".to_string(),
            content: ContentSentinel::Unfetched,
            published,
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

    #[tokio::test]
    async fn save_and_load_posts_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open(dir.path()).await.expect("open");
        let posts = vec![sample_post("p1", Utc::now())];
        cache.save_posts("a1", posts.clone()).await.expect("save");
        let loaded = cache.load_posts("a1").await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "p1");
    }

    #[tokio::test]
    async fn get_undone_includes_not_done_and_failed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open(dir.path()).await.expect("open");
        let mut done_but_failed = sample_post("p1", Utc::now());
        done_but_failed.done = true;
        done_but_failed.failed_files = vec!["x.jpg".into()];
        let mut clean_done = sample_post("p2", Utc::now());
        clean_done.done = true;
        let not_done = sample_post("p3", Utc::now());

        cache
            .save_posts("a1", vec![done_but_failed, clean_done, not_done])
            .await
            .expect("save");

        let undone = cache.get_undone("a1").await;
        let ids: Vec<_> = undone.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
    }

    #[tokio::test]
    async fn update_post_done_clears_failed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open(dir.path()).await.expect("open");
        let mut post = sample_post("p1", Utc::now());
        post.failed_files = vec!["x.jpg".into()];
        cache.save_posts("a1", vec![post]).await.expect("save");

        cache
            .update_post("a1", "p1", true, None, None)
            .await
            .expect("update");

        let posts = cache.load_posts("a1").await;
        assert!(posts[0].done);
        assert!(posts[0].failed_files.is_empty());
    }

    #[tokio::test]
    async fn reset_after_date_respects_cutoff() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open(dir.path()).await.expect("open");
        let cutoff = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let before_cutoff = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let after_cutoff = DateTime::parse_from_rfc3339("2024-07-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut done_before = sample_post("p1", before_cutoff);
        done_before.done = true;
        let mut done_after = sample_post("p2", after_cutoff);
        done_after.done = true;
        let not_done_after = sample_post("p3", after_cutoff);

        cache
            .save_posts("a1", vec![done_before, done_after, not_done_after])
            .await
            .expect("save");

        cache.reset_after_date("a1", Some(cutoff)).await.expect("reset");

        let posts = cache.load_posts("a1").await;
        let by_id: HashMap<_, _> = posts.into_iter().map(|p| (p.id.clone(), p)).collect();
        assert!(by_id["p1"].done, "post published before cutoff must be left done");
        assert!(!by_id["p2"].done, "post published after cutoff and done must be reset");
        assert!(!by_id["p3"].done, "post that was already not-done stays not-done");
    }

    #[tokio::test]
    async fn reset_after_date_clears_failed_files_on_not_done_posts_too() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open(dir.path()).await.expect("open");
        let mut stale_failed = sample_post("p1", Utc::now());
        stale_failed.done = false;
        stale_failed.failed_files = vec!["x.jpg".into()];

        cache.save_posts("a1", vec![stale_failed]).await.expect("save");
        cache.reset_after_date("a1", None).await.expect("reset");

        let posts = cache.load_posts("a1").await;
        assert!(posts[0].failed_files.is_empty());
    }

    #[tokio::test]
    async fn deduplicate_posts_keeps_first_occurrence_stable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open(dir.path()).await.expect("open");
        let mut first = sample_post("p1", Utc::now());
        first.title = "first".to_string();
        let mut duplicate = sample_post("p1", Utc::now());
        duplicate.title = "duplicate".to_string();
        let other = sample_post("p2", Utc::now());

        cache
            .save_posts("a1", vec![first, duplicate, other])
            .await
            .expect("save");

        let removed = cache.deduplicate_posts("a1").await.expect("dedupe");
        assert_eq!(removed, 1);

        let posts = cache.load_posts("a1").await;
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "p1");
        assert_eq!(posts[0].title, "first");
        assert_eq!(posts[1].id, "p2");
    }

    #[tokio::test]
    async fn stats_buckets_posts_correctly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = Cache::open(dir.path()).await.expect("open");
        let mut done = sample_post("p1", Utc::now());
        done.done = true;
        let pending = sample_post("p2", Utc::now());
        let mut failed = sample_post("p3", Utc::now());
        failed.failed_files = vec!["x".into()];

        cache
            .save_posts("a1", vec![done, pending, failed])
            .await
            .expect("save");

        let stats = cache.stats("a1").await;
        assert_eq!(stats, CacheStats { total: 3, done: 1, pending: 1, failed: 1 });
    }
}
