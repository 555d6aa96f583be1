//! Corpus-wide uniqueness audit: do two posts (or artists, or files) render to the same path?
//!
//! A template like `{title}` collapses distinct posts with identical titles into one folder,
//! silently merging their files. The Validator renders every artist/post/file path under the
//! live config and flags any path claimed by more than one id, at three independently-toggleable
//! levels ([`crate::config::ValidateConfig`]). Known-acceptable collisions can be persisted to an
//! on-disk ignore store so they stop being reported without disabling the check entirely.

use crate::config::{Config, TemplateConfig};
use crate::path_engine::{self, ArtistParams, PostFolderParams};
use crate::error::Result;
use crate::storage::atomic_write_json;
use crate::types::{Artist, Post};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const IGNORE_FILE: &str = "validation_ignore.json";

/// Which rendered path a conflict was found at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Artist,
    Post,
    File,
}

/// Two or more ids that render to the same path at a given [`Level`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictGroup {
    pub level: Level,
    /// Absolute rendered path shared by every id in `ids`.
    pub path: PathBuf,
    /// Colliding ids, using the level's own convention (bare artist id, `artist_id:post_id`, or
    /// `artist_id:post_id:file_name`).
    pub ids: Vec<String>,
    /// Distinct artist ids contributing to this group, used to file the conflict in the
    /// per-artist ignore store.
    pub artist_ids: Vec<String>,
}

/// Outcome of one validation pass.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    /// Conflicts remaining after subtracting ignored paths.
    pub conflicts: Vec<ConflictGroup>,
    /// `conflicts.len()`, kept alongside for callers that only want the count.
    pub count: usize,
}

/// Per-artist persisted ignore state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationIgnoreEntry {
    /// Relative paths (to the download root) this artist conflicted on the last time the store
    /// was written.
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Relative paths the operator has chosen to silence. Garbage-collected to drop entries no
    /// longer present in `conflicts`.
    #[serde(default)]
    pub ignores: Vec<String>,
}

/// Audits rendered paths for collisions and persists an ignore list across runs.
pub struct Validator {
    ignore_path: PathBuf,
}

impl Validator {
    /// Build a validator whose ignore store lives at `<data_dir>/validation_ignore.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            ignore_path: data_dir.join(IGNORE_FILE),
        }
    }

    async fn load_ignores(&self) -> Result<HashMap<String, ValidationIgnoreEntry>> {
        match tokio::fs::read(&self.ignore_path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_ignores(&self, store: &HashMap<String, ValidationIgnoreEntry>) -> Result<()> {
        atomic_write_json(&self.ignore_path, store).await
    }

    /// Mark `relative_path` as an accepted collision for `artist_id`, so future [`Self::validate`]
    /// calls no longer surface it. A no-op if the path isn't currently a conflict for that artist.
    pub async fn ignore(&self, artist_id: &str, relative_path: &str) -> Result<()> {
        let mut store = self.load_ignores().await?;
        let entry = store.entry(artist_id.to_string()).or_default();
        if entry.conflicts.iter().any(|p| p == relative_path) && !entry.ignores.iter().any(|p| p == relative_path) {
            entry.ignores.push(relative_path.to_string());
        }
        self.save_ignores(&store).await
    }

    /// Run a full audit: render every enabled level, group by path, subtract ignored paths, and
    /// garbage-collect the ignore store down to ignores that are still live conflicts.
    pub async fn validate(
        &self,
        download_dir: &Path,
        global: &Config,
        artists: &[Artist],
        posts_by_artist: &HashMap<String, Vec<Post>>,
    ) -> Result<ValidationReport> {
        let data = build_validation_data(artists, posts_by_artist);
        let mut raw_conflicts = Vec::new();

        if global.validate.artist_unique {
            raw_conflicts.extend(audit_artists(&data, global, download_dir));
        }
        if global.validate.post_unique {
            raw_conflicts.extend(audit_posts(&data, global, download_dir));
        }
        if global.validate.file_unique {
            raw_conflicts.extend(audit_files(&data, global, download_dir));
        }

        let mut store = self.load_ignores().await?;
        let ignored_paths: HashSet<PathBuf> = store
            .values()
            .flat_map(|entry| entry.ignores.iter())
            .map(|rel| download_dir.join(rel))
            .collect();

        let filtered: Vec<ConflictGroup> = raw_conflicts
            .iter()
            .filter(|group| !ignored_paths.contains(&group.path))
            .cloned()
            .collect();

        let audited_artist_ids: HashSet<&str> = data.iter().map(|(a, _)| a.id.as_str()).collect();
        for artist_id in audited_artist_ids {
            let this_artist_conflicts: Vec<String> = raw_conflicts
                .iter()
                .filter(|group| group.artist_ids.iter().any(|id| id == artist_id))
                .map(|group| relative_path(download_dir, &group.path))
                .collect();

            let entry = store.entry(artist_id.to_string()).or_default();
            entry.ignores.retain(|p| this_artist_conflicts.iter().any(|c| c == p));
            entry.conflicts = this_artist_conflicts;
        }
        self.save_ignores(&store).await?;

        let count = filtered.len();
        Ok(ValidationReport {
            conflicts: filtered,
            count,
        })
    }
}

fn relative_path(download_dir: &Path, path: &Path) -> String {
    path.strip_prefix(download_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Merge `global.templates` with an artist's own config overrides, key by key.
pub(crate) fn effective_templates(global: &TemplateConfig, overrides: &HashMap<String, serde_json::Value>) -> TemplateConfig {
    let mut value = serde_json::to_value(global).unwrap_or(serde_json::Value::Null);
    if let serde_json::Value::Object(map) = &mut value {
        for (key, v) in overrides {
            if map.contains_key(key) {
                map.insert(key.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(value).unwrap_or_else(|_| global.clone())
}

/// Restrict to posts that have at least one file, and artists that have at least one such post.
fn build_validation_data<'a>(
    artists: &'a [Artist],
    posts_by_artist: &'a HashMap<String, Vec<Post>>,
) -> Vec<(&'a Artist, Vec<&'a Post>)> {
    let mut out = Vec::new();
    for artist in artists {
        let Some(posts) = posts_by_artist.get(&artist.id) else {
            continue;
        };
        let qualifying: Vec<&Post> = posts
            .iter()
            .filter(|p| p.file.is_some() || !p.attachments.is_empty())
            .collect();
        if !qualifying.is_empty() {
            out.push((artist, qualifying));
        }
    }
    out
}

fn artist_folder_path(artist: &Artist, global: &Config, download_dir: &Path) -> PathBuf {
    let templates = effective_templates(&global.templates, &artist.config);
    let params = ArtistParams::from_artist(artist);
    download_dir.join(path_engine::format_artist_folder(&params, &templates.artist_folder))
}

fn post_folder_path(artist: &Artist, post: &Post, global: &Config, download_dir: &Path) -> PathBuf {
    let templates = effective_templates(&global.templates, &artist.config);
    let params = PostFolderParams::from_post(post);
    artist_folder_path(artist, global, download_dir)
        .join(path_engine::format_post_folder(&params, &templates.post_folder, &templates.date_format))
}

fn group_conflicts(level: Level, entries: Vec<(String, Vec<String>, PathBuf)>) -> Vec<ConflictGroup> {
    let mut by_path: HashMap<PathBuf, (Vec<String>, Vec<String>)> = HashMap::new();
    for (id, artist_ids, path) in entries {
        let bucket = by_path.entry(path).or_default();
        bucket.0.push(id);
        for artist_id in artist_ids {
            if !bucket.1.contains(&artist_id) {
                bucket.1.push(artist_id);
            }
        }
    }
    by_path
        .into_iter()
        .filter(|(_, (ids, _))| ids.len() >= 2)
        .map(|(path, (ids, artist_ids))| ConflictGroup {
            level,
            path,
            ids,
            artist_ids,
        })
        .collect()
}

fn audit_artists(
    data: &[(&Artist, Vec<&Post>)],
    global: &Config,
    download_dir: &Path,
) -> Vec<ConflictGroup> {
    let entries = data
        .iter()
        .map(|(artist, _)| {
            (
                artist.id.clone(),
                vec![artist.id.clone()],
                artist_folder_path(artist, global, download_dir),
            )
        })
        .collect();
    group_conflicts(Level::Artist, entries)
}

fn audit_posts(
    data: &[(&Artist, Vec<&Post>)],
    global: &Config,
    download_dir: &Path,
) -> Vec<ConflictGroup> {
    let mut entries = Vec::new();
    for (artist, posts) in data {
        for post in posts {
            entries.push((
                format!("{}:{}", artist.id, post.id),
                vec![artist.id.clone()],
                post_folder_path(artist, post, global, download_dir),
            ));
        }
    }
    group_conflicts(Level::Post, entries)
}

fn audit_files(
    data: &[(&Artist, Vec<&Post>)],
    global: &Config,
    download_dir: &Path,
) -> Vec<ConflictGroup> {
    let mut entries = Vec::new();
    for (artist, posts) in data {
        for post in posts {
            let folder = post_folder_path(artist, post, global, download_dir);
            let files = post.file.iter().chain(post.attachments.iter());
            for file in files {
                entries.push((
                    format!("{}:{}:{}", artist.id, post.id, file.name),
                    vec![artist.id.clone()],
                    folder.join(&file.name),
                ));
            }
        }
    }
    group_conflicts(Level::File, entries)
}
