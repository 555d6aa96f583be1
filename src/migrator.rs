//! Plan and execute path renames when artist/post/file templates change.
//!
//! Template edits are common (an operator tweaks `post_folder` to include the service name) and
//! must not orphan already-downloaded files. The Migrator computes old vs. new paths under two
//! [`crate::config::TemplateConfig`]s and renames on disk, refusing to guess past a collision.

use crate::config::TemplateConfig;
use crate::path_engine::{self, ArtistParams, PostFolderParams};
use crate::types::{Artist, Post};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One post (or artist, or file) whose rendered path changes between `old` and `new`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// Id of the post (or equivalent unit) this mapping is for.
    pub id: String,
    /// Absolute path under the old template.
    pub old_path: PathBuf,
    /// Absolute path under the new template.
    pub new_path: PathBuf,
}

/// A post dropped from the plan along with a human-readable reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skipped {
    /// Id of the post (or equivalent unit).
    pub id: String,
    /// Why it was dropped: "Source not found", "target exists", "old == new", or a collision
    /// description.
    pub reason: String,
}

/// The full output of planning a migration: ready-to-execute renames, detected collisions, and
/// everything else dropped with a reason.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    /// 1:1 renames, safe to execute.
    pub mappings: Vec<Mapping>,
    /// Posts involved in a many-to-one collision in either projection.
    pub conflicts: Vec<Skipped>,
    /// Posts dropped for any other reason (missing source, no-op, target exists).
    pub skipped: Vec<Skipped>,
}

/// What happened when executing one [`Mapping`].
#[derive(Clone, Debug)]
pub struct ExecutionFailure {
    /// Id of the mapping that failed.
    pub id: String,
    /// The underlying I/O error, stringified.
    pub error: String,
}

/// Plan a post-folder migration for one artist from `old_config` to `new_config`.
///
/// `download_dir` is the root all rendered paths are relative to; renames never cross the
/// artist folder (only the post folder under it is recomputed) because a separate artist-folder
/// migration is a distinct, coarser operation an operator runs first.
pub fn plan_post_migration(
    artist: &Artist,
    posts: &[Post],
    old_config: &TemplateConfig,
    new_config: &TemplateConfig,
    download_dir: &Path,
) -> MigrationPlan {
    let artist_params = ArtistParams::from_artist(artist);
    let old_artist_folder = path_engine::format_artist_folder(&artist_params, &old_config.artist_folder);
    let new_artist_folder = path_engine::format_artist_folder(&artist_params, &new_config.artist_folder);

    let mut candidates: Vec<(String, PathBuf, PathBuf)> = Vec::new();
    for post in posts {
        let post_params = PostFolderParams::from_post(post);
        let old_folder =
            path_engine::format_post_folder(&post_params, &old_config.post_folder, &old_config.date_format);
        let new_folder =
            path_engine::format_post_folder(&post_params, &new_config.post_folder, &new_config.date_format);
        let old_path = download_dir.join(&old_artist_folder).join(old_folder);
        let new_path = download_dir.join(&new_artist_folder).join(new_folder);
        candidates.push((post.id.clone(), old_path, new_path));
    }

    plan_from_candidates(candidates)
}

/// Shared planning core: given `(id, old_path, new_path)` triples, drop missing sources,
/// quarantine many-to-one collisions in either projection, then emit the remaining 1:1 renames.
fn plan_from_candidates(candidates: Vec<(String, PathBuf, PathBuf)>) -> MigrationPlan {
    let mut plan = MigrationPlan::default();

    let mut existing: Vec<(String, PathBuf, PathBuf)> = Vec::new();
    for (id, old_path, new_path) in candidates {
        if !old_path.exists() {
            plan.skipped.push(Skipped {
                id,
                reason: "Source not found".to_string(),
            });
            continue;
        }
        existing.push((id, old_path, new_path));
    }

    let mut by_old: HashMap<&Path, Vec<usize>> = HashMap::new();
    let mut by_new: HashMap<&Path, Vec<usize>> = HashMap::new();
    for (idx, (_, old_path, new_path)) in existing.iter().enumerate() {
        by_old.entry(old_path.as_path()).or_default().push(idx);
        by_new.entry(new_path.as_path()).or_default().push(idx);
    }

    let mut conflicted: Vec<bool> = vec![false; existing.len()];
    for indices in by_old.values().chain(by_new.values()) {
        if indices.len() > 1 {
            for &idx in indices {
                conflicted[idx] = true;
            }
        }
    }

    for (idx, (id, old_path, new_path)) in existing.into_iter().enumerate() {
        if conflicted[idx] {
            plan.conflicts.push(Skipped {
                id,
                reason: "Collides with another post under the old or new template".to_string(),
            });
            continue;
        }
        if old_path == new_path {
            plan.skipped.push(Skipped {
                id,
                reason: "old == new".to_string(),
            });
            continue;
        }
        if new_path.exists() {
            plan.skipped.push(Skipped {
                id,
                reason: "target exists".to_string(),
            });
            continue;
        }
        plan.mappings.push(Mapping {
            id,
            old_path,
            new_path,
        });
    }

    plan
}

/// Execute every mapping in `plan`, renaming one by one and creating parent directories as
/// needed. A single failure is recorded and execution continues with the remaining mappings.
pub async fn execute(plan: &MigrationPlan) -> Vec<ExecutionFailure> {
    let mut failures = Vec::new();
    for mapping in &plan.mappings {
        if let Some(parent) = mapping.new_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                failures.push(ExecutionFailure {
                    id: mapping.id.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        }
        if let Err(e) = tokio::fs::rename(&mapping.old_path, &mapping.new_path).await {
            failures.push(ExecutionFailure {
                id: mapping.id.clone(),
                error: e.to_string(),
            });
        }
    }
    failures
}
