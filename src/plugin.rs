//! Hot-reloadable hook points for path rewriting.
//!
//! The distilled source resolves a named hook by re-reading a Python source file on every
//! lookup. In this statically-typed port that indirection becomes two fixed, independently
//! swappable extension points (artist-path rewriter, post-path rewriter) backed by a small
//! named-preset table that *is* re-read on every lookup, so "reload" still means "edit a file,
//! no restart" without loading foreign code into the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// The two fixed rewrite points [`crate::path_engine`] consults.
pub trait PathHooks: Send + Sync {
    /// Rewrite an already-rendered artist folder name for the given `user_id`. Default:
    /// passthrough.
    fn rewrite_artist_path(&self, user_id: &str, rendered: String) -> String {
        let _ = user_id;
        rendered
    }

    /// Rewrite an already-rendered post folder name for the given post `id`. Default:
    /// passthrough.
    fn rewrite_post_path(&self, post_id: &str, rendered: String) -> String {
        let _ = post_id;
        rendered
    }
}

/// A named preset: truncate a rendered string at the first occurrence of `stop_at`.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct TruncatePreset {
    /// Only applies to this user/post id; `"*"` matches everything.
    pub id: String,
    /// Truncate the rendered value at the first occurrence of this substring.
    pub stop_at: String,
}

/// A preset file: named truncation rules for artist and post path rewriting.
#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct PluginPresets {
    /// Artist-path truncation rules.
    #[serde(default)]
    pub artist: Vec<TruncatePreset>,
    /// Post-path truncation rules.
    #[serde(default)]
    pub post: Vec<TruncatePreset>,
}

/// The error condition a failed hook lookup translates to. Never fatal — callers downgrade
/// this to a warning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginLookupError {
    /// The preset file does not exist or could not be read.
    #[error("plugin preset file not found or unreadable: {0}")]
    NotFound(String),
    /// The preset file exists but is not valid JSON for [`PluginPresets`].
    #[error("plugin preset file is not a valid preset table: {0}")]
    NotCallable(String),
}

/// Re-reads a preset file from disk on every lookup, so edits take effect without a restart.
pub struct PluginReloader {
    path: PathBuf,
    last_good: RwLock<PluginPresets>,
}

impl PluginReloader {
    /// Create a reloader pointed at `path`. The file need not exist yet; lookups fail softly
    /// (empty presets) until it does.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: RwLock::new(PluginPresets::default()),
        }
    }

    /// Re-read the preset file and return the result, caching the last successfully parsed
    /// table so [`PathHooks`] calls can fall back to it on a transient read/parse failure.
    pub fn reload(&self) -> Result<PluginPresets, PluginLookupError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<PluginPresets>(&contents) {
                Ok(presets) => {
                    *self.last_good.write().expect("preset lock poisoned") = presets.clone();
                    Ok(presets)
                }
                Err(e) => Err(PluginLookupError::NotCallable(e.to_string())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PluginLookupError::NotFound(self.path.display().to_string()))
            }
            Err(e) => Err(PluginLookupError::NotFound(e.to_string())),
        }
    }

    fn current(&self) -> PluginPresets {
        match self.reload() {
            Ok(presets) => presets,
            Err(_) => self.last_good.read().expect("preset lock poisoned").clone(),
        }
    }
}

impl PathHooks for PluginReloader {
    fn rewrite_artist_path(&self, user_id: &str, rendered: String) -> String {
        apply_truncate(&self.current().artist, user_id, rendered)
    }

    fn rewrite_post_path(&self, post_id: &str, rendered: String) -> String {
        apply_truncate(&self.current().post, post_id, rendered)
    }
}

fn apply_truncate(rules: &[TruncatePreset], id: &str, rendered: String) -> String {
    for rule in rules {
        if rule.id == "*" || rule.id == id {
            if let Some(pos) = rendered.find(rule.stop_at.as_str()) {
                return rendered[..pos].to_string();
            }
        }
    }
    rendered
}

/// No-op hook set, used when no plugin preset file is configured.
#[derive(Default)]
pub struct NoopHooks;

impl PathHooks for NoopHooks {}

/// In-memory, non-reloading hook set for tests.
#[derive(Default)]
pub struct StaticHooks(pub HashMap<String, String>);

impl PathHooks for StaticHooks {
    fn rewrite_post_path(&self, post_id: &str, rendered: String) -> String {
        self.0.get(post_id).cloned().unwrap_or(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn noop_hooks_are_passthrough() {
        let hooks = NoopHooks;
        assert_eq!(hooks.rewrite_artist_path("1", "folder".into()), "folder");
        assert_eq!(hooks.rewrite_post_path("p1", "folder".into()), "folder");
    }

    #[test]
    fn missing_preset_file_yields_not_found_and_passthrough_behavior() {
        let reloader = PluginReloader::new("/nonexistent/path/presets.json");
        assert!(matches!(reloader.reload(), Err(PluginLookupError::NotFound(_))));
        assert_eq!(reloader.rewrite_post_path("p1", "x".into()), "x");
    }

    #[test]
    fn preset_file_truncates_matching_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("presets.json");
        let mut f = std::fs::File::create(&path).expect("create");
        write!(
            f,
            r#"{{"post": [{{"id": "p1", "stop_at": "/"}}]}}"#
        )
        .expect("write");
        let reloader = PluginReloader::new(&path);
        assert_eq!(
            reloader.rewrite_post_path("p1", "Title/extra".into()),
            "Title"
        );
        assert_eq!(
            reloader.rewrite_post_path("p2", "Title/extra".into()),
            "Title/extra"
        );
    }

    #[test]
    fn invalid_preset_file_falls_back_to_last_good() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("presets.json");
        std::fs::write(&path, r#"{"post": [{"id": "*", "stop_at": "X"}]}"#).expect("write");
        let reloader = PluginReloader::new(&path);
        assert_eq!(reloader.rewrite_post_path("any", "aXb".into()), "a");

        std::fs::write(&path, "not json").expect("write");
        // reload() itself surfaces the error...
        assert!(matches!(
            reloader.reload(),
            Err(PluginLookupError::NotCallable(_))
        ));
        // ...but rewrite_post_path falls back to the cached last-good table.
        assert_eq!(reloader.rewrite_post_path("any", "aXb".into()), "a");
    }
}
