//! Durable mapping `artist_id -> Artist`, plus the global [`Config`] record and the
//! command-history log.
//!
//! Persisted as small JSON documents in a data directory, guarded by a single coarse mutex —
//! the workload here is small, infrequent read-modify-write on whole documents, not
//! high-throughput row access, so one lock per store is the right tradeoff (mirrors the
//! teacher's choice of a single guard around each durable store rather than per-row locking).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Artist, HistoryRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const ARTISTS_FILE: &str = "artists.json";
const CONFIG_FILE: &str = "config.json";
const HISTORY_FILE: &str = "history.json";
const FRAGMENTS_DIR: &str = "artists";

/// Where an in-memory [`Artist`] was loaded from, so writes can be routed back to the same
/// place instead of silently forking a fragment into the principal document.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ArtistSource {
    Principal,
    Fragment(PathBuf),
}

struct StorageState {
    artists: HashMap<String, Artist>,
    sources: HashMap<String, ArtistSource>,
    config: Config,
    history: Vec<HistoryRecord>,
}

/// Durable store for artists, the global config, and command history.
pub struct Storage {
    data_dir: PathBuf,
    state: Mutex<StorageState>,
}

impl Storage {
    /// Open (and lazily create) the store rooted at `data_dir`, loading the principal artist
    /// document, any fragment files, the config, and the history log.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_json_or_default(&data_dir.join(CONFIG_FILE)).await?;
        let history = load_json_or_default(&data_dir.join(HISTORY_FILE)).await?;
        let (artists, sources) = load_artists(&data_dir).await?;

        Ok(Self {
            data_dir,
            state: Mutex::new(StorageState {
                artists,
                sources,
                config,
                history,
            }),
        })
    }

    /// The root directory this store is rooted at.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// List all known artists, principal and fragment-sourced alike.
    pub async fn list_artists(&self) -> Vec<Artist> {
        let state = self.state.lock().await;
        state.artists.values().cloned().collect()
    }

    /// Fetch a single artist by id.
    pub async fn get_artist(&self, id: &str) -> Option<Artist> {
        let state = self.state.lock().await;
        state.artists.get(id).cloned()
    }

    /// Upsert an artist. If the artist was originally sourced from a fragment file, the
    /// fragment is mutated in place; otherwise the write lands in the principal document.
    /// Brand-new artists (never seen before) are written to the principal document.
    pub async fn save_artist(&self, artist: Artist) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = artist.id.clone();
        let source = state
            .sources
            .get(&id)
            .cloned()
            .unwrap_or(ArtistSource::Principal);

        state.artists.insert(id.clone(), artist);
        state.sources.entry(id).or_insert(ArtistSource::Principal);

        match source {
            ArtistSource::Principal => self.flush_principal(&state).await,
            ArtistSource::Fragment(path) => self.flush_fragment(&state, &path).await,
        }
    }

    /// Remove an artist. Only removes it from the principal document or its owning fragment;
    /// does not delete a fragment file even if it becomes empty (an operator-curated file, not
    /// ours to delete).
    pub async fn remove_artist(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.artists.remove(id);
        let source = state.sources.remove(id).unwrap_or(ArtistSource::Principal);
        match source {
            ArtistSource::Principal => self.flush_principal(&state).await,
            ArtistSource::Fragment(path) => self.flush_fragment(&state, &path).await,
        }
    }

    /// Load the current global config.
    pub async fn load_config(&self) -> Config {
        self.state.lock().await.config.clone()
    }

    /// Persist a new global config.
    pub async fn save_config(&self, config: Config) -> Result<()> {
        let mut state = self.state.lock().await;
        state.config = config;
        atomic_write_json(&self.data_dir.join(CONFIG_FILE), &state.config).await
    }

    /// Append one history record.
    pub async fn append_history(&self, record: HistoryRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        state.history.push(record);
        atomic_write_json(&self.data_dir.join(HISTORY_FILE), &state.history).await
    }

    /// Return the `n` most recent history records, newest first.
    pub async fn recent_history(&self, n: usize) -> Vec<HistoryRecord> {
        let state = self.state.lock().await;
        state.history.iter().rev().take(n).cloned().collect()
    }

    async fn flush_principal(&self, state: &StorageState) -> Result<()> {
        let principal: Vec<&Artist> = state
            .artists
            .iter()
            .filter(|(id, _)| matches!(state.sources.get(*id), Some(ArtistSource::Principal) | None))
            .map(|(_, a)| a)
            .collect();
        atomic_write_json(&self.data_dir.join(ARTISTS_FILE), &principal).await
    }

    async fn flush_fragment(&self, state: &StorageState, path: &Path) -> Result<()> {
        let in_fragment: Vec<&Artist> = state
            .artists
            .iter()
            .filter(|(id, _)| state.sources.get(*id) == Some(&ArtistSource::Fragment(path.to_path_buf())))
            .map(|(_, a)| a)
            .collect();
        atomic_write_json(path, &in_fragment).await
    }
}

async fn load_json_or_default<T>(path: &Path) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(Error::LocalIo(e)),
    }
}

async fn load_artists(
    data_dir: &Path,
) -> Result<(HashMap<String, Artist>, HashMap<String, ArtistSource>)> {
    let mut artists = HashMap::new();
    let mut sources = HashMap::new();

    let principal: Vec<Artist> = load_json_or_default(&data_dir.join(ARTISTS_FILE)).await?;
    for artist in principal {
        sources.insert(artist.id.clone(), ArtistSource::Principal);
        artists.insert(artist.id.clone(), artist);
    }

    let fragments_dir = data_dir.join(FRAGMENTS_DIR);
    if fragments_dir.is_dir() {
        let mut entries = tokio::fs::read_dir(&fragments_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let parsed: FragmentContents = serde_json::from_slice(&bytes)?;
            for artist in parsed.into_artists() {
                // Principal takes precedence on id collision.
                if !artists.contains_key(&artist.id) {
                    sources.insert(artist.id.clone(), ArtistSource::Fragment(path.clone()));
                    artists.insert(artist.id.clone(), artist);
                }
            }
        }
    }

    Ok((artists, sources))
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum FragmentContents {
    One(Artist),
    Many(Vec<Artist>),
}

impl FragmentContents {
    fn into_artists(self) -> Vec<Artist> {
        match self {
            FragmentContents::One(a) => vec![a],
            FragmentContents::Many(v) => v,
        }
    }
}

/// Write `value` as JSON to `path` via a temp-file-then-rename so readers never observe a
/// partially-written document.
pub(crate) async fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension(tmp_extension(path));
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    }
}
