//! Configuration types for kemono-fetch
//!
//! Fields are organized into logical sub-configs the way a configuration surface grows in
//! practice: flattened into [`Config`] for serialization (so the on-disk JSON stays a single
//! flat-ish document) while staying grouped for readability in code.

use crate::types::TimerSchedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

fn default_base_url() -> String {
    "https://kemono.cr".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_artist_template() -> String {
    "{service}/{alias}".to_string()
}

fn default_post_template() -> String {
    "{published} {title}".to_string()
}

fn default_file_template() -> String {
    "{index}_{filename}".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_max_concurrent_artists() -> usize {
    3
}

fn default_max_concurrent_posts() -> usize {
    4
}

fn default_max_concurrent_files() -> usize {
    4
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_cancel_drain_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dispatch_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_rpc_port() -> u16 {
    18861
}

fn default_true() -> bool {
    true
}

/// Download behavior configuration: directories, concurrency caps, what to save.
///
/// Groups settings related to how artists/posts/files are fetched and written to disk.
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory downloaded payloads are written under (default: "./downloads").
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrently-processed artists (Scheduler worker pool size, default: 3).
    #[serde(default = "default_max_concurrent_artists")]
    pub max_concurrent_artists: usize,

    /// Maximum concurrently-processed posts per artist (default: 4).
    #[serde(default = "default_max_concurrent_posts")]
    pub max_concurrent_posts: usize,

    /// Maximum concurrently-downloaded files per post (default: 4).
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Write post content to `content.txt` alongside its files.
    #[serde(default)]
    pub save_content: bool,

    /// Write `content.txt` even for posts with no attached files.
    #[serde(default)]
    pub save_empty_posts: bool,

    /// Rename only files whose extension is in `image_extensions`; others keep their
    /// sanitised original name.
    #[serde(default)]
    pub rename_images_only: bool,

    /// Extensions (without the dot, lowercase) considered images for `rename_images_only`
    /// and for the image-only counter in `format_files_names`.
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".into(),
        "jpeg".into(),
        "png".into(),
        "gif".into(),
        "webp".into(),
    ]
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_artists: default_max_concurrent_artists(),
            max_concurrent_posts: default_max_concurrent_posts(),
            max_concurrent_files: default_max_concurrent_files(),
            save_content: false,
            save_empty_posts: false,
            rename_images_only: false,
            image_extensions: default_image_extensions(),
        }
    }
}

/// Path template configuration consumed by [`crate::path_engine`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Template for `format_artist_folder`.
    #[serde(default = "default_artist_template")]
    pub artist_folder: String,

    /// Template for `format_post_folder`.
    #[serde(default = "default_post_template")]
    pub post_folder: String,

    /// Template for `format_file_name` / `format_files_names`.
    #[serde(default = "default_file_template")]
    pub file_name: String,

    /// `strftime`-style format used to render `published` inside `post_folder`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            artist_folder: default_artist_template(),
            post_folder: default_post_template(),
            file_name: default_file_template(),
            date_format: default_date_format(),
        }
    }
}

/// Retry/backoff parameters for the HTTP retry wrapper.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Fixed delay between retry attempts on a transient failure.
    #[serde(with = "duration_secs", default = "default_retry_delay")]
    pub retry_delay: Duration,

    /// Per-request timeout for JSON API calls.
    #[serde(with = "duration_secs", default = "default_json_timeout")]
    pub json_timeout: Duration,

    /// Per-request timeout for streamed file downloads.
    #[serde(with = "duration_secs", default = "default_file_timeout")]
    pub file_timeout: Duration,
}

fn default_json_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_file_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_delay: default_retry_delay(),
            json_timeout: default_json_timeout(),
            file_timeout: default_file_timeout(),
        }
    }
}

/// Scheduler timing/concurrency parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Dispatch loop polling interval (default: 1s).
    #[serde(with = "duration_secs", default = "default_dispatch_interval")]
    pub dispatch_interval: Duration,

    /// How long `cancel_all` waits for active tasks to drain before giving up (default: 10s).
    #[serde(with = "duration_secs", default = "default_cancel_drain_timeout")]
    pub cancel_drain_timeout: Duration,

    /// Maximum number of completed tasks retained for inspection (FIFO eviction).
    #[serde(default = "default_completed_history_cap")]
    pub completed_history_cap: usize,

    /// Global timer applied to artists with no per-artist override.
    #[serde(default)]
    pub default_timer: Option<TimerSchedule>,
}

fn default_completed_history_cap() -> usize {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: default_dispatch_interval(),
            cancel_drain_timeout: default_cancel_drain_timeout(),
            completed_history_cap: default_completed_history_cap(),
            default_timer: None,
        }
    }
}

/// Global filter predicate configuration, merged per-artist (artist overrides win key-by-key).
///
/// See [`crate::filters`] for the evaluation semantics of each key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Post passes if title+content contains any of these (case-insensitive).
    #[serde(default)]
    pub include_keywords: Option<Vec<String>>,
    /// Post is dropped if title+content contains any of these.
    #[serde(default)]
    pub exclude_keywords: Option<Vec<String>>,
    /// Post must contain all of these.
    #[serde(default)]
    pub require_all_keywords: Option<Vec<String>>,
    /// Post must have a principal file or at least one attachment.
    #[serde(default)]
    pub require_files: Option<bool>,
    /// Post must have at least one attachment.
    #[serde(default)]
    pub require_attachments: Option<bool>,
    /// Post's `published` date (first 10 characters) must be on or after this date.
    #[serde(default)]
    pub published_after: Option<String>,
    /// Post's `published` date (first 10 characters) must be on or before this date.
    #[serde(default)]
    pub published_before: Option<String>,
}

/// Single upstream proxy endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// Proxy URL used for `http://` requests.
    pub http: Option<String>,
    /// Proxy URL used for `https://` requests.
    pub https: Option<String>,
}

/// Proxy pool configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Upstream endpoints, consulted round-robin. Empty means no proxy is ever used.
    #[serde(default)]
    pub endpoints: Vec<ProxyEndpoint>,
}

/// Bind address and toggle for the REST API / RPC surfaces.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiServerConfig {
    /// Whether to start the REST API server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Address the REST API binds to.
    #[serde(default = "default_api_addr")]
    pub bind: SocketAddr,
    /// Port the single-instance RPC bridge binds to.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
}

fn default_api_addr() -> SocketAddr {
    "127.0.0.1:8787".parse().expect("valid default socket addr")
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_api_addr(),
            rpc_port: default_rpc_port(),
        }
    }
}

/// Main configuration for the fetcher.
///
/// Fields are organized into logical sub-configs for maintainability:
/// - [`download`](DownloadConfig) — directories, concurrency, what to save
/// - [`templates`](TemplateConfig) — path rendering templates
/// - [`retry`](RetryConfig) — timeouts and retry delay
/// - [`scheduler`](SchedulerConfig) — dispatch cadence and timers
/// - [`filter`](FilterConfig) — global post filter
/// - [`proxy`](ProxyConfig) — upstream proxy endpoints
/// - [`api`](ApiServerConfig) — REST API / RPC bind settings
///
/// Sub-config fields are flattened for serialization, so the on-disk `config.json` stays a
/// single document rather than a tree of nested objects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote host base URL (e.g. `"https://kemono.cr"`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory holding `config.json`, `artists.json`, `history.json`,
    /// `validation_ignore.json`, and the optional artist fragment directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding per-artist `{id}_profile.json` / `{id}_posts.json`.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Download behavior.
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Path templates.
    #[serde(flatten)]
    pub templates: TemplateConfig,

    /// Retry/timeout parameters.
    #[serde(flatten)]
    pub retry: RetryConfig,

    /// Scheduler timing.
    pub scheduler: SchedulerConfig,

    /// Global filter.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Proxy pool.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// REST API / RPC bind settings.
    #[serde(default)]
    pub api: ApiServerConfig,

    /// Validator uniqueness toggles.
    #[serde(default)]
    pub validate: ValidateConfig,
}

/// Which corpus-wide uniqueness levels the Validator checks.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ValidateConfig {
    /// Check artist-folder uniqueness.
    #[serde(default = "default_true")]
    pub artist_unique: bool,
    /// Check post-folder uniqueness.
    #[serde(default = "default_true")]
    pub post_unique: bool,
    /// Check file-path uniqueness.
    #[serde(default = "default_true")]
    pub file_unique: bool,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            artist_unique: true,
            post_unique: true,
            file_unique: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            download: DownloadConfig::default(),
            templates: TemplateConfig::default(),
            retry: RetryConfig::default(),
            scheduler: SchedulerConfig::default(),
            filter: FilterConfig::default(),
            proxy: ProxyConfig::default(),
            api: ApiServerConfig::default(),
            validate: ValidateConfig::default(),
        }
    }
}

impl Config {
    /// Resolve an effective config value for `key`, preferring the artist's override
    /// (stored as opaque JSON) over the global value, falling back to `default` if neither
    /// has an opinion. Mirrors the source's artist-override-wins-over-global pattern.
    pub fn get_artist_value<'a>(
        &self,
        artist_config: &'a HashMap<String, serde_json::Value>,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        artist_config.get(key)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.base_url, config.base_url);
        assert_eq!(back.download.max_concurrent_artists, 3);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let partial = r#"{"base_url": "https://example.test"}"#;
        let config: Config = serde_json::from_str(partial).expect("deserialize");
        assert_eq!(config.base_url, "https://example.test");
        assert_eq!(config.download.max_concurrent_posts, 4);
        assert!(config.validate.artist_unique);
    }

    #[test]
    fn artist_value_prefers_override() {
        let config = Config::default();
        let mut overrides = HashMap::new();
        overrides.insert("save_content".to_string(), serde_json::Value::Bool(true));
        let value = config.get_artist_value(&overrides, "save_content");
        assert_eq!(value, Some(&serde_json::Value::Bool(true)));
        assert_eq!(config.get_artist_value(&overrides, "missing"), None);
    }
}
