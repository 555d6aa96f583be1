//! Request with cookie, proxy rotation, HEAD/GET, streamed download, cancellable retry.
//!
//! Owns a cookie jar (via `reqwest`'s built-in jar), a shared [`CancellationToken`], and an
//! optional [`ProxyPool`]. All remote calls go through [`retry_forever`] so a transient network
//! failure is retried indefinitely until it succeeds or cancellation intervenes.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::proxy::ProxyPool;
use crate::retry::retry_forever;
use futures::stream::FuturesOrdered;
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";
const PAGE_SIZE: u64 = 50;
const MAX_PAGE_FETCH_CONCURRENCY: usize = 5;

/// Callbacks fired at file download boundaries. Default implementation is a no-op so callers
/// that don't care about progress can pass `&NoopCallbacks`.
pub trait DownloadCallbacks: Send + Sync {
    /// Fired once, before the first byte is written.
    fn on_start(&self, _name: &str, _size: Option<u64>) {}
    /// Fired as bytes are streamed to disk.
    fn on_progress(&self, _name: &str, _downloaded: u64, _size: Option<u64>) {}
    /// Fired once the download reaches a terminal state.
    fn on_complete(&self, _name: &str, _ok: bool) {}
}

/// No-op [`DownloadCallbacks`] for callers that don't need progress notifications.
pub struct NoopCallbacks;
impl DownloadCallbacks for NoopCallbacks {}

/// HTTP client for the remote content host.
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
    // A plain `CancellationToken` cannot be un-cancelled: `resume` must install a fresh one.
    // The Scheduler holds this client behind a shared `Arc`, so swapping the token needs
    // interior mutability rather than `&mut self`.
    cancel: std::sync::RwLock<CancellationToken>,
    proxy: Option<Arc<ProxyPool>>,
    retry: RetryConfig,
}

impl HttpClient {
    /// Build a client against `base_url`, with the given retry/timeout config and an optional
    /// proxy pool. Does not perform the landing-page GET; call [`HttpClient::init`] for that.
    pub fn new(base_url: impl Into<String>, retry: RetryConfig, proxy: Option<Arc<ProxyPool>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(retry.json_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            cancel: std::sync::RwLock::new(CancellationToken::new()),
            proxy,
            retry,
        })
    }

    /// Shared cancellation token, observed by the Downloader and Scheduler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.read().expect("cancel lock poisoned").clone()
    }

    /// Harvest cookies from a landing-page GET against the base URL.
    pub async fn init(&self) -> Result<()> {
        let url = self.base_url.clone();
        let cancel = self.cancellation_token();
        retry_forever(&cancel, self.retry.retry_delay, || {
            let url = url.clone();
            async move {
                self.client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(Error::from)
                    .map(|_| ())
            }
        })
        .await
    }

    /// Signal cancellation: in-flight requests observe this as [`Error::Cancelled`] the next
    /// time they check the token (retry loop boundary, or mid-stream chunk boundary).
    pub fn stop(&self) {
        self.cancel.read().expect("cancel lock poisoned").cancel();
    }

    /// Clear the cancellation flag and install a fresh token so future calls are not
    /// short-circuited. Does not rebuild the underlying `reqwest::Client` — its cookie jar and
    /// connection pool are reused across a stop/resume cycle.
    pub fn resume(&self) {
        *self.cancel.write().expect("cancel lock poisoned") = CancellationToken::new();
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Resolve the client to issue `url` through: the shared client with no proxy configured,
    /// or a one-off client built against the proxy pool's next round-robin endpoint.
    async fn client_for(&self, url: &str) -> Result<reqwest::Client> {
        let Some(pool) = self.proxy.as_ref() else {
            return Ok(self.client.clone());
        };
        let Some(endpoint) = pool.next().await else {
            return Ok(self.client.clone());
        };
        let is_https = url.starts_with("https://");
        let proxy_url = if is_https {
            endpoint.https.or(endpoint.http)
        } else {
            endpoint.http.or(endpoint.https)
        };
        let Some(proxy_url) = proxy_url else {
            return Ok(self.client.clone());
        };
        let proxy = reqwest::Proxy::all(proxy_url)?;
        Ok(reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(self.retry.json_timeout)
            .proxy(proxy)
            .build()?)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let cancel = self.cancellation_token();
        retry_forever(&cancel, self.retry.retry_delay, || async {
            let client = self.client_for(url).await?;
            let resp = client.get(url).send().await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(Error::RemoteNotFound(url.to_string()));
            }
            let resp = resp
                .error_for_status()
                .map_err(|e| Error::RemoteMalformed(e.to_string()))?;
            resp.json::<Value>()
                .await
                .map_err(|e| Error::RemoteMalformed(e.to_string()))
        })
        .await
    }

    /// `GET /api/v1/{service}/user/{user_id}/profile`.
    pub async fn get_profile(&self, service: &str, user_id: &str) -> Result<Value> {
        let url = self.api_url(&format!("/api/v1/{service}/user/{user_id}/profile"));
        self.get_json(&url).await
    }

    /// `GET /api/v1/{service}/user/{user_id}/posts?o={offset}`, one page of up to 50 posts.
    pub async fn get_posts(&self, service: &str, user_id: &str, offset: u64) -> Result<Vec<Value>> {
        let url = self.api_url(&format!(
            "/api/v1/{service}/user/{user_id}/posts?o={offset}"
        ));
        let value = self.get_json(&url).await?;
        match value {
            Value::Array(posts) => Ok(posts),
            other => Err(Error::RemoteMalformed(format!(
                "expected posts array, got {other}"
            ))),
        }
    }

    /// `GET /api/v1/{service}/user/{user_id}/post/{post_id}`, returning the `post` field.
    pub async fn get_post(&self, service: &str, user_id: &str, post_id: &str) -> Result<Value> {
        let url = self.api_url(&format!(
            "/api/v1/{service}/user/{user_id}/post/{post_id}"
        ));
        let value = self.get_json(&url).await?;
        value
            .get("post")
            .cloned()
            .ok_or_else(|| Error::RemoteMalformed("missing `post` field".to_string()))
    }

    /// Fetch the profile to learn the total post count, then concurrently fetch
    /// `ceil(total/50)` pages with a small bounded pool, merging results in page order.
    pub async fn get_all_posts(&self, service: &str, user_id: &str) -> Result<Vec<Value>> {
        let profile = self.get_profile(service, user_id).await?;
        let total = profile
            .get("post_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::RemoteMalformed("profile missing post_count".to_string()))?;

        let page_count = total.div_ceil(PAGE_SIZE).max(1);
        let mut futures = FuturesOrdered::new();
        let mut in_flight = 0usize;
        let mut pages: Vec<Vec<Value>> = Vec::new();

        for page in 0..page_count {
            let offset = page * PAGE_SIZE;
            futures.push_back(self.get_posts(service, user_id, offset));
            in_flight += 1;
            if in_flight >= MAX_PAGE_FETCH_CONCURRENCY {
                if let Some(result) = futures.next().await {
                    pages.push(result?);
                    in_flight -= 1;
                }
            }
        }
        while let Some(result) = futures.next().await {
            pages.push(result?);
        }

        Ok(pages.into_iter().flatten().collect())
    }

    /// Issue a standalone `HEAD` to learn `Content-Length`, if the server reports one.
    pub async fn head_content_length(&self, url: &str) -> Result<Option<u64>> {
        let cancel = self.cancellation_token();
        retry_forever(&cancel, self.retry.retry_delay, || async {
            let resp = self.client.head(url).send().await?;
            Ok(resp.content_length())
        })
        .await
    }

    /// Stream `url` to `dest_path`, honoring the skip-if-identical-size and
    /// collision-disambiguation rules described in §4.4.
    pub async fn download_file(
        &self,
        url: &str,
        dest_path: &Path,
        callbacks: &dyn DownloadCallbacks,
    ) -> Result<bool> {
        let name = dest_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let cancel = self.cancellation_token();
        retry_forever(&cancel, self.retry.retry_delay, || {
            let name = name.clone();
            async move { self.download_file_once(url, dest_path, &name, callbacks).await }
        })
        .await
    }

    async fn download_file_once(
        &self,
        url: &str,
        dest_path: &Path,
        name: &str,
        callbacks: &dyn DownloadCallbacks,
    ) -> Result<bool> {
        let cancel = self.cancellation_token();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let client = self.client_for(url).await?;
        let resp = client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(Error::Network)?;

        let content_length = match resp.content_length() {
            Some(len) => Some(len),
            None => self.head_content_length(url).await?,
        };

        if let (Some(len), Ok(meta)) = (content_length, tokio::fs::metadata(dest_path).await) {
            if meta.len() == len {
                callbacks.on_complete(name, true);
                return Ok(true);
            }
        }

        callbacks.on_start(name, content_length);

        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = dest_path.with_extension(append_tmp_ext(dest_path));
        // A prior attempt may have left a stale temp file behind (crash, or the original
        // process still releasing the handle); clear it rather than failing the create.
        for attempt in 0..3 {
            match tokio::fs::remove_file(&tmp_path).await {
                Ok(()) | Err(_) if attempt == 2 => break,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                _ => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
            }
        }
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        let mut downloaded: u64 = 0;
        let mut stream = resp.bytes_stream();

        let write_result: Result<()> = async {
            while let Some(chunk) = stream.next().await {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let chunk = chunk.map_err(Error::Network)?;
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                callbacks.on_progress(name, downloaded, content_length);
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            callbacks.on_complete(name, false);
            return Err(e);
        }

        let final_path = unique_destination(dest_path).await;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        callbacks.on_complete(name, true);
        Ok(true)
    }
}

fn append_tmp_ext(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    }
}

/// If `path` already exists, append `" (N)"` before the extension until the candidate is free.
async fn unique_destination(path: &Path) -> PathBuf {
    if tokio::fs::metadata(path).await.is_err() {
        return path.to_path_buf();
    }
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let ext = path.extension().and_then(|e| e.to_str());

    let mut n = 1;
    loop {
        let candidate_name = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = parent.join(candidate_name);
        if tokio::fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
        n += 1;
    }
}
