//! Round-robin proxy selection, owned singly at the composition root.
//!
//! Unlike the distilled source's process-wide singleton with subprocess lifecycle management,
//! this crate owns exactly one [`ProxyPool`] instance inside the top-level downloader struct and
//! passes a shared `Arc` handle down — no module-level statics. A null/absent pool (no
//! endpoints configured) yields `None` for every request, which [`crate::http_client`] treats as
//! "no proxy".

use crate::config::ProxyEndpoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Round-robin pool of `{http, https}` proxy endpoints.
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    // `Mutex` rather than a bare atomic index: bumping the index and reading the endpoint at
    // that index must happen as one step, or two concurrent callers could both read index N
    // and then both bump past it, skipping N+1 entirely.
    index: Mutex<usize>,
    requests_served: AtomicUsize,
}

impl ProxyPool {
    /// Build a pool from configured endpoints. An empty list is a valid, always-`None` pool.
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self {
            endpoints,
            index: Mutex::new(0),
            requests_served: AtomicUsize::new(0),
        }
    }

    /// True if this pool has at least one endpoint to rotate through.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// The next endpoint in round-robin order, or `None` if the pool has no endpoints.
    pub async fn next(&self) -> Option<ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        let mut index = self.index.lock().await;
        let endpoint = self.endpoints[*index % self.endpoints.len()].clone();
        *index = (*index + 1) % self.endpoints.len();
        Some(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(tag: &str) -> ProxyEndpoint {
        ProxyEndpoint {
            http: Some(format!("http://proxy-{tag}:8080")),
            https: Some(format!("http://proxy-{tag}:8080")),
        }
    }

    #[tokio::test]
    async fn empty_pool_always_yields_none() {
        let pool = ProxyPool::new(vec![]);
        assert!(pool.is_empty());
        assert!(pool.next().await.is_none());
    }

    #[tokio::test]
    async fn rotates_round_robin_and_wraps() {
        let pool = ProxyPool::new(vec![endpoint("a"), endpoint("b")]);
        let first = pool.next().await.unwrap();
        let second = pool.next().await.unwrap();
        let third = pool.next().await.unwrap();
        assert_eq!(first.http, Some("http://proxy-a:8080".to_string()));
        assert_eq!(second.http, Some("http://proxy-b:8080".to_string()));
        assert_eq!(third.http, first.http);
    }

    #[tokio::test]
    async fn concurrent_callers_each_get_a_distinct_slot() {
        let pool = std::sync::Arc::new(ProxyPool::new(vec![endpoint("a"), endpoint("b"), endpoint("c")]));
        let mut handles = Vec::new();
        for _ in 0..9 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.next().await }));
        }
        let mut seen = std::collections::HashMap::new();
        for handle in handles {
            let endpoint = handle.await.unwrap().unwrap();
            *seen.entry(endpoint.http.unwrap()).or_insert(0) += 1;
        }
        // 9 requests over 3 endpoints, perfectly round-robin, each endpoint served exactly 3.
        assert_eq!(seen.len(), 3);
        for count in seen.values() {
            assert_eq!(*count, 3);
        }
    }
}
