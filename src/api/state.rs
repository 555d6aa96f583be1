//! Application state for the API server.

use crate::Fetcher;
use std::sync::Arc;

/// Shared application state handed to every route handler.
///
/// Cloned per request (cheap `Arc` clone); every handler reaches the core exclusively through
/// this one composition root.
#[derive(Clone)]
pub struct AppState {
    /// The composition root this API surface is a thin contract over.
    pub fetcher: Arc<Fetcher>,
}

impl AppState {
    /// Build state wrapping `fetcher`.
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}
