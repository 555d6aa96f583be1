//! Route handlers for the REST API.
//!
//! Organized by domain, matching the endpoint groups named in the external-interfaces section
//! this surface implements:
//! - [`artists`] — artist CRUD
//! - [`queue`] — manual enqueue, cancel-all, queue status
//! - [`config`] — global config read/write
//! - [`history`] — command history
//! - [`system`] — health, OpenAPI spec, SSE event stream

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod artists;
mod config;
mod history;
mod queue;
mod system;

pub use artists::*;
pub use config::*;
pub use history::*;
pub use queue::*;
pub use system::*;

/// Query parameters for `GET /api/history`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryQuery {
    /// Maximum number of records to return (default 50).
    pub limit: Option<usize>,
}

/// Request body for `POST /api/queue` (manual enqueue).
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueueManualRequest {
    /// Artist id to enqueue.
    pub artist_id: String,
    /// Inclusive lower bound on `published`, for a date-range rerun.
    #[serde(default)]
    pub from_date: Option<chrono::DateTime<chrono::Utc>>,
    /// Inclusive upper bound on `published`, for a date-range rerun.
    #[serde(default)]
    pub until_date: Option<chrono::DateTime<chrono::Utc>>,
}

/// Response body for `POST /api/queue`.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueManualResponse {
    /// False if an equal-keyed task was already queued or running and this call was a no-op.
    pub enqueued: bool,
}
