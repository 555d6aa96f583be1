//! Error types for kemono-fetch
//!
//! Realizes the error taxonomy as a single `thiserror`-derived enum, with a companion
//! [`ToHttpStatus`] mapping used by the REST API and RPC bridge to turn an internal
//! error into an externally-visible status code and machine-readable error code.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for kemono-fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Each variant corresponds to one taxonomy class from the error handling design:
/// network/transient failures are retried by [`crate::retry`] before ever reaching a caller
/// as an `Error`, so a live `Error::Network` here means the retry budget for a *non*-retried
/// call path (i.e. one that deliberately propagates on first failure) was exhausted, or that
/// cancellation intervened.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection, timeout, or other HTTP-transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The operation was cancelled via `cancel_all` / the shared cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// The remote returned a non-transient "not found" style status for an artist, post, or
    /// file.
    #[error("remote resource not found: {0}")]
    RemoteNotFound(String),

    /// The remote returned a response that could not be decoded as the expected shape.
    #[error("malformed remote response: {0}")]
    RemoteMalformed(String),

    /// A local filesystem operation (mkdir, rename, write) failed.
    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    /// A template substitution or rendered path was invalid.
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Human-readable description of what was invalid.
        message: String,
        /// The configuration key involved, if known.
        key: Option<String>,
    },

    /// JSON (de)serialization failure against a durable store.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A date/time string could not be parsed.
    #[error("date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),

    /// An unexpected condition; caught at a worker boundary and recorded rather than crashing
    /// the scheduler.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::ConfigInvalid`] without a specific key.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Error::ConfigInvalid {
            message: message.into(),
            key: None,
        }
    }

    /// Shorthand for [`Error::ConfigInvalid`] naming the offending key.
    pub fn config_invalid_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::ConfigInvalid {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Machine-readable status pair: an HTTP-style status code plus a stable snake_case code,
/// suitable for both the REST API's JSON error body and the RPC bridge's response frame.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorStatus {
    /// HTTP-style status code (also meaningful outside the REST surface as a severity hint).
    pub status_code: u16,
    /// Stable machine-readable error code, e.g. `"remote_not_found"`.
    pub error_code: &'static str,
    /// Human-readable message, suitable for display.
    pub message: String,
}

/// Maps an [`Error`] to an externally-visible status, matching the taxonomy in §7 of the
/// specification this crate implements.
pub trait ToHttpStatus {
    /// HTTP-style status code for this error.
    fn status_code(&self) -> u16;
    /// Stable, machine-readable error code for this error.
    fn error_code(&self) -> &'static str;
    /// Bundle both plus a display message into one [`ErrorStatus`].
    fn to_error_status(&self) -> ErrorStatus;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Network(_) => 502,
            Error::Cancelled => 499,
            Error::RemoteNotFound(_) => 404,
            Error::RemoteMalformed(_) => 502,
            Error::LocalIo(_) => 500,
            Error::ConfigInvalid { .. } => 400,
            Error::Serialization(_) => 500,
            Error::DateParse(_) => 400,
            Error::Internal(_) => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Error::Network(_) => "network_transient",
            Error::Cancelled => "cancelled",
            Error::RemoteNotFound(_) => "remote_not_found",
            Error::RemoteMalformed(_) => "remote_malformed",
            Error::LocalIo(_) => "local_io",
            Error::ConfigInvalid { .. } => "config_invalid",
            Error::Serialization(_) => "serialization",
            Error::DateParse(_) => "date_parse",
            Error::Internal(_) => "internal",
        }
    }

    fn to_error_status(&self) -> ErrorStatus {
        ErrorStatus {
            status_code: self.status_code(),
            error_code: self.error_code(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_maps_to_499() {
        let e = Error::Cancelled;
        assert_eq!(e.status_code(), 499);
        assert_eq!(e.error_code(), "cancelled");
    }

    #[test]
    fn remote_not_found_maps_to_404() {
        let e = Error::RemoteNotFound("patreon/1/post/9".into());
        assert_eq!(e.status_code(), 404);
        assert_eq!(e.error_code(), "remote_not_found");
    }

    #[test]
    fn config_invalid_carries_key() {
        let e = Error::config_invalid_key("bad template", "post_folder_template");
        match &e {
            Error::ConfigInvalid { key, .. } => {
                assert_eq!(key.as_deref(), Some("post_folder_template"))
            }
            _ => panic!("wrong variant"),
        }
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn to_error_status_bundles_message() {
        let status = Error::Internal("boom".into()).to_error_status();
        assert_eq!(status.status_code, 500);
        assert_eq!(status.error_code, "internal");
        assert!(status.message.contains("boom"));
    }
}
