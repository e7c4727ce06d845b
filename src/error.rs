//! Typed errors for each pipeline stage.
//!
//! Stage functions return these so callers can apply the right policy
//! (fatal, degrade, or skip); the CLI wraps them in `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to enumerate tabs from the debugging endpoint.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot reach debugging endpoint {endpoint} (is the browser running with --remote-debugging-port?): {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("debugging endpoint {endpoint} returned an invalid target list: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Failure to retrieve one page's text.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} has unsupported content type '{content_type}'")]
    UnsupportedContentType { url: String, content_type: String },
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    /// The URL cannot be requested at all (bad syntax, non-HTTP scheme).
    #[error("cannot request {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Request { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::UnsupportedContentType { .. } | FetchError::InvalidUrl { .. } => false,
        }
    }
}

/// Every configured provider failed or was skipped.
#[derive(Debug, Error)]
#[error("all categorization providers failed: {}", format_attempts(.attempts))]
pub struct CategorizationError {
    /// `(provider, reason)` in the order they were tried.
    pub attempts: Vec<(String, String)>,
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    if attempts.is_empty() {
        return "no providers configured".to_string();
    }
    attempts
        .iter()
        .map(|(provider, reason)| format!("{}: {}", provider, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure to persist a session.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// An existing same-day snapshot could not be read back, so appending
    /// to it would lose records.
    #[error("existing snapshot {path} is not valid: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SaveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SaveError::Io {
            path: path.into(),
            source,
        }
    }
}
