use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

use crate::model::Coordinates;

/// Failure below the HTTP status line: connection, timeout, body read.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    /// No connection could be established. Custom [`Transport`](crate::Transport)
    /// implementations report their own connect failures here too.
    #[error("connection error: {0}")]
    Connection(String),
}

/// Why a single sample, and therefore a whole aggregation, failed.
///
/// Every variant is terminal: nothing is retried internally.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("send request error: {source}")]
    Transport {
        #[from]
        source: TransportError,
    },

    #[error("[429] request limit expired (dt={at}, location={location})")]
    RateLimited {
        at: DateTime<Utc>,
        location: Coordinates,
    },

    #[error("[{status}] remote error (dt={at}, location={location}): {body}")]
    Remote {
        status: u16,
        at: DateTime<Utc>,
        location: Coordinates,
        body: String,
    },

    #[error("parse response error: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },

    #[error("response has no temperature")]
    EmptyResult,

    #[error("request cancelled")]
    Cancelled,

    #[error("sample task failed: {source}")]
    Task {
        #[source]
        source: JoinError,
    },
}

/// Fieldless mirror of [`SampleError`] for matching on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    RateLimited,
    Remote,
    Parse,
    EmptyResult,
    Cancelled,
    Task,
}

impl SampleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SampleError::Transport { .. } => ErrorKind::Transport,
            SampleError::RateLimited { .. } => ErrorKind::RateLimited,
            SampleError::Remote { .. } => ErrorKind::Remote,
            SampleError::Parse { .. } => ErrorKind::Parse,
            SampleError::EmptyResult => ErrorKind::EmptyResult,
            SampleError::Cancelled => ErrorKind::Cancelled,
            SampleError::Task { .. } => ErrorKind::Task,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SampleError::Cancelled)
    }
}

/// Rejected configuration, reported before any request is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample count must be at least 1, got {0}")]
    InvalidSampleCount(usize),

    #[error("max_connections must be at least 1")]
    InvalidPoolSize,

    #[error("request timeout must be at least 1 second")]
    InvalidTimeout,

    #[error("No API token configured.\nHint: run `dailytemp configure` or pass --token.")]
    MissingToken,

    #[error("invalid host '{host}': {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
