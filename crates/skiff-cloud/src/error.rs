//! Cloud gateway error types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by cloud gateway operations
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("multiple matches for `{0}`; specify an id to disambiguate")]
    AmbiguousMatch(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Quota or rate limit hit. `retry_after` carries the backend's
    /// retry hint when one was supplied.
    #[error("over limit: {message}")]
    OverLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("no free floating IPs available in the project pool")]
    NoIpsAvailable,

    /// The endpoint is unreachable, misconfigured, or rejected the
    /// request outright. Never retried.
    #[error("endpoint error: {0}")]
    BadEndpoint(String),

    #[error("timed out waiting for {0}")]
    ReadinessTimeout(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
