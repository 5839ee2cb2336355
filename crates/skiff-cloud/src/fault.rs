//! Fault classification for gateway calls
//!
//! Backends raise `CloudError` for everything the wire reports; the
//! helpers here apply the recovery policy:
//!
//! - `NotFound` on a lookup becomes an absent value so callers can
//!   write plain existence checks.
//! - `OverLimit` on a resource-creating call gets one retry after the
//!   backend's hinted delay, never more.
//! - Duplicate creation of an idempotent resource is recorded and
//!   swallowed.
//! - `BadEndpoint` is never handled here; it propagates and fails the
//!   whole invocation.

use crate::error::{CloudError, Result};
use std::future::Future;

/// Translate a backend "not found" into an absent value.
///
/// Used at the gateway boundary by `find_*` operations, so exception
/// control flow from the backend never leaks past it.
pub fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CloudError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Swallow a duplicate-creation conflict for an idempotent resource.
pub fn idempotent(result: Result<()>) -> Result<()> {
    match result {
        Err(CloudError::AlreadyExists(what)) => {
            tracing::info!(resource = %what, "already exists, continuing");
            Ok(())
        }
        other => other,
    }
}

/// Run a resource-creating call, retrying exactly once when the
/// backend is over limit and supplies a retry hint.
///
/// Without a hint, or when the retry is limited again, the error is
/// fatal. There is deliberately no loop here.
pub async fn retry_over_limit<T, F, Fut>(what: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match call().await {
        Err(CloudError::OverLimit {
            message,
            retry_after: Some(delay),
        }) => {
            tracing::debug!(
                %message,
                delay_secs = delay.as_secs(),
                "request was limited, retrying after backend hint"
            );
            tokio::time::sleep(delay).await;

            match call().await {
                Err(CloudError::OverLimit { message, .. }) => {
                    tracing::error!(%message, "unable to allocate {what}: still over limit");
                    Err(CloudError::OverLimit {
                        message,
                        retry_after: None,
                    })
                }
                other => other,
            }
        }
        Err(CloudError::OverLimit {
            message,
            retry_after: None,
        }) => {
            tracing::error!(%message, "unable to allocate {what}: no retry hint supplied");
            Err(CloudError::OverLimit {
                message,
                retry_after: None,
            })
        }
        other => other,
    }
}
