//! Bounded sleep-and-repoll primitive
//!
//! Cloud state transitions complete out of band; the only portable way
//! to observe them is to re-fetch fresh state until a predicate holds.
//! The predicate does the fetching, so nothing here ever trusts a
//! cached snapshot.

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;

/// Re-evaluate `predicate` until it returns true, up to `max_attempts`
/// times, sleeping `interval` between attempts.
///
/// Exhausting the attempts raises [`CloudError::ReadinessTimeout`]
/// carrying `reason`; a falsy outcome is never reported as success.
/// Predicate errors propagate immediately.
pub async fn wait_until<F, Fut>(
    reason: &str,
    max_attempts: u32,
    interval: Duration,
    mut predicate: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 1..=max_attempts {
        if predicate().await? {
            tracing::debug!(reason, attempt, "condition satisfied");
            return Ok(());
        }
        if attempt % 5 == 0 {
            tracing::info!("...waiting for {reason}");
        }
        tokio::time::sleep(interval).await;
    }

    Err(CloudError::ReadinessTimeout(reason.to_string()))
}
