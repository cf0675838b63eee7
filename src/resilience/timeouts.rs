//! Timeout enforcement for suspension points.
//!
//! Every call that leaves the process (key-holder, nonce source, identity
//! resolver, approval gate, publisher, transport) goes through [`bounded`].
//! Expiry is reported as [`RelayError::Timeout`], distinct from the
//! collaborator's own failures.

use std::future::Future;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};

/// Await `fut`, failing with `Timeout` if it does not finish within `limit`.
pub async fn bounded<F, T>(operation: &'static str, limit: Duration, fut: F) -> RelayResult<T>
where
    F: Future<Output = RelayResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, after_ms = limit.as_millis() as u64, "Suspension point timed out");
            Err(RelayError::Timeout {
                operation,
                after_ms: limit.as_millis() as u64,
            })
        }
    }
}
