//! Retry of idempotent remote reads
//!
//! Listings, describes and job/task polling are retried with exponential
//! backoff when they fail at the transport level. Mutating calls never pass
//! through here.

use crate::error::{Error, Result};
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run a read-only call, retrying transient failures for at most `window`
pub async fn retry_reads<T, F, Fut>(window: Duration, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(250),
        max_elapsed_time: Some(window),
        ..ExponentialBackoff::default()
    };

    backoff::future::retry(policy, || {
        let attempt = call();
        async move {
            attempt.await.map_err(|e| {
                if e.is_transient() {
                    warn!(error = %e, "transient failure on read, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}

/// Map a reqwest transport failure into a remote call error
pub fn transport_error(system: &str, operation: &str, err: reqwest::Error) -> Error {
    Error::RemoteCall {
        system: system.to_string(),
        operation: operation.to_string(),
        transient: err.is_connect() || err.is_timeout(),
        reason: err.to_string(),
    }
}
