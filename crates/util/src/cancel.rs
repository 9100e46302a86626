//! Cancellation and timeout wrappers for I/O futures.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use utcp_types::UtcpError;

/// Runs `future` until it completes or `cancel` fires.
pub async fn cancellable<F, T>(cancel: &CancellationToken, operation: &str, future: F) -> Result<T, UtcpError>
where
    F: Future<Output = Result<T, UtcpError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(UtcpError::cancelled(operation)),
        result = future => result,
    }
}

/// Like [`cancellable`], additionally bounded by an optional timeout.
///
/// Dropping the inner future on cancellation or timeout releases whatever it
/// owns, so children spawned with `kill_on_drop` are reaped.
pub async fn cancellable_with_timeout<F, T>(
    cancel: &CancellationToken,
    operation: &str,
    timeout: Option<Duration>,
    future: F,
) -> Result<T, UtcpError>
where
    F: Future<Output = Result<T, UtcpError>>,
{
    match timeout {
        Some(limit) => {
            let bounded = async {
                tokio::time::timeout(limit, future)
                    .await
                    .map_err(|_| UtcpError::transport(format!("{operation} timed out after {}ms", limit.as_millis())))?
            };
            cancellable(cancel, operation, bounded).await
        }
        None => cancellable(cancel, operation, future).await,
    }
}
