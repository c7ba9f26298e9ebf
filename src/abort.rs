//! Racing a future against a cancellation signal.

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Marker returned when a raced future lost to its cancellation signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("aborted")]
pub struct Aborted;

/// Race `future` against `signal`.
///
/// If the signal is already triggered the future is never polled. If it triggers
/// mid-flight the future is dropped, so its eventual outcome is discarded rather than
/// left dangling. If the signal never fires, the race settles with the future's output
/// and no listener survives.
pub async fn abortable<F: Future>(
    future: F,
    signal: &CancellationToken,
) -> Result<F::Output, Aborted> {
    if signal.is_cancelled() {
        return Err(Aborted);
    }
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(Aborted),
        output = future => Ok(output),
    }
}
