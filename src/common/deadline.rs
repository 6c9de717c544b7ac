use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Either the backend answered with an error or it did not answer in time.
#[derive(Debug, Error)]
pub enum DeadlineError<E> {
    #[error(transparent)]
    Failed(E),
    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Runs one backend call under `limit`.
///
/// Dropping the returned future cancels the call, so an abandoned request never
/// starts the remaining steps of its write sequence.
pub async fn with_deadline<T, E, F>(limit: Duration, call: F) -> Result<T, DeadlineError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DeadlineError::Failed(e)),
        Err(_) => Err(DeadlineError::TimedOut(limit)),
    }
}
