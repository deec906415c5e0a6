//! Fixed-budget retry loop

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a retried operation produced no value
#[derive(Debug)]
pub enum RetryError<E> {
    /// All attempts failed; holds the error of the last attempt
    Exhausted { attempts: u32, last: E },
    /// The token was cancelled before an attempt could start
    Cancelled,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "failed after {} attempt(s): {}", attempts, last)
            }
            RetryError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Run `op` up to `max_attempts` times and return the first success.
///
/// The operation receives the 1-based attempt number. Cancellation is checked
/// before every attempt, never during one. A budget of 0 is treated as 1.
pub async fn with_retries<T, E, F, Fut>(
    max_attempts: u32,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let budget = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= budget => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: e,
                })
            }
            Err(e) => {
                debug!(attempt, budget, error = %e, "Attempt failed, retrying");
            }
        }
    }
}
