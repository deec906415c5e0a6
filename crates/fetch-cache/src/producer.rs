//! Caller-supplied request functions

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::BoxError;

/// One remote request returning a value or an error.
///
/// Producers may be called several times when the retry budget allows it.
pub type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// Wrap an async closure as a producer
pub fn producer<T, F, Fut>(f: F) -> Producer<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Wrap a blocking closure as a producer; each call runs on the blocking pool
pub fn blocking_producer<T, F>(f: F) -> Producer<T>
where
    T: Send + 'static,
    F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move || {
        let f = f.clone();
        async move {
            tokio::task::spawn_blocking(move || f())
                .await
                .map_err(|e| -> BoxError { Box::new(e) })?
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_async_producer() {
        let p = producer(|| async { Ok::<_, BoxError>(vec!["AC_H0_MFI".to_string()]) });
        assert_eq!(p().await.unwrap(), vec!["AC_H0_MFI".to_string()]);
    }

    #[tokio::test]
    async fn test_blocking_producer_can_be_called_repeatedly() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let p = blocking_producer(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err("first call fails".into())
            } else {
                Ok(n)
            }
        });

        assert!(p().await.is_err());
        assert_eq!(p().await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
