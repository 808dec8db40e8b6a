use aas_common::error::AdapterError;
use aas_common::wait::backoff_sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Outcome of a retried handler operation, distinguishing cancellation
/// from a permanent error so the router never writes a cancelled
/// in-flight retry to the dead letter queue (P6).
pub enum RetryOutcome<T> {
    Done(T),
    Permanent(AdapterError),
    Cancelled,
}

/// Runs `op` until it succeeds, returns a non-temporary error, or `cancel`
/// fires. Mirrors the upstream's implicit contract that handlers keep
/// retrying on temporary errors while permanent errors flow straight to
/// the dead letter queue: the distinction here is made explicit via
/// `AdapterError::is_temporary`, rather than left to each handler body.
pub async fn retry_until_permanent<F, Fut, T>(cancel: &CancellationToken, op: F) -> RetryOutcome<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, AdapterError>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return RetryOutcome::Done(value),
            Err(e) if e.is_temporary() => {
                warn!(attempt, error = %e, "temporary error, retrying after backoff");
                if backoff_sleep(cancel, attempt).await.is_err() {
                    return RetryOutcome::Cancelled;
                }
                attempt += 1;
            }
            Err(e) => return RetryOutcome::Permanent(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let cancel = CancellationToken::new();
        let outcome = retry_until_permanent(&cancel, || async { Ok::<_, AdapterError>(42) }).await;
        assert!(matches!(outcome, RetryOutcome::Done(42)));
    }

    #[tokio::test]
    async fn permanent_error_stops_without_retry() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let outcome = retry_until_permanent(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AdapterError::UserNotFound("x".into())) }
        })
        .await;
        assert!(matches!(outcome, RetryOutcome::Permanent(AdapterError::UserNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_yields_cancelled_not_dlq() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = retry_until_permanent(&cancel, || async {
            Err::<(), _>(AdapterError::Api { status: 503, body: String::new() })
        })
        .await;
        assert!(matches!(outcome, RetryOutcome::Cancelled));
    }

    #[tokio::test]
    async fn temporary_error_retries_until_success() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let outcome = retry_until_permanent(&cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AdapterError::Api { status: 500, body: String::new() })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert!(matches!(outcome, RetryOutcome::Done(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
