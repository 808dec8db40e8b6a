use std::time::Duration;

use tokio_util::sync::CancellationToken;

const MAX_WAIT_ITERATIONS: usize = 50;
const DEFAULT_CAP: Duration = Duration::from_secs(30);
const DEFAULT_BASE: Duration = Duration::from_millis(250);

/// Sleeps for `backoff_full_jitter(base, cap, attempt)`, bailing out early
/// (without sleeping the full interval) if `cancel` fires first. Used by
/// the event handlers' retry loop so a cancelled job never blocks
/// shutdown for longer than the in-flight delay.
pub async fn backoff_sleep(cancel: &CancellationToken, attempt: usize) -> Result<(), Cancelled> {
    backoff_sleep_with(cancel, attempt, DEFAULT_BASE, DEFAULT_CAP).await
}

pub async fn backoff_sleep_with(
    cancel: &CancellationToken,
    attempt: usize,
    base: Duration,
    cap: Duration,
) -> Result<(), Cancelled> {
    let attempt = attempt.min(MAX_WAIT_ITERATIONS);
    let delay = backoff_full_jitter(base, cap, attempt);

    tokio::select! {
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("context cancelled while waiting for retry backoff")]
pub struct Cancelled;

/// Exponential backoff w/ "full jitter":
/// sleep for a random duration in [0, min(cap, base * 2^attempt)].
///
/// This tends to behave well under contention and avoids lockstep
/// retries across many concurrently-failing fan-out calls.
pub fn backoff_full_jitter(base: Duration, cap: Duration, attempt: usize) -> Duration {
    let base_ms = base.as_millis() as u64;
    let cap_ms = cap.as_millis() as u64;

    let pow = if attempt >= 63 {
        u64::MAX
    } else {
        1u64 << attempt
    };

    let exp_ms = base_ms.saturating_mul(pow);
    let upper = exp_ms.min(cap_ms).max(1);

    let jitter_ms = rand::random_range(0..=upper);
    Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_jitter_never_exceeds_cap() {
        let cap = Duration::from_secs(10);
        for attempt in 0..40 {
            let d = backoff_full_jitter(Duration::from_millis(250), cap, attempt);
            assert!(d <= cap);
        }
    }

    #[tokio::test]
    async fn backoff_sleep_returns_err_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = backoff_sleep(&cancel, 5).await;
        assert!(result.is_err());
    }
}
