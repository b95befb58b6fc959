//! Bounded polling with linear backoff.

use std::future::Future;
use std::time::Duration;

/// Poll `check` until it returns `true` or `max_attempts` is exhausted.
///
/// The delay after attempt `n` is `base_delay * n`. Returns whether the
/// condition was met; exhaustion is not an error.
///
/// # Example
///
/// ```ignore
/// let visible = poll_until("block visibility", 5, Duration::from_millis(100), || async {
///     observer.block_visible(hash).await
/// })
/// .await;
/// ```
pub async fn poll_until<F, Fut>(
    operation_name: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=max_attempts {
        if check().await {
            tracing::debug!(attempt, "{} satisfied", operation_name);
            return true;
        }

        if attempt < max_attempts {
            tokio::time::sleep(base_delay * attempt).await;
        }
    }

    tracing::warn!(max_attempts, "{} not satisfied, giving up", operation_name);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_poll_succeeds_first_try() {
        assert!(poll_until("test op", 3, Duration::from_millis(1), || async { true }).await);
    }

    #[tokio::test]
    async fn test_poll_succeeds_after_misses() {
        let attempts = AtomicU32::new(0);

        let met = poll_until("test op", 3, Duration::from_millis(1), || {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            async move { count >= 2 }
        })
        .await;

        assert!(met);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);

        let met = poll_until("test op", 3, Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { false }
        })
        .await;

        assert!(!met);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_zero_attempts_never_checks() {
        let attempts = AtomicU32::new(0);
        let met = poll_until("test op", 0, Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { true }
        })
        .await;

        assert!(!met);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
