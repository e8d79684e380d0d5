//! Waiting admission on top of [`RateLimiter::try_admit`].
//!
//! A full window suspends the caller on a timer; the limiter lock is only
//! taken inside `try_admit`, never across the wait. After every wait the
//! check runs again, because other callers compete for the fresh window.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::{AdmissionDecision, RateLimitError, RateLimiter};

/// Acquire a slot, waiting as long as necessary.
///
/// Returns the time spent waiting. Dropping the future while it waits
/// abandons the wait without consuming a slot.
pub async fn acquire<L>(limiter: &L) -> Duration
where
    L: RateLimiter + ?Sized,
{
    let start = Instant::now();

    loop {
        match limiter.try_admit() {
            AdmissionDecision::Admitted => return start.elapsed(),
            AdmissionDecision::Wait(wait) => {
                debug!(wait_ms = wait.as_millis(), "Window full, waiting for reset");
                sleep(wait).await;
            }
        }
    }
}

/// Acquire a slot unless `cancel` completes first.
///
/// `cancel` is checked before every admission attempt, so a caller that is
/// already cancelled on arrival takes no slot.
///
/// # Errors
///
/// Returns `RateLimitError::Cancelled` if `cancel` resolves before a slot is
/// taken. No slot is consumed in that case.
pub async fn acquire_until<L, F>(limiter: &L, cancel: F) -> Result<Duration, RateLimitError>
where
    L: RateLimiter + ?Sized,
    F: Future,
{
    acquire_within_until(limiter, Duration::MAX, cancel).await
}

/// Acquire a slot, giving up if the wait would exceed `max_wait`.
///
/// # Errors
///
/// Returns `RateLimitError::WaitExceeded` as soon as the required wait is
/// known to overrun `max_wait`; no slot is consumed.
pub async fn acquire_within<L>(limiter: &L, max_wait: Duration) -> Result<Duration, RateLimitError>
where
    L: RateLimiter + ?Sized,
{
    acquire_within_until(limiter, max_wait, std::future::pending::<()>()).await
}

/// Acquire a slot within `max_wait` unless `cancel` completes first.
///
/// # Errors
///
/// Returns `RateLimitError::Cancelled` if `cancel` resolves before a slot is
/// taken, or `RateLimitError::WaitExceeded` once the required wait is known
/// to overrun `max_wait`. Neither consumes a slot.
pub async fn acquire_within_until<L, F>(
    limiter: &L,
    max_wait: Duration,
    cancel: F,
) -> Result<Duration, RateLimitError>
where
    L: RateLimiter + ?Sized,
    F: Future,
{
    let start = Instant::now();
    tokio::pin!(cancel);

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => return Err(cancelled(start)),
            () = std::future::ready(()) => {}
        }

        match limiter.try_admit() {
            AdmissionDecision::Admitted => return Ok(start.elapsed()),
            AdmissionDecision::Wait(wait_time) => {
                let waited = start.elapsed();

                if waited.saturating_add(wait_time) > max_wait {
                    debug!(
                        wait_ms = wait_time.as_millis(),
                        max_wait_ms = max_wait.as_millis(),
                        "Admission deadline exceeded"
                    );
                    return Err(RateLimitError::WaitExceeded {
                        wait_time: waited + wait_time,
                        max_wait,
                        waited,
                    });
                }

                debug!(wait_ms = wait_time.as_millis(), "Window full, waiting for reset");
                tokio::select! {
                    biased;
                    _ = &mut cancel => return Err(cancelled(start)),
                    () = sleep(wait_time) => {}
                }
            }
        }
    }
}

fn cancelled(start: Instant) -> RateLimitError {
    let waited = start.elapsed();
    debug!(waited_ms = waited.as_millis(), "Admission wait cancelled");
    RateLimitError::Cancelled { waited }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedWindow;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_immediate() {
        let limiter = FixedWindow::new(2, Duration::from_secs(1)).unwrap();

        assert_eq!(acquire(&limiter).await, Duration::ZERO);
        assert_eq!(acquire(&limiter).await, Duration::ZERO);
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_next_window() {
        let limiter = FixedWindow::new(1, Duration::from_millis(250)).unwrap();
        acquire(&limiter).await;

        let waited = acquire(&limiter).await;
        assert!(waited >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_until_cancelled() {
        let limiter = FixedWindow::new(1, Duration::from_secs(1)).unwrap();
        acquire(&limiter).await;

        let result = acquire_until(&limiter, sleep(Duration::from_millis(10))).await;

        match result {
            Err(RateLimitError::Cancelled { waited }) => {
                assert!(waited < Duration::from_secs(1));
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_until_admitted_before_cancel() {
        let limiter = FixedWindow::new(1, Duration::from_millis(100)).unwrap();
        acquire(&limiter).await;

        let waited = acquire_until(&limiter, sleep(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(waited >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_cancel_takes_no_slot() {
        let limiter = FixedWindow::new(1, Duration::from_secs(1)).unwrap();

        let err = acquire_until(&limiter, std::future::ready(()))
            .await
            .unwrap_err();

        assert!(matches!(err, RateLimitError::Cancelled { waited } if waited == Duration::ZERO));
        assert_eq!(limiter.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_wait_and_admit() {
        let limiter = FixedWindow::new(1, Duration::from_millis(100)).unwrap();
        acquire(&limiter).await;

        // Cancel and window reset land on the same instant
        let result = acquire_until(&limiter, sleep(Duration::from_millis(100))).await;

        assert!(matches!(result, Err(RateLimitError::Cancelled { .. })));
        assert_eq!(limiter.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_exceeded() {
        let limiter = FixedWindow::new(1, Duration::from_secs(10)).unwrap();
        acquire(&limiter).await;

        let err = acquire_within(&limiter, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        // Fails fast: nothing was actually waited
        assert!(matches!(
            err,
            RateLimitError::WaitExceeded { waited, .. } if waited == Duration::ZERO
        ));
    }

    /// Limiter that never has room.
    struct AlwaysFull;

    impl RateLimiter for AlwaysFull {
        fn try_admit(&self) -> AdmissionDecision {
            AdmissionDecision::Wait(Duration::from_millis(100))
        }
        fn remaining(&self) -> u32 {
            0
        }
        fn wait_time(&self) -> Duration {
            Duration::from_millis(100)
        }
        fn reset(&self) {}
        fn state(&self) -> crate::RateLimitState {
            crate::RateLimitState {
                limit: 1,
                remaining: 0,
                reset_after: Duration::from_millis(100),
                is_limited: true,
            }
        }
        fn limit(&self) -> u32 {
            1
        }
        fn window(&self) -> Duration {
            Duration::from_millis(100)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_reports_time_waited() {
        // Two 100ms waits fit in 250ms, the third does not
        let err = acquire_within(&AlwaysFull, Duration::from_millis(250))
            .await
            .unwrap_err();

        match err {
            RateLimitError::WaitExceeded {
                wait_time,
                max_wait,
                waited,
            } => {
                assert!(waited >= Duration::from_millis(200));
                assert!(waited < Duration::from_millis(250));
                assert_eq!(wait_time, waited + Duration::from_millis(100));
                assert_eq!(max_wait, Duration::from_millis(250));
            }
            other => panic!("expected wait exceeded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_until_cancelled() {
        let limiter = FixedWindow::new(1, Duration::from_secs(1)).unwrap();
        acquire(&limiter).await;

        let result = acquire_within_until(
            &limiter,
            Duration::from_secs(5),
            sleep(Duration::from_millis(30)),
        )
        .await;

        match result {
            Err(RateLimitError::Cancelled { waited }) => {
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_allowed() {
        let limiter = FixedWindow::new(1, Duration::from_millis(100)).unwrap();
        acquire(&limiter).await;

        let waited = acquire_within(&limiter, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(waited >= Duration::from_millis(100));
    }
}
