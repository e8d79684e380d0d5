//! Sliding window rate limiter implementation.
//!
//! Provides accurate rate limiting with smooth window transitions.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{AdmissionDecision, RateLimitError, RateLimitState, RateLimiter};

/// Sliding window rate limiter.
///
/// Tracks individual admission timestamps, so no `window`-long interval
/// ever contains more than `limit` admissions.
#[derive(Debug)]
pub struct SlidingWindow {
    /// Maximum requests per window.
    limit: u32,

    /// Window duration.
    window: Duration,

    /// Admission timestamps within the current window, oldest first.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    /// Create a new sliding window rate limiter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `limit` is zero or `window` is empty.
    pub fn new(limit: u32, window: Duration) -> Result<Self, RateLimitError> {
        if limit == 0 || window.is_zero() {
            return Err(RateLimitError::InvalidConfig(format!(
                "sliding window needs a positive limit and window (got {limit} per {window:?})"
            )));
        }

        Ok(Self {
            limit,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        })
    }

    /// Remove expired timestamps. Caller holds the lock.
    fn cleanup(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = timestamps.front() {
            if now.saturating_duration_since(*front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn until_oldest_expires(&self, timestamps: &VecDeque<Instant>, now: Instant) -> Duration {
        timestamps.front().map_or(Duration::ZERO, |oldest| {
            self.window
                .saturating_sub(now.saturating_duration_since(*oldest))
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn used(timestamps: &VecDeque<Instant>) -> u32 {
        timestamps.len() as u32
    }
}

impl RateLimiter for SlidingWindow {
    fn try_admit(&self) -> AdmissionDecision {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        self.cleanup(&mut timestamps, now);

        if Self::used(&timestamps) < self.limit {
            timestamps.push_back(now);
            AdmissionDecision::Admitted
        } else {
            AdmissionDecision::Wait(self.until_oldest_expires(&timestamps, now))
        }
    }

    fn remaining(&self) -> u32 {
        let mut timestamps = self.timestamps.lock();
        self.cleanup(&mut timestamps, Instant::now());
        self.limit.saturating_sub(Self::used(&timestamps))
    }

    fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        self.cleanup(&mut timestamps, now);

        if Self::used(&timestamps) < self.limit {
            return Duration::ZERO;
        }

        // Wait until the oldest admission leaves the window
        self.until_oldest_expires(&timestamps, now)
    }

    fn reset(&self) {
        self.timestamps.lock().clear();
    }

    fn state(&self) -> RateLimitState {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        self.cleanup(&mut timestamps, now);

        let remaining = self.limit.saturating_sub(Self::used(&timestamps));
        let reset_after = if timestamps.is_empty() {
            self.window
        } else {
            self.until_oldest_expires(&timestamps, now)
        };

        RateLimitState {
            limit: self.limit,
            remaining,
            reset_after,
            is_limited: remaining == 0,
        }
    }

    fn limit(&self) -> u32 {
        self.limit
    }

    fn window(&self) -> Duration {
        self.window
    }
}
